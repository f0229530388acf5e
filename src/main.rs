//! DRPF - Dumb Rust pf
//!
//! Command-line manager for pf firewall rules.
//!
//! # Usage
//!
//! ```bash
//! drpf list                                         # Show the stored rules
//! drpf filter add --action pass --proto tcp --port 22 --keep-state -d ssh
//! drpf forward add --on en0 --external-port 8080 --internal-ip 192.168.1.5 --internal-port 80
//! drpf filter move 3 1                              # Move rule 3 to the top
//! drpf diff                                         # Compare with the installed anchor
//! drpf apply                                        # Install and load the anchor
//! drpf live                                         # Parse what pf has loaded
//! drpf startup enable                               # Enable pf at boot (launchd)
//! drpf --dry-run apply                              # Log commands, run nothing
//! ```

use clap::{Args, Parser, Subcommand};
use drpf::audit::{AuditLog, EventType, apply_details};
use drpf::core::diff::ruleset_diff;
use drpf::core::error::PfctlErrorPattern;
use drpf::core::firewall::{
    Action, Direction, FilterRule, ForwardProtocol, PortForwardRule, Protocol,
};
use drpf::core::pfctl::PfControl;
use drpf::shell::{DryRunShell, ElevatedShell, Shell};
use drpf::{Error, RuleStore, config, utils, validators};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

shadow_rs::shadow!(build);

const LONG_VERSION: &str = shadow_rs::formatcp!(
    "{} ({} {})",
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME
);

#[derive(Parser)]
#[command(name = "drpf")]
#[command(about = "Dumb Rust pf - a minimal pf rule manager", long_about = None)]
#[command(version = build::PKG_VERSION, long_version = LONG_VERSION)]
struct Cli {
    /// Log privileged commands instead of running them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Rule document to use instead of the configured one
    #[arg(long, global = true, value_name = "PATH")]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stored filter and port-forward rules
    List,
    /// Print the pf rules the document compiles to
    Compile,
    /// Compare the installed anchor with the compiled rules
    Diff,
    /// Install the compiled rules into the pf anchor and load them
    Apply,
    /// Show the rules pf currently has loaded in the anchor
    Live,
    /// Edit filter rules
    Filter {
        #[command(subcommand)]
        action: FilterCommand,
    },
    /// Edit port-forward (rdr) rules
    Forward {
        #[command(subcommand)]
        action: ForwardCommand,
    },
    /// Replace the rule document with a file (previous one kept as .bak)
    Import { path: PathBuf },
    /// Write the rule document to a file
    Export { path: PathBuf },
    /// Show whether pf is enabled
    Status,
    /// Enable pf
    Enable,
    /// Disable pf
    Disable,
    /// Show pf statistics
    Info,
    /// Manage enabling pf at boot
    Startup {
        #[command(subcommand)]
        action: StartupCommand,
    },
    /// List network interfaces
    Interfaces,
    /// Show recent privileged operations
    Audit {
        /// Number of events to show
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
}

#[derive(Subcommand)]
enum FilterCommand {
    /// Append a filter rule
    Add(FilterArgs),
    /// Replace the filter rule at POSITION
    Update {
        position: usize,
        #[command(flatten)]
        rule: FilterArgs,
    },
    /// Delete the filter rule at POSITION
    Delete { position: usize },
    /// Move a filter rule from one position to another
    Move { from: usize, to: usize },
}

#[derive(Subcommand)]
enum ForwardCommand {
    /// Append a port-forward rule
    Add(ForwardArgs),
    /// Replace the port-forward rule at POSITION
    Update {
        position: usize,
        #[command(flatten)]
        rule: ForwardArgs,
    },
    /// Delete the port-forward rule at POSITION
    Delete { position: usize },
    /// Move a port-forward rule from one position to another
    Move { from: usize, to: usize },
}

#[derive(Subcommand)]
enum StartupCommand {
    /// Show whether pf is enabled at boot
    Status,
    /// Install the launchd job that enables pf at boot
    Enable,
    /// Remove the launchd job
    Disable,
}

#[derive(Args)]
struct FilterArgs {
    /// pass or block
    #[arg(long, default_value = "block")]
    action: Action,
    /// in or out
    #[arg(long, default_value = "in")]
    direction: Direction,
    /// Stop evaluating on match
    #[arg(long)]
    quick: bool,
    /// Interface name or any
    #[arg(long = "on", value_name = "INTERFACE", default_value = "any")]
    interface: String,
    /// any, tcp, udp, tcp,udp, icmp or icmp6
    #[arg(long, default_value = "any")]
    proto: Protocol,
    /// Source address, network, (iface), <table> or any
    #[arg(long, default_value = "any")]
    from: String,
    /// Destination address, network, (iface), <table> or any
    #[arg(long, default_value = "any")]
    to: String,
    /// Port, list (22,80) or range (1000-2000)
    #[arg(long, default_value = "any")]
    port: String,
    /// Track connection state
    #[arg(long)]
    keep_state: bool,
    #[arg(short, long, default_value = "")]
    description: String,
}

impl From<FilterArgs> for FilterRule {
    fn from(args: FilterArgs) -> Self {
        FilterRule {
            action: args.action,
            direction: args.direction,
            quick: args.quick,
            interface: args.interface,
            protocol: args.proto,
            source: args.from,
            destination: args.to,
            port: args.port,
            keep_state: args.keep_state,
            description: args.description,
        }
    }
}

#[derive(Args)]
struct ForwardArgs {
    /// Interface name or any
    #[arg(long = "on", value_name = "INTERFACE", default_value = "any")]
    interface: String,
    /// tcp or udp
    #[arg(long, default_value = "tcp")]
    proto: ForwardProtocol,
    /// Address to redirect from, or any
    #[arg(long, default_value = "any")]
    external_ip: String,
    #[arg(long)]
    external_port: String,
    #[arg(long, default_value = "127.0.0.1")]
    internal_ip: String,
    #[arg(long)]
    internal_port: String,
    #[arg(short, long, default_value = "")]
    description: String,
}

impl From<ForwardArgs> for PortForwardRule {
    fn from(args: ForwardArgs) -> Self {
        PortForwardRule {
            interface: args.interface,
            protocol: args.proto,
            external_ip: args.external_ip,
            external_port: args.external_port,
            internal_ip: args.internal_ip,
            internal_port: args.internal_port,
            description: args.description,
        }
    }
}

/// Everything a command needs: the rule document path, pfctl operations and
/// the audit log (absent on dry runs).
struct Context<S> {
    rules_path: PathBuf,
    pf: PfControl<S>,
    audit: Option<AuditLog>,
}

impl<S: Shell> Context<S> {
    fn open_store(&self) -> drpf::Result<RuleStore> {
        RuleStore::open(&self.rules_path)
    }

    async fn record(&self, event_type: EventType, details: serde_json::Value, error: Option<String>) {
        if let Some(audit) = &self.audit {
            audit.record(event_type, details, error).await;
        }
    }

    /// Records the outcome of an operation and passes it through.
    async fn audited<T>(
        &self,
        event_type: EventType,
        details: serde_json::Value,
        result: drpf::Result<T>,
    ) -> drpf::Result<T> {
        let error = result.as_ref().err().map(ToString::to_string);
        self.record(event_type, details, error).await;
        result
    }
}

fn main() -> ExitCode {
    let _ = utils::ensure_dirs();
    let cli = Cli::parse();
    init_logging();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = if cli.dry_run {
        runtime.block_on(run(cli.command, cli.rules, DryRunShell, false))
    } else {
        runtime.block_on(run(cli.command, cli.rules, ElevatedShell, true))
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    if let Some(mut log_path) = utils::get_state_dir() {
        log_path.push("drpf.log");
        if let Ok(file) = std::fs::File::create(log_path) {
            tracing_subscriber::fmt()
                .with_ansi(false)
                .with_writer(file)
                .init();
            return;
        }
    }
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
}

fn report_error(e: &Error) {
    eprintln!("Error: {e}");
    if let Some(output) = e.command_output() {
        let translation = PfctlErrorPattern::match_error(output);
        eprintln!("  {}", translation.user_message);
        for suggestion in &translation.suggestions {
            eprintln!("  - {suggestion}");
        }
        if let Some(url) = &translation.help_url {
            eprintln!("  See: {url}");
        }
    }
}

async fn run<S: Shell>(
    command: Commands,
    rules: Option<PathBuf>,
    shell: S,
    audited: bool,
) -> drpf::Result<()> {
    let config = config::load_config().await;
    let rules_path = rules
        .or_else(|| config.resolved_rules_path())
        .ok_or(Error::DirUnavailable("data"))?;
    let audit = if audited {
        AuditLog::new()
            .inspect_err(|e| warn!("Audit log unavailable: {e}"))
            .ok()
    } else {
        None
    };

    let ctx = Context {
        rules_path,
        pf: PfControl::new(shell, config.pf_paths()),
        audit,
    };
    handle_cli(command, &ctx).await
}

async fn handle_cli<S: Shell>(command: Commands, ctx: &Context<S>) -> drpf::Result<()> {
    match command {
        Commands::List => {
            let store = ctx.open_store()?;
            let doc = store.document();
            if doc.is_empty() {
                println!("No rules in {}", store.path().display());
                return Ok(());
            }
            if !doc.rdr_rules.is_empty() {
                println!("Port forwards:");
                for (i, rule) in doc.rdr_rules.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, describe_forward(rule));
                }
            }
            if !doc.filter_rules.is_empty() {
                println!("Filter rules:");
                for (i, rule) in doc.filter_rules.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, describe_filter(rule));
                }
            }
        }
        Commands::Compile => {
            print!("{}", ctx.open_store()?.generate_compiled_text());
        }
        Commands::Diff => {
            let compiled = ctx.open_store()?.generate_compiled_text();
            let installed = ctx.pf.installed_anchor_text().await?;
            match ruleset_diff(&installed, &compiled) {
                Some(diff) => print!("{diff}"),
                None => println!("Installed anchor is up to date."),
            }
        }
        Commands::Apply => {
            let store = ctx.open_store()?;
            let compiled = store.generate_compiled_text();
            let doc = store.document();

            if let Ok(installed) = ctx.pf.installed_anchor_text().await
                && let Some(diff) = ruleset_diff(&installed, &compiled)
            {
                println!("Changes:\n{diff}");
            }

            let setup = ctx.pf.setup_pf_conf().await;
            let pf_conf_changed = matches!(setup, Ok(true));
            if pf_conf_changed || setup.is_err() {
                let details = serde_json::json!({
                    "pf_conf": ctx.pf.paths().pf_conf_path,
                    "anchor": ctx.pf.paths().anchor_name,
                });
                ctx.audited(EventType::SetupAnchor, details, setup).await?;
            }

            let details = apply_details(&compiled, doc.filter_rules.len(), doc.rdr_rules.len());
            let output = ctx
                .audited(
                    EventType::ApplyRules,
                    details,
                    ctx.pf.apply_rules(&compiled).await,
                )
                .await?;
            print_output(&output);

            if pf_conf_changed {
                let details = serde_json::json!({
                    "reload": ctx.pf.paths().pf_conf_path,
                });
                let output = ctx
                    .audited(EventType::SetupAnchor, details, ctx.pf.reload_pf_conf().await)
                    .await?;
                print_output(&output);
            }

            println!(
                "✓ Applied {} filter rule(s) and {} port forward(s) to anchor '{}'.",
                doc.filter_rules.len(),
                doc.rdr_rules.len(),
                ctx.pf.paths().anchor_name
            );
        }
        Commands::Live => {
            let rules = ctx.pf.live_rules().await?;
            if rules.is_empty() {
                println!("No filter rules loaded in anchor '{}'.", ctx.pf.paths().anchor_name);
            }
            for (i, rule) in rules.iter().enumerate() {
                println!("{:>3}. {}", i + 1, describe_filter(rule));
            }
        }
        Commands::Filter { action } => handle_filter(action, ctx)?,
        Commands::Forward { action } => handle_forward(action, ctx)?,
        Commands::Import { path } => {
            let mut store = RuleStore::new(&ctx.rules_path);
            let details = serde_json::json!({ "source": path, "backup": store.backup_path() });
            let result = store.import(&path);
            ctx.audited(EventType::ImportRules, details, result).await?;
            println!(
                "Imported {} filter rule(s) and {} port forward(s) from {}.",
                store.document().filter_rules.len(),
                store.document().rdr_rules.len(),
                path.display()
            );
        }
        Commands::Export { path } => {
            let store = ctx.open_store()?;
            let details = serde_json::json!({ "destination": path });
            ctx.audited(EventType::ExportRules, details, store.export(&path))
                .await?;
            println!("Exported rules to {}.", path.display());
        }
        Commands::Status => {
            println!("pf: {}", ctx.pf.status().await?);
            println!("Enable at boot: {}", ctx.pf.startup_status().await?);
        }
        Commands::Enable => {
            let output = ctx
                .audited(EventType::EnablePf, serde_json::json!({}), ctx.pf.enable().await)
                .await?;
            print_output(&output);
            println!("✓ pf enabled.");
        }
        Commands::Disable => {
            let output = ctx
                .audited(EventType::DisablePf, serde_json::json!({}), ctx.pf.disable().await)
                .await?;
            print_output(&output);
            println!("✓ pf disabled.");
        }
        Commands::Info => {
            print_output(&ctx.pf.info().await?);
        }
        Commands::Startup { action } => {
            let details = serde_json::json!({ "plist": ctx.pf.paths().startup_plist_path });
            match action {
                StartupCommand::Status => {
                    println!("Enable at boot: {}", ctx.pf.startup_status().await?);
                }
                StartupCommand::Enable => {
                    let result = ctx.pf.enable_on_startup().await;
                    ctx.audited(EventType::EnableStartup, details, result).await?;
                    println!("✓ pf will be enabled at boot.");
                }
                StartupCommand::Disable => {
                    let result = ctx.pf.disable_on_startup().await;
                    ctx.audited(EventType::DisableStartup, details, result).await?;
                    println!("✓ pf will no longer be enabled at boot.");
                }
            }
        }
        Commands::Interfaces => {
            for name in utils::list_interfaces() {
                println!("{name}");
            }
        }
        Commands::Audit { count } => {
            let audit = match &ctx.audit {
                Some(audit) => audit.clone(),
                None => AuditLog::new()?,
            };
            for event in audit.read_recent(count).await? {
                let status = if event.success { "ok" } else { "FAILED" };
                print!(
                    "{}  {:<16} {:<6} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type,
                    status,
                    event.details
                );
                match event.error {
                    Some(error) => println!("  error: {error}"),
                    None => println!(),
                }
            }
        }
    }
    Ok(())
}

fn handle_filter<S: Shell>(action: FilterCommand, ctx: &Context<S>) -> drpf::Result<()> {
    let mut store = RuleStore::new(&ctx.rules_path);
    match action {
        FilterCommand::Add(args) => {
            let rule = validators::validate_filter_rule(args.into())?;
            print_port_hint(&rule.port);
            store.add_filter_rule(rule)?;
            println!(
                "Added filter rule {}.",
                store.document().filter_rules.len()
            );
        }
        FilterCommand::Update { position, rule } => {
            let rule = validators::validate_filter_rule(rule.into())?;
            store.update_filter_rule(to_index(position)?, rule)?;
            println!("Updated filter rule {position}.");
        }
        FilterCommand::Delete { position } => {
            let removed = store.delete_filter_rule(to_index(position)?)?;
            println!("Deleted filter rule {position}: {}", describe_filter(&removed));
        }
        FilterCommand::Move { from, to } => {
            store.load()?;
            let len = store.document().filter_rules.len();
            check_move(from, to, len)?;
            store.move_filter_rule(from - 1, to - 1);
            store.save()?;
            println!("Moved filter rule {from} to {to}.");
        }
    }
    Ok(())
}

fn handle_forward<S: Shell>(action: ForwardCommand, ctx: &Context<S>) -> drpf::Result<()> {
    let mut store = RuleStore::new(&ctx.rules_path);
    match action {
        ForwardCommand::Add(args) => {
            let rule = validators::validate_port_forward_rule(args.into())?;
            store.add_port_forward_rule(rule)?;
            println!(
                "Added port forward {}.",
                store.document().rdr_rules.len()
            );
        }
        ForwardCommand::Update { position, rule } => {
            let rule = validators::validate_port_forward_rule(rule.into())?;
            store.update_port_forward_rule(to_index(position)?, rule)?;
            println!("Updated port forward {position}.");
        }
        ForwardCommand::Delete { position } => {
            let removed = store.delete_port_forward_rule(to_index(position)?)?;
            println!("Deleted port forward {position}: {}", describe_forward(&removed));
        }
        ForwardCommand::Move { from, to } => {
            store.load()?;
            let len = store.document().rdr_rules.len();
            check_move(from, to, len)?;
            store.move_port_forward_rule(from - 1, to - 1);
            store.save()?;
            println!("Moved port forward {from} to {to}.");
        }
    }
    Ok(())
}

/// Converts a 1-based command-line position to a list index.
fn to_index(position: usize) -> drpf::Result<usize> {
    position.checked_sub(1).ok_or_else(|| Error::Validation {
        field: "position".to_string(),
        message: "positions start at 1".to_string(),
    })
}

/// The store ignores out-of-range moves; the command line reports them.
fn check_move(from: usize, to: usize, len: usize) -> drpf::Result<()> {
    for position in [from, to] {
        let index = to_index(position)?;
        if index >= len {
            return Err(Error::InvalidIndex { index, len });
        }
    }
    Ok(())
}

fn print_port_hint(port: &str) {
    if let Ok(port) = validators::validate_port(port)
        && let Some(hint) = validators::check_well_known_port(port)
    {
        info!("{hint}");
        println!("Note: {hint}");
    }
}

fn print_output(output: &str) {
    let output = output.trim_end();
    if !output.is_empty() {
        println!("{output}");
    }
}

fn describe_filter(rule: &FilterRule) -> String {
    let mut line = format!(
        "{:<5} {:<3} {:<5} on {:<6} proto {:<7} from {:<18} to {:<18} port {:<11}",
        rule.action,
        rule.direction,
        if rule.quick { "quick" } else { "" },
        rule.interface,
        rule.protocol,
        rule.source,
        rule.destination,
        rule.port,
    );
    if rule.keep_state {
        line.push_str(" keep state");
    }
    if !rule.description.is_empty() {
        line.push_str(&format!("  # {}", rule.description));
    }
    line
}

fn describe_forward(rule: &PortForwardRule) -> String {
    let mut line = format!(
        "on {:<6} proto {:<3} {}:{} -> {}:{}",
        rule.interface,
        rule.protocol,
        rule.external_ip,
        rule.external_port,
        rule.internal_ip,
        rule.internal_port,
    );
    if !rule.description.is_empty() {
        line.push_str(&format!("  # {}", rule.description));
    }
    line
}
