pub mod commands;

use clap::{ArgGroup, Args, Parser, Subcommand};
use fieldops_core::auth::Role;
use fieldops_core::config::{AppConfig, LogFormat};
use fieldops_core::domain::meta::EntityKind;
use fieldops_core::workflow::Decision;
use std::process::ExitCode;
use tracing::Level;

#[derive(Debug, Parser)]
#[command(
    name = "fieldops",
    about = "Fieldops operator CLI",
    long_about = "Operate the fieldops approval store: migrations, config inspection, readiness checks, and pending-change review.",
    after_help = "Examples:\n  fieldops doctor --json\n  fieldops pending --kind subscriber --json\n  fieldops decide --kind subscriber --id 3f0c... --actor emp-2 --approve"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, DB connectivity, and schema migration state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List records of one kind that await an approval decision")]
    Pending {
        #[arg(long, value_parser = parse_kind, help = "employee, subscriber, payment or ticket")]
        kind: EntityKind,
        #[arg(long, help = "Emit the full pending report as JSON")]
        json: bool,
    },
    #[command(about = "Approve or reject the pending change on one record")]
    Decide(DecideArgs),
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("verdict").required(true).args(["approve", "reject"])))]
struct DecideArgs {
    #[arg(long, value_parser = parse_kind)]
    kind: EntityKind,
    #[arg(long, help = "Storage id of the record")]
    id: String,
    #[arg(long, help = "Identifier recorded as the decider")]
    actor: String,
    #[arg(long, value_parser = parse_role, default_value = "manager")]
    role: Role,
    #[arg(long)]
    approve: bool,
    #[arg(long)]
    reject: bool,
    #[arg(long, help = "Lifecycle status to apply together with the decision")]
    status: Option<String>,
    #[arg(long)]
    remark: Option<String>,
}

impl From<DecideArgs> for commands::decide::DecideRequest {
    fn from(args: DecideArgs) -> Self {
        Self {
            kind: args.kind,
            id: args.id,
            actor: args.actor,
            role: args.role,
            decision: if args.approve { Decision::Approve } else { Decision::Reject },
            status: args.status,
            remark: args.remark,
        }
    }
}

fn parse_kind(value: &str) -> Result<EntityKind, String> {
    EntityKind::parse(value).ok_or_else(|| format!("unknown record kind `{value}`"))
}

fn parse_role(value: &str) -> Result<Role, String> {
    Role::parse(value).ok_or_else(|| format!("unknown role `{value}`"))
}

/// Installs the global subscriber on stderr so command payloads on stdout stay parseable.
pub fn init_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when embedded in tests.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            let output = commands::doctor::run(json);
            let exit_code = if !json || commands::doctor::healthy(&output) { 0 } else { 1 };
            commands::CommandResult { exit_code, output }
        }
        Command::Pending { kind, json } => commands::pending::run(kind, json),
        Command::Decide(args) => commands::decide::run(args.into()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
