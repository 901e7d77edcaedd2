mod preview;
mod repl;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use kendali_config::AppConfig;
use kendali_runtime::{
    AutomationEngine, CommandRouter, FnApproval, RouterActionRunner, RuleRegistry, Status, TriggerActionRule,
    UnifiedExecutor,
};

use crate::preview::PreviewCapabilities;

#[derive(Debug, Parser)]
#[command(
    name = "kendali",
    version,
    about = "Policy-gated command router with intent resolution and automation"
)]
struct Cli {
    /// TOML configuration file.  Missing means defaults.
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one command and print the response envelope as JSON.
    Run {
        /// Evaluate every gate but do not dispatch.
        #[arg(long)]
        dry_run: bool,
        /// Approve a resulting confirmation request immediately.
        #[arg(long)]
        yes: bool,
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },
    /// Interactive line session (the default).
    Repl,
    /// Plan, reason over and run a multi-step request.
    Plan {
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },
    /// Trigger-action automation.
    Automation {
        #[command(subcommand)]
        command: AutomationCommands,
    },
    /// List registered command contracts.
    Contracts,
}

#[derive(Debug, Subcommand)]
enum AutomationCommands {
    /// Show the rules that would be evaluated.
    List {
        /// Rule file (JSON or YAML); overrides `[automation].rules_path`.
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Evaluate rules on the configured tick.
    Run {
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Number of cycles; 0 runs until interrupted.
        #[arg(long, default_value_t = 1)]
        cycles: u64,
        /// Approve high and critical risk rules without asking.
        #[arg(long)]
        approve_risky: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let router = CommandRouter::builder(Arc::new(PreviewCapabilities))
        .config(config.clone())
        .build()?;
    info!(config = %cli.config.display(), "kendali ready");

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Run { dry_run, yes, text } => {
            let executor = UnifiedExecutor::new(&router);
            let mut session = router.new_session();
            let mut envelope = executor.run(&mut session, &text.join(" "), dry_run).await;
            if yes && envelope.result.status == Status::PendingConfirmation {
                envelope = executor.confirm(&mut session, true).await;
            }
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        Commands::Repl => repl::run_repl(&router).await?,
        Commands::Plan { text } => {
            let mut session = router.new_session();
            let report = router.run_multi_step(&mut session, &text.join(" ")).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Automation { command } => run_automation(&router, &config, command).await?,
        Commands::Contracts => {
            for contract in router.registry().contracts() {
                let marker = if contract.dangerous { " [dangerous]" } else { "" };
                println!("{:<12} {}{marker}", contract.keyword, contract.usage);
            }
        }
    }
    Ok(())
}

async fn run_automation(router: &CommandRouter, config: &AppConfig, command: AutomationCommands) -> Result<()> {
    match command {
        AutomationCommands::List { rules } => {
            let engine = load_engine(config, rules)?;
            for rule in engine.registry().rules() {
                print_rule(rule);
            }
        }
        AutomationCommands::Run {
            rules,
            cycles,
            approve_risky,
        } => {
            let mut engine = load_engine(config, rules)?
                .with_approval(FnApproval(move |_: &TriggerActionRule| approve_risky));
            if engine.registry().enabled_rules().is_empty() {
                bail!("no enabled automation rules; pass --rules or set [automation].rules_path");
            }

            let mut session = router.new_session();
            let tick = Duration::from_secs(config.automation.tick_secs.max(1));
            let mut cycle = 0;
            loop {
                let executions = {
                    let mut runner = RouterActionRunner::new(router, &mut session);
                    engine.tick(&mut runner).await
                };
                for execution in &executions {
                    println!("{}", serde_json::to_string(execution)?);
                }
                cycle += 1;
                if cycles != 0 && cycle >= cycles {
                    break;
                }
                tokio::time::sleep(tick).await;
            }
        }
    }
    Ok(())
}

fn load_engine(config: &AppConfig, rules: Option<PathBuf>) -> Result<AutomationEngine> {
    match rules {
        Some(path) => {
            let mut registry = RuleRegistry::default();
            registry.load_from_file(&path)?;
            Ok(AutomationEngine::new(registry))
        }
        None => AutomationEngine::from_config(&config.automation),
    }
}

fn print_rule(rule: &TriggerActionRule) {
    let state = if rule.enabled { "enabled" } else { "disabled" };
    println!(
        "{:<16} {:<9} {:<10} {:<8} {} -> {}",
        rule.rule_id,
        state,
        format!("{:?}", rule.trigger_type),
        rule.risk_level.as_str(),
        rule.name,
        rule.action_command
    );
}
