use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::{LogFormat, LoggingConfig, TurnstileConfig};
use turnstile::policy::AdmissionPolicy;
use turnstile::simulate::Scenario;

#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about = "Admission control for API handlers")]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load an admission policy and print a summary of it
    Validate {
        /// Policy file; falls back to the configured path, then the built-in policy
        #[arg(short, long)]
        policy: Option<String>,
    },
    /// Replay a scenario through the pipeline and print one JSON line per call
    Simulate {
        #[arg(short, long)]
        policy: Option<String>,

        #[arg(short, long)]
        scenario: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = TurnstileConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging)?;

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Validate { policy } => {
            let policy = load_policy(policy.as_deref(), &config)?;
            let mut endpoints: Vec<&String> = policy.endpoints.keys().collect();
            endpoints.sort();

            println!(
                "global: {} requests per {} seconds",
                policy.global.max_requests,
                policy.global.window_secs()
            );
            for name in endpoints {
                let limit = policy
                    .endpoint_limit(name)
                    .map(|limit| {
                        let rule = limit.rule();
                        format!(
                            "{} per {}s ({:?}, by {:?})",
                            rule.max_requests,
                            rule.window_secs(),
                            limit.strategy,
                            limit.key_by
                        )
                    })
                    .unwrap_or_else(|| "global only".to_string());
                let ban_check = policy
                    .ban_check(name)
                    .map(|check| format!("{:?}", check))
                    .unwrap_or_else(|| "none".to_string());
                println!("{}: limit {}; ban check {}", name, limit, ban_check);
            }
            println!("actions: {}", policy.actions.len());
        }
        Command::Simulate { policy, scenario } => {
            let policy = load_policy(policy.as_deref(), &config)?;
            let scenario = Scenario::from_file(&scenario)?;
            let report = scenario.run(Arc::new(policy), &config).await?;

            for outcome in &report.outcomes {
                println!("{}", serde_json::to_string(outcome)?);
            }
            info!(
                admitted = report.admitted(),
                rejected = report.outcomes.len() - report.admitted(),
                swept = report.swept,
                "Simulation complete"
            );
        }
    }

    Ok(())
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
    Ok(())
}

fn load_policy(path: Option<&str>, config: &TurnstileConfig) -> anyhow::Result<AdmissionPolicy> {
    match path.or(config.admission.policy_path.as_deref()) {
        Some(path) => Ok(AdmissionPolicy::from_file(path)?),
        None => {
            info!("No policy file given, using the built-in policy");
            Ok(AdmissionPolicy::builtin())
        }
    }
}
