use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use controller_sync::{
    ClientConfig, ConfigParams, ControllerServiceClient, VerificationOptions, format_results,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "controller-sync", version, about = "Update and verify controller services")]
struct Cli {
    /// REST API root; falls back to CONTROLLER_SYNC_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Maximum conflict retries for updates
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save a new name, comments or properties
    Update(UpdateArgs),
    /// Run a configuration verification and print the results
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
struct UpdateArgs {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    comments: Option<String>,
    /// key=value; repeatable
    #[arg(long = "property", value_parser = parse_pair)]
    properties: Vec<(String, String)>,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    id: String,
    /// Override a property for this verification only; key=value
    #[arg(long = "property", value_parser = parse_pair)]
    properties: Vec<(String, String)>,
    /// Verification attribute; key=value
    #[arg(long = "attribute", value_parser = parse_pair)]
    attributes: Vec<(String, String)>,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::from_env().context("reading environment configuration")?;
    if let Some(base_url) = &cli.base_url {
        config = config.base_url(base_url);
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.request_timeout(Duration::from_secs(secs));
    }
    if let Some(retries) = cli.max_retries {
        config = config.max_retries(retries);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,controller_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let client = ControllerServiceClient::connect(config)?;

    match cli.command {
        Command::Update(args) => {
            let service = client
                .open(&args.id)
                .await
                .with_context(|| format!("loading controller service {}", args.id))?;

            let mut component = service.component();
            if let Some(name) = args.name {
                component.name = name;
            }
            if let Some(comments) = args.comments {
                component.comments = Some(comments);
            }
            for (key, value) in args.properties {
                component.properties.insert(key, Some(value));
            }

            let updated = service.apply_update(component).await?;
            println!(
                "Updated '{}' (revision {})",
                updated.component.name,
                service.revision().await.version
            );
        }
        Command::Verify(args) => {
            let service = client
                .open(&args.id)
                .await
                .with_context(|| format!("loading controller service {}", args.id))?;

            let mut params = ConfigParams::from_component(&service.component());
            for (key, value) in args.properties {
                params.properties.insert(key, Some(value));
            }
            let options = VerificationOptions {
                attributes: args.attributes.into_iter().collect::<BTreeMap<_, _>>(),
            };

            let Some(job) = service.start_verification_with(params, options).await? else {
                bail!("a verification is already running for {}", args.id);
            };
            println!("{}", format_results(&job.results));
        }
    }

    Ok(())
}
