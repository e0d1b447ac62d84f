//! Command-line front end: render mail descriptions or deliver them.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use postage::{DeliveryAgent, FailurePolicy, MailFile, MessageAssembler, Properties};

/// Assemble and send mail
#[derive(Parser, Debug)]
#[command(name = "postage")]
#[command(about = "Assemble multipart mail and deliver it over SMTP", long_about = None)]
#[command(version)]
struct Cli {
    /// Session properties (TOML). Defaults to `POSTAGE_CONFIG`, then ./postage.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the assembled message without sending it
    Render {
        /// Mail description (TOML)
        #[arg(short, long)]
        mail: PathBuf,
    },
    /// Deliver one or more mails over a single connection
    Send {
        /// Mail descriptions (TOML), sent in the order given
        #[arg(short, long, required = true)]
        mail: Vec<PathBuf>,

        /// Keep going after a failure and report it, instead of stopping
        #[arg(long)]
        best_effort: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    postage::logging::init();

    let cli = Cli::parse();
    let properties = load_properties(cli.config.as_deref())?;

    match cli.command {
        Commands::Render { mail } => render(&properties, &mail),
        Commands::Send { mail, best_effort } => send(&properties, &mail, best_effort).await,
    }
}

/// Find the session properties using the following precedence:
/// 1. `--config`
/// 2. `POSTAGE_CONFIG` environment variable
/// 3. ./postage.toml, if present
///
/// With none of these, the defaults apply.
fn load_properties(explicit: Option<&Path>) -> anyhow::Result<Properties> {
    if let Some(path) = explicit {
        return Ok(Properties::load(path)?);
    }

    if let Ok(env_path) = std::env::var("POSTAGE_CONFIG") {
        let path = PathBuf::from(env_path);
        if !path.exists() {
            anyhow::bail!(
                "POSTAGE_CONFIG points to non-existent file: {}",
                path.display()
            );
        }
        return Ok(Properties::load(path)?);
    }

    let default_path = Path::new("./postage.toml");
    if default_path.exists() {
        return Ok(Properties::load(default_path)?);
    }

    Ok(Properties::new())
}

fn render(properties: &Properties, path: &Path) -> anyhow::Result<()> {
    let mail = MailFile::load(path).with_context(|| format!("Loading {}", path.display()))?;

    let mut message = MessageAssembler::from_properties(properties).create_message(&mail)?;
    message.set_sent_date(Utc::now());

    std::io::stdout().write_all(&message.to_bytes()?)?;
    Ok(())
}

async fn send(properties: &Properties, paths: &[PathBuf], best_effort: bool) -> anyhow::Result<()> {
    let policy = if best_effort {
        FailurePolicy::BestEffort
    } else {
        match properties.get(FailurePolicy::PROPERTY) {
            Some(value) => value.parse::<FailurePolicy>().map_err(anyhow::Error::msg)?,
            None => FailurePolicy::default(),
        }
    };

    let mails = paths
        .iter()
        .map(|path| MailFile::load(path).with_context(|| format!("Loading {}", path.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let report = DeliveryAgent::default()
        .send_batch(properties, policy, &mails)
        .await?;

    for (path, outcome) in paths.iter().zip(report.outcomes()) {
        println!("{}: {outcome}", path.display());
    }
    println!("{report}");

    if report.connection_failure().is_some() || report.failed_count() > 0 {
        std::process::exit(1);
    }

    Ok(())
}
