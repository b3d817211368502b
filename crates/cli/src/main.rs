mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use cadence_catalog::SheetSource;
use cadence_core::config::{load_dotenv, Config};
use cadence_core::{Frequency, RecipientId};
use cadence_engine::Engine;
use cadence_notify::{compose, EmailTransport, SmtpTransport};
use cadence_store::JsonFileStore;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = Cli::parse();

    load_dotenv();
    let config = Config::from_env();

    let store = Arc::new(JsonFileStore::new(&config.store.data_path));
    let transport = Arc::new(
        SmtpTransport::from_config(&config.smtp).context("invalid SMTP configuration")?,
    );
    let engine = Engine::rehydrate(store, transport.clone()).await;

    match args.command {
        Command::Add { email } => {
            let id = engine.add_recipient(&email).await?;
            println!("added recipient {id} <{email}>");
        }
        Command::Remove { id } => {
            engine.remove_recipient(RecipientId(id)).await?;
            println!("removed recipient {id}");
        }
        Command::List => {
            for (id, recipient) in engine.list_recipients().await {
                println!("{id}  {}", recipient.email);
                for n in &recipient.notifications {
                    let last = n
                        .last_sent
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string());
                    println!("    {:<20} {:<8} last_sent={last}", n.topic, n.frequency);
                }
            }
        }
        Command::Topics => {
            for topic in engine.topics().await {
                println!("{topic}");
            }
        }
        Command::RefreshTopics { source } => {
            let locator = source.or(config.catalog.sheet).context(
                "no sheet configured; pass --source or set CADENCE_SHEET_URL",
            )?;
            let topics = engine.refresh_topics(&SheetSource::new()?, &locator).await?;
            println!("loaded {} topics", topics.len());
        }
        Command::Subscribe { id, frequency, topics } => {
            let frequency: Frequency = frequency.parse()?;
            let results = engine
                .apply_selection(RecipientId(id), &topics, frequency)
                .await?;
            println!("subscription updated: {} topics at {frequency}", topics.len());
            for result in results {
                match &result.error {
                    None => println!("instant send ok: {}", result.topic),
                    Some(e) => println!("instant send failed: {} ({e})", result.topic),
                }
            }
        }
        Command::Scan => {
            let report = engine.run_scan(Utc::now()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::SendTest { to } => {
            let (subject, body) = compose("test", Utc::now());
            transport
                .send(&to, &subject, &body)
                .await
                .context("test delivery failed")?;
            println!("test notification sent to {to}");
        }
    }

    Ok(())
}
