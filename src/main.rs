use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "behaviorsentry",
    about = "Behavioral anomaly detection and alerting engine",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + monitoring loops)
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,

        /// SQLite database path
        #[arg(long, default_value = "data/behaviorsentry.db")]
        db: String,

        /// TOML config file path
        #[arg(long, default_value = "behaviorsentry.toml")]
        config: String,
    },

    /// Show the operator dashboard summary
    Dashboard {
        /// Daemon API base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        api_url: String,
    },

    /// Inspect and resolve alerts
    Alerts {
        #[command(subcommand)]
        action: AlertAction,
    },

    /// Inspect and remove active mitigations
    Mitigations {
        #[command(subcommand)]
        action: MitigationAction,
    },
}

#[derive(Subcommand)]
enum AlertAction {
    /// List active alerts
    List {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        api_url: String,
    },

    /// Resolve an alert with notes
    Resolve {
        /// Alert id
        #[arg(long)]
        id: String,

        /// Resolution notes
        #[arg(long)]
        notes: String,

        /// Close as false positive instead of resolved
        #[arg(long)]
        false_positive: bool,

        #[arg(long, default_value = "http://127.0.0.1:8080")]
        api_url: String,
    },
}

#[derive(Subcommand)]
enum MitigationAction {
    /// List active mitigations
    List {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        api_url: String,
    },

    /// Remove a mitigation early
    Remove {
        /// Mitigation type (e.g. rate_limit, temporary_block)
        #[arg(long = "type")]
        mitigation_type: String,

        /// Entity id the mitigation applies to
        #[arg(long)]
        entity: String,

        #[arg(long, default_value = "http://127.0.0.1:8080")]
        api_url: String,
    },
}

async fn get_json(url: &str) -> Result<serde_json::Value> {
    let response = reqwest::Client::new()
        .get(url)
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
        .with_context(|| format!("Failed to reach daemon at {}", url))?;
    let body: serde_json::Value = response.json().await?;
    Ok(body)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, db, config } => {
            tracing::info!(%bind, "Starting BehaviorSentry daemon");
            behaviorsentry::serve(&bind, &db, &config).await?;
        }
        Commands::Dashboard { api_url } => {
            let body = get_json(&format!("{}/api/v1/dashboard", api_url)).await?;
            let data = &body["data"];

            println!("\nBehaviorSentry Dashboard");
            println!("Monitored entities : {}", data["monitored_entities"]);
            println!("Active alerts      : {}", data["active_alerts_total"]);
            let sev = &data["active_alerts_by_severity"];
            println!(
                "  critical={} high={} medium={} low={}",
                sev["critical"], sev["high"], sev["medium"], sev["low"]
            );
            println!("Alerts last 24h    : {}", data["alerts_last_24h"]);

            println!("\nTop risk entities (7 days):");
            match data["top_risk_entities"].as_array() {
                Some(entries) if !entries.is_empty() => {
                    println!("{:<10} | {:<30} | Score", "Type", "Entity");
                    println!("{:-<10}-|-{:-<30}-|-{:-<8}", "", "", "");
                    for e in entries {
                        println!(
                            "{:<10} | {:<30} | {:.2}",
                            e["entity_type"].as_str().unwrap_or("?"),
                            e["entity_id"].as_str().unwrap_or("?"),
                            e["cumulative_score"].as_f64().unwrap_or(0.0)
                        );
                    }
                }
                _ => println!("  (none)"),
            }
            println!();
        }
        Commands::Alerts { action } => match action {
            AlertAction::List { api_url } => {
                let body = get_json(&format!("{}/api/v1/alerts", api_url)).await?;
                let alerts = body["data"]["alerts"].as_array().cloned().unwrap_or_default();
                if alerts.is_empty() {
                    println!("No active alerts.");
                } else {
                    println!(
                        "{:<36} | {:<8} | {:<12} | {:<20} | Type",
                        "Id", "Severity", "Status", "Entity"
                    );
                    println!(
                        "{:-<36}-|-{:-<8}-|-{:-<12}-|-{:-<20}-|-{:-<20}",
                        "", "", "", "", ""
                    );
                    for a in alerts {
                        println!(
                            "{:<36} | {:<8} | {:<12} | {:<20} | {}",
                            a["alert_id"].as_str().unwrap_or("?"),
                            a["severity"].as_str().unwrap_or("?"),
                            a["status"].as_str().unwrap_or("?"),
                            a["entity_id"].as_str().unwrap_or("?"),
                            a["alert_type"].as_str().unwrap_or("?")
                        );
                    }
                }
            }
            AlertAction::Resolve {
                id,
                notes,
                false_positive,
                api_url,
            } => {
                let response = reqwest::Client::new()
                    .post(format!("{}/api/v1/alerts/{}/resolve", api_url, id))
                    .timeout(std::time::Duration::from_secs(10))
                    .json(&serde_json::json!({
                        "notes": notes,
                        "false_positive": false_positive
                    }))
                    .send()
                    .await
                    .context("Failed to reach daemon")?;
                if response.status().is_success() {
                    println!("Alert {} resolved.", id);
                } else {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    anyhow::bail!("Resolve failed ({}): {}", status, body);
                }
            }
        },
        Commands::Mitigations { action } => match action {
            MitigationAction::List { api_url } => {
                let body = get_json(&format!("{}/api/v1/mitigations", api_url)).await?;
                let mitigations = body["data"]["mitigations"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default();
                if mitigations.is_empty() {
                    println!("No active mitigations.");
                } else {
                    println!(
                        "{:<20} | {:<8} | {:<20} | Expires (s)",
                        "Type", "Entity", "Entity Id"
                    );
                    println!("{:-<20}-|-{:-<8}-|-{:-<20}-|-{:-<11}", "", "", "", "");
                    for m in mitigations {
                        println!(
                            "{:<20} | {:<8} | {:<20} | {}",
                            m["mitigation_type"].as_str().unwrap_or("?"),
                            m["entity_type"].as_str().unwrap_or("?"),
                            m["entity_id"].as_str().unwrap_or("?"),
                            m["expires_in_secs"]
                        );
                    }
                }
            }
            MitigationAction::Remove {
                mitigation_type,
                entity,
                api_url,
            } => {
                let response = reqwest::Client::new()
                    .delete(format!(
                        "{}/api/v1/mitigations/{}/{}",
                        api_url, mitigation_type, entity
                    ))
                    .timeout(std::time::Duration::from_secs(10))
                    .send()
                    .await
                    .context("Failed to reach daemon")?;
                let body: serde_json::Value = response.json().await?;
                println!(
                    "Removed {} mitigation(s) for '{}'.",
                    body["data"]["removed"], entity
                );
            }
        },
    }

    Ok(())
}
