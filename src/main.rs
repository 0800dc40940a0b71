use anyhow::Result;
use chain_capture::alerts::{self, WebhookNotifier};
use chain_capture::config::{self, CaptureConfig};
use chain_capture::{CaptureReport, CaptureStamp, ChainClient, logging, run_capture};
use chrono::{Duration, Utc};
use colored::Colorize;
use std::sync::Arc;
use tracing::{error, warn};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let cfg = CaptureConfig::from_env();
    cfg.validate()?;

    println!("{}", "=".repeat(60).blue());
    println!("{}", "Options Chain Capture".green().bold());
    println!("{}", "=".repeat(60).blue());
    println!();

    let client = Arc::new(ChainClient::new(&cfg.base_url, &cfg.api_key)?);
    let notifier = match &cfg.alert_webhook {
        Some(url) => Some(WebhookNotifier::new(url)?),
        None => None,
    };

    // Expirations up to today + days_ahead, in market-local terms
    let today = Utc::now().with_timezone(&config::MARKET_TZ).date_naive();
    let to_date = today + Duration::days(cfg.days_ahead);

    println!(
        "{} Fetching {} ticker(s) through {} (max concurrent: {})",
        "ℹ".blue(),
        cfg.tickers.len(),
        to_date,
        cfg.max_concurrent
    );
    println!();

    let start_time = std::time::Instant::now();
    let results = Arc::clone(&client)
        .fetch_all_option_chains(cfg.tickers.clone(), to_date, cfg.max_concurrent)
        .await;

    let mut successful: Vec<CaptureReport> = Vec::new();
    let mut failed: Vec<(String, String)> = Vec::new();

    for (ticker, result) in cfg.tickers.iter().zip(results) {
        // Stamped inside the ticker's own fetch task, before its request went out
        let outcome = result
            .and_then(|(stamp, raw)| run_capture(ticker, &raw, &stamp).map_err(Into::into));
        match outcome {
            Ok(report) => {
                print!("{}", ".".green());
                if let (Some(notifier), Some(msg)) = (&notifier, alerts::capture_rejections(&report)) {
                    if let Err(e) = notifier.send(&msg).await {
                        warn!(ticker, error = %e, "Failed to deliver alert");
                    }
                }
                successful.push(report);
            }
            Err(e) => {
                print!("{}", "✗".red());
                error!(ticker, error = %e, "Capture failed");
                if let Some(notifier) = &notifier {
                    let failed_at = CaptureStamp::now();
                    let msg = alerts::capture_failed(ticker, &failed_at.timestamp, &format!("{:#}", e));
                    if let Err(e) = notifier.send(&msg).await {
                        warn!(ticker, error = %e, "Failed to deliver alert");
                    }
                }
                failed.push((ticker.clone(), format!("{:#}", e)));
            }
        }
    }

    let elapsed = start_time.elapsed();
    println!("\n");

    println!("{}", "=".repeat(60).blue());
    println!("{}", "Summary".cyan().bold());
    println!("{}", "=".repeat(60).blue());
    println!("{} Successful: {}", "✓".green(), successful.len());
    println!("{} Failed: {}", "✗".red(), failed.len());
    println!("{} Time taken: {:.2}s", "⏱".yellow(), elapsed.as_secs_f64());
    println!();

    for report in &successful {
        println!(
            "  {} {} → {} contracts, {} rejected, {} filled fields @ {}",
            "✓".green(),
            report.ticker.yellow(),
            report.records.len(),
            report.rejected.len(),
            report.fallback_count,
            report.stamp.timestamp
        );
        for rec in report.records.iter().take(3) {
            println!(
                "      {} bid {:.2} ask {:.2} Δ {:.3} OI {}",
                rec.primary_key, rec.bid, rec.ask, rec.delta, rec.open_interest
            );
        }
    }

    if !failed.is_empty() {
        println!();
        println!("{}", "Failed Tickers:".red());
        for (ticker, error) in failed.iter().take(10) {
            println!(
                "  {} {} → {}",
                "✗".red(),
                ticker.yellow(),
                error.chars().take(80).collect::<String>()
            );
        }
        if failed.len() > 10 {
            println!("  ... and {} more", failed.len() - 10);
        }
    }

    println!();
    println!("{}", "=".repeat(60).blue());
    println!("{}", "Done!".green().bold());
    println!("{}", "=".repeat(60).blue());

    Ok(())
}
