//! Bulk deletion: attachments by name pattern (over the API or straight
//! through psql) and the full product catalog.

use crate::progress::{ProgressBar, Throughput};
use crate::psql::PsqlRunner;
use anyhow::Result;
use odx_common::OdxConfig;
use odx_rpc::Client;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Consecutive empty batches before the SQL loop decides it is done.
const EMPTY_BATCH_LIMIT: u32 = 3;
const BASE_PAUSE_SECS: f64 = 0.1;

pub async fn attachments_rpc(
    client: &Client,
    pattern: &str,
    max: usize,
    batch_size: usize,
) -> Result<()> {
    let ids = client
        .search(
            "ir.attachment",
            json!([["name", "ilike", pattern]]),
            json!({"limit": max}),
        )
        .await?;
    if ids.is_empty() {
        println!("No attachments match '{pattern}'.");
        return Ok(());
    }
    println!("Deleting {} attachments matching '{pattern}'...", ids.len());

    let stop = spawn_ctrlc_flag();
    let started = Instant::now();
    let bar = ProgressBar::new("Deleting", ids.len());
    let mut deleted = 0usize;
    for chunk in ids.chunks(batch_size) {
        if stop.load(Ordering::Relaxed) {
            warn!("Interrupted, stopping after the current batch");
            break;
        }
        match client.unlink("ir.attachment", chunk).await {
            Ok(_) => deleted += chunk.len(),
            // One locked record must not sink the run
            Err(err) => error!(size = chunk.len(), error = %err, "Batch failed, continuing"),
        }
        bar.update(deleted);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    println!(
        "\n{deleted}/{} attachments deleted ({:.2}s)",
        ids.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

pub async fn attachments_sql(
    config: &OdxConfig,
    pattern: &str,
    batch_size: usize,
    max_batches: usize,
    assume_yes: bool,
) -> Result<()> {
    let runner = PsqlRunner::new(config.pg()?.clone());
    runner.check_connection().await?;

    let total = runner.count_attachments(pattern).await?;
    if total == 0 {
        println!("No attachments match '{pattern}'.");
        return Ok(());
    }
    println!("Database:          {}", config.pg()?.dbname);
    println!("Matching pattern:  '{pattern}'");
    println!("Attachments:       {total}");
    println!("Batch size:        {batch_size}");
    println!("Estimated time:    ~{} min", total / 5000 + 1);
    if !assume_yes
        && !dialoguer::Confirm::new()
            .with_prompt("Delete them directly in the database?")
            .default(false)
            .interact()?
    {
        println!("Aborted.");
        return Ok(());
    }

    let stop = spawn_ctrlc_flag();
    let stats = Throughput::new();
    let reporter = stats.spawn_reporter(Duration::from_secs(10));
    let started = Instant::now();

    let mut empty_streak = 0u32;
    for batch_no in 0..max_batches {
        if stop.load(Ordering::Relaxed) {
            warn!("Interrupted, stopping");
            break;
        }
        match runner.delete_attachment_batch(pattern, batch_size).await {
            Ok(0) => {
                empty_streak += 1;
                if empty_streak >= EMPTY_BATCH_LIMIT {
                    info!("No more matching attachments");
                    break;
                }
            }
            Ok(deleted) => {
                empty_streak = 0;
                stats.add(deleted);
            }
            Err(err) => {
                // Transient lock contention; the next batch may go through
                error!(batch = batch_no, error = %err, "Batch failed");
                empty_streak += 1;
                if empty_streak >= EMPTY_BATCH_LIMIT {
                    break;
                }
            }
        }
        // Ease off as the run gets long so autovacuum can keep up
        let pause = (BASE_PAUSE_SECS * (1.0 + batch_no as f64 * 0.01)).min(1.0);
        tokio::time::sleep(Duration::from_secs_f64(pause)).await;
    }
    reporter.abort();

    if let Err(err) = runner.maintenance().await {
        warn!(error = %err, "Post-purge maintenance failed");
    }
    match runner.database_size().await {
        Ok(size) => println!("Database size now: {size}"),
        Err(err) => warn!(error = %err, "Cannot read database size"),
    }

    let (deleted, per_sec, _) = stats.rates();
    println!(
        "{deleted}/{total} attachments deleted in {:.1}s ({per_sec:.0}/s)",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Delete every product template. Meant for resetting a test instance
/// before a fresh import.
pub async fn products(client: &Client, assume_yes: bool) -> Result<()> {
    let ids = client.search("product.template", json!([]), json!({})).await?;
    if ids.is_empty() {
        println!("No products to delete.");
        return Ok(());
    }
    println!("This deletes ALL {} product templates.", ids.len());
    if !assume_yes
        && !dialoguer::Confirm::new()
            .with_prompt("Continue?")
            .default(false)
            .interact()?
    {
        println!("Aborted.");
        return Ok(());
    }

    let started = Instant::now();
    client.unlink("product.template", &ids).await?;
    println!(
        "{} products deleted ({:.2}s)",
        ids.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Flag flipped by the first Ctrl-C so loops can finish their batch.
fn spawn_ctrlc_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.store(true, Ordering::Relaxed);
        }
    });
    flag
}
