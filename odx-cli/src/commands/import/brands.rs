//! Bulk import of product brands (`product.brand`).

use crate::input::Table;
use anyhow::Result;
use odx_rpc::Client;
use serde_json::json;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

pub async fn run(client: &Client, file: &Path, batch_size: usize) -> Result<()> {
    let table = Table::read(file)?;
    table.require_column("name")?;
    if table.is_empty() {
        println!("{} has no rows.", file.display());
        return Ok(());
    }

    let started = Instant::now();
    let mut ok = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;
    let mut batch: Vec<serde_json::Value> = Vec::new();

    for (index, row) in table.rows.iter().enumerate() {
        let index = index + 1;
        let Some(name) = table.cell(row, "name") else {
            warn!(row = index, "Empty brand name, skipped");
            failed += 1;
            continue;
        };

        // One search per row: brand files are small and the originals
        // preferred correctness over speed here.
        match client
            .search("product.brand", json!([["name", "=", name]]), json!({"limit": 1}))
            .await
        {
            Ok(existing) if !existing.is_empty() => {
                info!(row = index, brand = name, "Brand already exists");
                skipped += 1;
                continue;
            }
            Ok(_) => {}
            Err(err) => {
                error!(row = index, brand = name, error = %err, "Row failed");
                failed += 1;
                continue;
            }
        }

        batch.push(json!({"name": name}));
        ok += 1;

        if batch.len() >= batch_size {
            flush(client, &mut batch).await;
        }
    }
    if !batch.is_empty() {
        flush(client, &mut batch).await;
    }

    println!(
        "Brand import finished: {ok} created, {skipped} already existed, {failed} failed ({:.2}s)",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn flush(client: &Client, batch: &mut Vec<serde_json::Value>) {
    let size = batch.len();
    match client.create("product.brand", json!(std::mem::take(batch))).await {
        Ok(ids) => info!(size, ids = ?ids, "Brand batch created"),
        Err(err) => error!(size, error = %err, "Brand batch failed"),
    }
}
