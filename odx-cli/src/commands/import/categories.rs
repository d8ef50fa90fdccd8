//! Bulk import of categories, for the inventory tree (`product.category`)
//! or the point-of-sale tree (`pos.category`).
//!
//! Input columns: `name`, plus an optional parent reference in
//! `parent_id/name` (or `parent_id/id` when the file carries raw ids).

use crate::input::Table;
use anyhow::Result;
use odx_rpc::Client;
use serde_json::json;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

pub async fn run(client: &Client, file: &Path, model: &str, batch_size: usize) -> Result<()> {
    let table = Table::read(file)?;
    table.require_column("name")?;

    let started = Instant::now();
    let mut ok = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;
    let mut batch: Vec<serde_json::Value> = Vec::new();

    for (index, row) in table.rows.iter().enumerate() {
        let index = index + 1;
        let Some(name) = table.cell(row, "name") else {
            warn!(row = index, "Empty category name, skipped");
            failed += 1;
            continue;
        };

        match client
            .search(model, json!([["name", "=", name]]), json!({"limit": 1}))
            .await
        {
            Ok(existing) if !existing.is_empty() => {
                info!(row = index, category = name, "Category already exists");
                skipped += 1;
                continue;
            }
            Ok(_) => {}
            Err(err) => {
                error!(row = index, category = name, error = %err, "Row failed");
                failed += 1;
                continue;
            }
        }

        let mut vals = json!({"name": name});
        if let Some(parent_id) = parent_for(client, model, &table, row, index).await {
            vals["parent_id"] = json!(parent_id);
        }
        batch.push(vals);
        ok += 1;

        if batch.len() >= batch_size {
            flush(client, model, &mut batch).await;
        }
    }
    if !batch.is_empty() {
        flush(client, model, &mut batch).await;
    }

    println!(
        "Category import ({model}) finished: {ok} created, {skipped} already existed, \
         {failed} failed ({:.2}s)",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Resolve the parent column to an id, creating the parent when it is
/// named but missing. Parent trouble downgrades the row to a root
/// category instead of losing it.
async fn parent_for(
    client: &Client,
    model: &str,
    table: &Table,
    row: &[String],
    index: usize,
) -> Option<i64> {
    if let Some(raw) = table.cell(row, "parent_id/id") {
        match raw.parse() {
            Ok(id) => return Some(id),
            Err(_) => warn!(row = index, value = raw, "Bad parent id, importing as root"),
        }
    }
    let parent_name = table.cell(row, "parent_id/name")?;

    match client
        .search(model, json!([["name", "=", parent_name]]), json!({"limit": 1}))
        .await
    {
        Ok(ids) if !ids.is_empty() => ids.first().copied(),
        Ok(_) => match client.create(model, json!({"name": parent_name})).await {
            Ok(ids) => {
                info!(row = index, parent = parent_name, "Created missing parent");
                ids.first().copied()
            }
            Err(err) => {
                warn!(row = index, parent = parent_name, error = %err,
                      "Cannot create parent, importing as root");
                None
            }
        },
        Err(err) => {
            warn!(row = index, parent = parent_name, error = %err,
                  "Parent lookup failed, importing as root");
            None
        }
    }
}

async fn flush(client: &Client, model: &str, batch: &mut Vec<serde_json::Value>) {
    let size = batch.len();
    match client.create(model, json!(std::mem::take(batch))).await {
        Ok(_) => info!(model, size, "Category batch created"),
        Err(err) => error!(model, size, error = %err, "Category batch failed"),
    }
}
