//! Bulk import of price lists (`product.pricelist`) and their fixed-price
//! rules (`product.pricelist.item`).
//!
//! The rule file references price lists by `descripcion_lista` and
//! products by `cod_barra`; both must already exist.

use crate::cache;
use crate::input::Table;
use anyhow::Result;
use odx_rpc::Client;
use serde_json::json;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub async fn run_pricelists(client: &Client, file: &Path, batch_size: usize) -> Result<()> {
    let table = Table::read(file)?;
    table.require_column("descripcion_lista")?;

    let existing = cache::pricelists(client).await?;
    info!(count = existing.len(), "Loaded existing price lists");

    let started = Instant::now();
    let mut ok = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;
    let mut batch: Vec<serde_json::Value> = Vec::new();
    let mut queued = std::collections::HashSet::new();

    for (index, row) in table.rows.iter().enumerate() {
        let index = index + 1;
        let Some(name) = table.cell(row, "descripcion_lista") else {
            warn!(row = index, "Empty price list name, skipped");
            failed += 1;
            continue;
        };
        let key = name.trim().to_uppercase();
        if existing.contains_key(&key) || !queued.insert(key) {
            info!(row = index, pricelist = name, "Price list already exists");
            skipped += 1;
            continue;
        }

        let mut vals = json!({"name": name});
        if let Some(currency) = table.cell(row, "currency_id") {
            match client
                .search("res.currency", json!([["name", "=", currency]]), json!({"limit": 1}))
                .await
            {
                Ok(ids) if !ids.is_empty() => vals["currency_id"] = json!(ids[0]),
                Ok(_) => warn!(row = index, currency, "Unknown currency, using the default"),
                Err(err) => {
                    error!(row = index, currency, error = %err, "Currency lookup failed");
                    failed += 1;
                    continue;
                }
            }
        }
        batch.push(vals);
        ok += 1;

        if batch.len() >= batch_size {
            flush(client, &mut batch).await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
    if !batch.is_empty() {
        flush(client, &mut batch).await;
    }

    println!(
        "Price list import finished: {ok} created, {skipped} already existed, {failed} failed \
         ({:.2}s)",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

pub async fn run_rules(
    client: &Client,
    file: &Path,
    batch_size: usize,
    pause_ms: u64,
) -> Result<()> {
    let table = Table::read(file)?;
    for column in ["descripcion_lista", "cod_barra", "precio_segun_lista"] {
        table.require_column(column)?;
    }

    let pricelists = cache::pricelists(client).await?;
    let products = cache::products_by_barcode(client).await?;

    let started = Instant::now();
    let mut failed = 0usize;
    let mut vals: Vec<serde_json::Value> = Vec::new();

    // Resolve everything in memory first, then create in paced batches.
    for (index, row) in table.rows.iter().enumerate() {
        let index = index + 1;
        if index % 1000 == 0 {
            info!(row = index, total = table.len(), "Resolving rules");
        }

        let (Some(list_name), Some(barcode), Some(raw_price)) = (
            table.cell(row, "descripcion_lista"),
            table.cell(row, "cod_barra"),
            table.cell(row, "precio_segun_lista"),
        ) else {
            warn!(row = index, "Incomplete rule row, skipped");
            failed += 1;
            continue;
        };

        let Some(pricelist_id) = pricelists.get(&list_name.trim().to_uppercase()) else {
            warn!(row = index, pricelist = list_name, "Unknown price list, skipped");
            failed += 1;
            continue;
        };
        let Some(product) = products.get(barcode) else {
            warn!(row = index, barcode, "No product with this barcode, skipped");
            failed += 1;
            continue;
        };
        let Some(price) = parse_price(raw_price) else {
            warn!(row = index, price = raw_price, "Unparseable price, skipped");
            failed += 1;
            continue;
        };

        vals.push(json!({
            "pricelist_id": pricelist_id,
            "product_tmpl_id": product.id,
            "applied_on": "1_product",
            "compute_price": "fixed",
            "fixed_price": price,
        }));
    }

    let total = vals.len();
    let mut created = 0usize;
    for chunk in vals.chunks(batch_size) {
        match client.create("product.pricelist.item", json!(chunk)).await {
            Ok(_) => {
                created += chunk.len();
                info!(created, total, "Rule batch created");
            }
            Err(err) => {
                error!(error = %err, created, "Rule batch failed, stopping");
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(pause_ms)).await;
    }

    println!(
        "Price rule import finished: {created}/{total} created, {failed} rows skipped ({:.2}s)",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Accept only plain decimal prices: an optional leading minus, digits,
/// at most one dot. Thousands separators and currency symbols coming
/// from spreadsheet exports are rejected rather than misread.
fn parse_price(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if digits.is_empty() || digits.chars().filter(|c| *c == '.').count() > 1 {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    trimmed.parse().ok()
}

async fn flush(client: &Client, batch: &mut Vec<serde_json::Value>) {
    let size = batch.len();
    match client.create("product.pricelist", json!(std::mem::take(batch))).await {
        Ok(_) => info!(size, "Price list batch created"),
        Err(err) => error!(size, error = %err, "Price list batch failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_decimals() {
        assert_eq!(parse_price("1250"), Some(1250.0));
        assert_eq!(parse_price(" 99.90 "), Some(99.9));
        assert_eq!(parse_price("-5.5"), Some(-5.5));
    }

    #[test]
    fn rejects_formatted_numbers() {
        assert_eq!(parse_price("1.250,00"), None);
        assert_eq!(parse_price("$100"), None);
        assert_eq!(parse_price("1.2.3"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("-"), None);
    }
}
