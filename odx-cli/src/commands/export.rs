//! CSV exports in the layout the point-of-sale loader expects.

use anyhow::{Context, Result};
use odx_rpc::{Client, Value};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Export the stock of one location plus the category tree, one CSV each.
pub async fn stock(
    client: &Client,
    location: i64,
    products_file: &Path,
    categories_file: &Path,
) -> Result<()> {
    let quants = client
        .search_read(
            "stock.quant",
            json!([["location_id.id", "=", location]]),
            json!({"fields": ["product_id", "available_quantity"]}),
        )
        .await?;
    info!(location, quants = quants.len(), "Read stock quants");

    let quantities = sum_by_product(&quants);

    let product_ids: Vec<i64> = quantities.iter().map(|(id, _)| *id).collect();
    let products = client
        .search_read(
            "product.product",
            json!([["id", "in", product_ids]]),
            json!({"fields": ["id", "barcode", "name", "categ_id", "list_price"]}),
        )
        .await?;

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_path(products_file)
        .with_context(|| format!("Cannot write {}", products_file.display()))?;
    writer.write_record([
        "Producto/Código de barras",
        "Producto/Nombre",
        "Producto/Categoría de producto/ID",
        "Cantidad inventariada",
        "Producto/Precio de venta",
    ])?;

    let mut rows = 0usize;
    for (product_id, quantity) in &quantities {
        let Some(product) = products
            .iter()
            .find(|p| p.get("id").and_then(Value::as_i64) == Some(*product_id))
        else {
            warn!(product_id, "Product disappeared between reads, skipped");
            continue;
        };
        // Products without a barcode export their id so the row survives
        let barcode = product
            .get("barcode")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| product_id.to_string());
        let name = product.get("name").and_then(Value::as_str).unwrap_or_default();
        let category = product
            .get("categ_id")
            .and_then(Value::many2one_id)
            .map(|id| id.to_string())
            .unwrap_or_default();
        let price = product.get("list_price").and_then(Value::as_f64).unwrap_or(0.0);

        writer.write_record([
            barcode.as_str(),
            name,
            category.as_str(),
            &quantity.to_string(),
            &price.to_string(),
        ])?;
        rows += 1;
    }
    writer.flush()?;
    println!("{rows} products written to {}", products_file.display());

    export_categories(client, categories_file).await
}

/// Total quantity per product, one entry per product in first-seen order.
/// A product can have several quants in the same location.
fn sum_by_product(quants: &[Value]) -> Vec<(i64, f64)> {
    let mut order: Vec<i64> = Vec::new();
    let mut totals: HashMap<i64, f64> = HashMap::new();
    for quant in quants {
        let Some(product_id) = quant.get("product_id").and_then(Value::many2one_id) else {
            warn!("Quant without product, skipped");
            continue;
        };
        let quantity = quant
            .get("available_quantity")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        if !totals.contains_key(&product_id) {
            order.push(product_id);
        }
        *totals.entry(product_id).or_insert(0.0) += quantity;
    }
    order.into_iter().map(|id| (id, totals[&id])).collect()
}

async fn export_categories(client: &Client, path: &Path) -> Result<()> {
    let categories = client
        .search_read(
            "product.category",
            json!([]),
            json!({"fields": ["id", "name", "parent_id"], "order": "id asc"}),
        )
        .await?;

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_path(path)
        .with_context(|| format!("Cannot write {}", path.display()))?;
    writer.write_record(["id", "nombre", "parent_id"])?;

    for category in &categories {
        let id = category
            .get("id")
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .unwrap_or_default();
        let name = category.get("name").and_then(Value::as_str).unwrap_or_default();
        // root categories export an empty parent cell
        let parent = category
            .get("parent_id")
            .and_then(Value::many2one_id)
            .map(|id| id.to_string())
            .unwrap_or_default();
        writer.write_record([id.as_str(), name, parent.as_str()])?;
    }
    writer.flush()?;
    println!("{} categories written to {}", categories.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn quant(product_id: i64, quantity: f64) -> Value {
        let mut map = BTreeMap::new();
        map.insert(
            "product_id".to_string(),
            Value::Array(vec![Value::Int(product_id), Value::Str("producto".into())]),
        );
        map.insert("available_quantity".to_string(), Value::Double(quantity));
        Value::Struct(map)
    }

    #[test]
    fn quants_collapse_to_one_entry_per_product() {
        let quants = vec![quant(1, 3.0), quant(2, 1.0), quant(1, 2.5)];
        assert_eq!(sum_by_product(&quants), vec![(1, 5.5), (2, 1.0)]);
    }

    #[test]
    fn quant_without_product_is_dropped() {
        let orphan = Value::Struct(BTreeMap::from([(
            "available_quantity".to_string(),
            Value::Double(4.0),
        )]));
        assert_eq!(sum_by_product(&[orphan, quant(9, 1.0)]), vec![(9, 1.0)]);
    }
}
