//! Preloaded reference-data maps.
//!
//! Every importer starts by pulling the relevant reference tables into
//! memory so row processing does at most one remote call per row (the
//! "precarga" step of the original scripts).

use anyhow::Result;
use odx_common::util::normalize_key;
use odx_rpc::{Client, Value};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info};

/// `l10n_latam.identification.type` by normalized name (upper, no spaces,
/// so "C U I T" and "cuit" both hit).
pub async fn identification_types(client: &Client) -> Result<HashMap<String, i64>> {
    let rows = client
        .search_read(
            "l10n_latam.identification.type",
            json!([]),
            json!({"fields": ["id", "name"]}),
        )
        .await?;
    Ok(name_map(&rows, normalize_key))
}

/// `l10n_ar.afip.responsibility.type` by trimmed uppercase name.
pub async fn afip_responsibility_types(client: &Client) -> Result<HashMap<String, i64>> {
    let rows = client
        .search_read(
            "l10n_ar.afip.responsibility.type",
            json!([]),
            json!({"fields": ["id", "name"]}),
        )
        .await?;
    Ok(name_map(&rows, |name| name.trim().to_uppercase()))
}

/// Category map (works for `product.category` and `pos.category`),
/// by trimmed lowercase name.
pub async fn categories(client: &Client, model: &str) -> Result<HashMap<String, i64>> {
    let rows = client
        .search_read(model, json!([]), json!({"fields": ["id", "name"]}))
        .await?;
    let map = name_map(&rows, |name| name.trim().to_lowercase());
    info!(model, count = map.len(), "Loaded categories");
    Ok(map)
}

/// `product.pricelist` by trimmed uppercase name.
pub async fn pricelists(client: &Client) -> Result<HashMap<String, i64>> {
    let rows = client
        .search_read("product.pricelist", json!([]), json!({"fields": ["id", "name"]}))
        .await?;
    Ok(name_map(&rows, |name| name.trim().to_uppercase()))
}

/// Taxes split by `type_tax_use`; `none` counts for both sides.
/// Returns (sale map, purchase map), keyed by trimmed name.
pub async fn taxes_by_use(
    client: &Client,
) -> Result<(HashMap<String, i64>, HashMap<String, i64>)> {
    let rows = client
        .search_read(
            "account.tax",
            json!([]),
            json!({"fields": ["id", "name", "type_tax_use"]}),
        )
        .await?;

    let mut sale = HashMap::new();
    let mut purchase = HashMap::new();
    for row in &rows {
        let (Some(id), Some(name)) = (
            row.get("id").and_then(Value::as_i64),
            row.get("name").and_then(Value::as_str),
        ) else {
            continue;
        };
        let name = name.trim().to_string();
        match row.get("type_tax_use").and_then(Value::as_str).unwrap_or("none") {
            "sale" => {
                sale.insert(name, id);
            }
            "purchase" => {
                purchase.insert(name, id);
            }
            _ => {
                sale.insert(name.clone(), id);
                purchase.insert(name, id);
            }
        }
    }
    info!(sale = sale.len(), purchase = purchase.len(), "Loaded taxes");
    Ok((sale, purchase))
}

/// An existing product template, as preloaded for the product importer.
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub id: i64,
    pub name: String,
    pub list_price: f64,
    pub standard_price: f64,
}

/// Product templates that carry a barcode, keyed by barcode.
pub async fn products_by_barcode(client: &Client) -> Result<HashMap<String, ProductRecord>> {
    let rows = client
        .search_read(
            "product.template",
            json!([["barcode", "!=", false]]),
            json!({"fields": ["id", "barcode", "name", "list_price", "standard_price"]}),
        )
        .await?;

    let mut map = HashMap::new();
    for row in &rows {
        let (Some(id), Some(barcode)) = (
            row.get("id").and_then(Value::as_i64),
            row.get("barcode").and_then(Value::as_str),
        ) else {
            continue;
        };
        map.insert(
            barcode.to_string(),
            ProductRecord {
                id,
                name: row
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                list_price: row.get("list_price").and_then(Value::as_f64).unwrap_or(0.0),
                standard_price: row
                    .get("standard_price")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
            },
        );
    }
    info!(count = map.len(), "Loaded products with barcode");
    Ok(map)
}

/// Get-or-create cache for `product.brand`.
#[derive(Default)]
pub struct BrandCache {
    map: HashMap<String, i64>,
}

impl BrandCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(&mut self, client: &Client, name: &str) -> Result<i64> {
        let key = name.trim().to_lowercase();
        if let Some(id) = self.map.get(&key) {
            return Ok(*id);
        }
        let existing = client
            .search("product.brand", json!([["name", "=", name]]), json!({"limit": 1}))
            .await?;
        let id = match existing.first() {
            Some(id) => *id,
            None => {
                let created = client.create("product.brand", json!({"name": name})).await?;
                let id = created.first().copied().unwrap_or_default();
                debug!(brand = name, id, "Created brand");
                id
            }
        };
        self.map.insert(key, id);
        Ok(id)
    }
}

/// Name-keyed supplier partner cache (`res.partner`), case-insensitive.
#[derive(Default)]
pub struct PartnerCache {
    map: HashMap<String, i64>,
}

impl PartnerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, id: i64) {
        self.map.insert(name.trim().to_lowercase(), id);
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.map.get(&name.trim().to_lowercase()).copied()
    }
}

fn name_map<F>(rows: &[Value], normalize: F) -> HashMap<String, i64>
where
    F: Fn(&str) -> String,
{
    rows.iter()
        .filter_map(|row| {
            let id = row.get("id").and_then(Value::as_i64)?;
            let name = row.get("name").and_then(Value::as_str)?;
            Some((normalize(name), id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(id: i64, name: &str) -> Value {
        let mut map = BTreeMap::new();
        map.insert("id".to_string(), Value::Int(id));
        map.insert("name".to_string(), Value::Str(name.to_string()));
        Value::Struct(map)
    }

    #[test]
    fn name_map_applies_normalizer_and_skips_false_names() {
        let mut falsy = BTreeMap::new();
        falsy.insert("id".to_string(), Value::Int(9));
        falsy.insert("name".to_string(), Value::Bool(false));
        let rows = vec![record(1, "  CUIT "), Value::Struct(falsy)];

        let map = name_map(&rows, normalize_key);
        assert_eq!(map.get("CUIT"), Some(&1));
        assert_eq!(map.len(), 1);
    }
}
