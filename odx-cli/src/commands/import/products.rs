//! Bulk import of product templates (`product.template`), keyed by
//! barcode.
//!
//! New barcodes are created; known barcodes are either skipped or, with
//! `--update-prices`, get their cost and sale price refreshed. The whole
//! file is resolved in memory first so the operator can review a summary
//! before anything is written.

use crate::cache::{self, BrandCache, PartnerCache};
use crate::input::Table;
use crate::progress::ProgressBar;
use anyhow::Result;
use odx_common::util::{parse_flexible_bool, strip_control_chars};
use odx_rpc::{Client, Value};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

pub struct ProductOptions {
    pub update_prices: bool,
    pub update_cost: bool,
    pub update_sale_price: bool,
    pub batch_size: usize,
    pub assume_yes: bool,
}

struct NewProduct {
    barcode: String,
    vals: serde_json::Value,
    seller: Option<String>,
}

struct PriceUpdate {
    id: i64,
    name: String,
    /// (old, new)
    cost: Option<(f64, f64)>,
    price: Option<(f64, f64)>,
}

/// What the processing pass found, shown to the operator before anything
/// is written.
#[derive(Default)]
struct ImportPlan {
    rows: usize,
    existing: usize,
    with_taxes: usize,
    without_taxes: usize,
    /// (row number, reason)
    skips: Vec<(usize, String)>,
}

/// Skipped rows shown in full before the count collapses.
const SKIP_PREVIEW: usize = 20;

fn plan_summary(plan: &ImportPlan, creates: usize, updates: usize) -> String {
    use std::fmt::Write as _;
    let mut out = String::new();
    let _ = writeln!(out, "  rows in file:        {}", plan.rows);
    let _ = writeln!(out, "  products to create:  {creates}");
    let _ = writeln!(out, "    with taxes:        {}", plan.with_taxes);
    let _ = writeln!(out, "    without taxes:     {}", plan.without_taxes);
    let _ = writeln!(out, "  prices to update:    {updates}");
    let _ = writeln!(out, "  already existing:    {}", plan.existing);
    let _ = writeln!(out, "  skipped rows:        {}", plan.skips.len());
    for (row, reason) in plan.skips.iter().take(SKIP_PREVIEW) {
        let _ = writeln!(out, "    row {row}: {reason}");
    }
    if plan.skips.len() > SKIP_PREVIEW {
        let _ = writeln!(out, "    ... and {} more", plan.skips.len() - SKIP_PREVIEW);
    }
    out
}

pub async fn run(client: &Client, file: &Path, options: &ProductOptions) -> Result<()> {
    let table = Table::read(file)?;
    table.require_column("barcode")?;

    let existing = cache::products_by_barcode(client).await?;
    let (sale_taxes, purchase_taxes) = cache::taxes_by_use(client).await?;
    let categories = cache::categories(client, "product.category").await?;
    let pos_categories = cache::categories(client, "pos.category").await?;
    let mut brands = BrandCache::new();

    let started = Instant::now();
    let mut creates: Vec<NewProduct> = Vec::new();
    let mut updates: Vec<PriceUpdate> = Vec::new();
    let mut seen_barcodes: HashSet<String> = HashSet::new();
    let mut plan = ImportPlan { rows: table.len(), ..ImportPlan::default() };
    let bar = ProgressBar::new("Processing rows", table.len());

    for (index, row) in table.rows.iter().enumerate() {
        let index = index + 1;
        bar.update(index);
        let Some(barcode) = table.cell(row, "barcode") else {
            warn!(row = index, "Row without barcode, skipped");
            plan.skips.push((index, "no barcode".to_string()));
            continue;
        };
        if !seen_barcodes.insert(barcode.to_string()) {
            warn!(row = index, barcode, "Duplicate barcode in file, skipped");
            plan.skips.push((index, format!("duplicate barcode {barcode}")));
            continue;
        }

        if let Some(record) = existing.get(barcode) {
            if options.update_prices {
                if let Some(update) = price_update(&table, row, record, options) {
                    updates.push(update);
                }
            } else {
                plan.existing += 1;
            }
            continue;
        }

        let mut vals = build_vals(
            &table,
            row,
            &sale_taxes,
            &purchase_taxes,
            &categories,
            &pos_categories,
            index,
        );
        if vals.get("taxes_id").is_some() || vals.get("supplier_taxes_id").is_some() {
            plan.with_taxes += 1;
        } else {
            plan.without_taxes += 1;
        }
        if let Some(brand) = table.cell(row, "product_brand_id") {
            match brands.resolve(client, brand).await {
                Ok(id) => vals["product_brand_id"] = json!(id),
                Err(err) => warn!(row = index, brand, error = %err, "Brand unresolved"),
            }
        }
        creates.push(NewProduct {
            barcode: barcode.to_string(),
            vals,
            seller: table.cell(row, "seller_ids/name").map(str::to_string),
        });
    }

    println!("Product import plan for {}:", file.display());
    print!("{}", plan_summary(&plan, creates.len(), updates.len()));
    if creates.is_empty() && updates.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }
    if !options.assume_yes
        && !dialoguer::Confirm::new()
            .with_prompt("Proceed?")
            .default(false)
            .interact()?
    {
        println!("Aborted.");
        return Ok(());
    }

    apply_updates(client, &updates, options.batch_size).await;
    let created = apply_creates(client, &creates, options.batch_size).await;
    link_suppliers(client, &creates, &created).await?;

    println!(
        "Product import finished: {} created, {} updated ({:.2}s)",
        created.len(),
        updates.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Compare file prices against the stored record; `None` when nothing
/// would change.
fn price_update(
    table: &Table,
    row: &[String],
    record: &cache::ProductRecord,
    options: &ProductOptions,
) -> Option<PriceUpdate> {
    let file_cost = table
        .cell(row, "standard_price")
        .and_then(|raw| raw.parse::<f64>().ok());
    let file_price = table
        .cell(row, "list_price")
        .and_then(|raw| raw.parse::<f64>().ok());

    let cost = match (options.update_cost, file_cost) {
        (true, Some(new)) if (new - record.standard_price).abs() > f64::EPSILON => {
            Some((record.standard_price, new))
        }
        _ => None,
    };
    let price = match (options.update_sale_price, file_price) {
        (true, Some(new)) if (new - record.list_price).abs() > f64::EPSILON => {
            Some((record.list_price, new))
        }
        _ => None,
    };

    if cost.is_none() && price.is_none() {
        return None;
    }
    Some(PriceUpdate { id: record.id, name: record.name.clone(), cost, price })
}

/// Translate one row to `product.template` create values, everything
/// except the brand (which needs a remote round trip).
fn build_vals(
    table: &Table,
    row: &[String],
    sale_taxes: &HashMap<String, i64>,
    purchase_taxes: &HashMap<String, i64>,
    categories: &HashMap<String, i64>,
    pos_categories: &HashMap<String, i64>,
    index: usize,
) -> serde_json::Value {
    let name = table
        .cell(row, "name")
        .map(strip_control_chars)
        .unwrap_or_else(|| "SIN NOMBRE".to_string());
    let mut vals = json!({
        "name": name,
        "barcode": table.cell(row, "barcode"),
        "type": "product",
        "purchase_ok": true,
        "sale_ok": true,
        "list_price": parse_float(table.cell(row, "list_price")),
        "standard_price": parse_float(table.cell(row, "standard_price")),
        "available_in_pos": table
            .cell(row, "available_in_pos")
            .map(parse_flexible_bool)
            .unwrap_or(false),
    });

    if let Some(code) = table.cell(row, "default_code") {
        vals["default_code"] = json!(strip_control_chars(code));
    }
    if let Some(description) = table.cell(row, "description") {
        vals["description"] = json!(strip_control_chars(description));
    }
    // Only the two values Odoo accepts; the files carry stray text here
    if let Some(method) = table.cell(row, "purchase_method") {
        if method == "purchase" || method == "receive" {
            vals["purchase_method"] = json!(method);
        }
    }

    if let Some(category) = table.cell(row, "categ_id/name") {
        match categories.get(&category.trim().to_lowercase()) {
            Some(id) => vals["categ_id"] = json!(id),
            None => warn!(row = index, category, "Unknown category"),
        }
    }
    if let Some(category) = table.cell(row, "pos_categ_id/name") {
        match pos_categories.get(&category.trim().to_lowercase()) {
            Some(id) => vals["pos_categ_id"] = json!(id),
            None => warn!(row = index, category, "Unknown POS category"),
        }
    }

    // One tax cell feeds both sides; which field it lands in depends on
    // the tax's type_tax_use, preloaded into the two maps.
    let tax_cell = table.cell(row, "taxes_id/id");
    let (sale_ids, _) = resolve_taxes(tax_cell, sale_taxes);
    if !sale_ids.is_empty() {
        vals["taxes_id"] = json!([[6, 0, sale_ids]]);
    }
    let (purchase_ids, unknown) = resolve_taxes(tax_cell, purchase_taxes);
    if !purchase_ids.is_empty() {
        vals["supplier_taxes_id"] = json!([[6, 0, purchase_ids]]);
    }
    for tax in unknown {
        if !sale_taxes.contains_key(&tax) {
            warn!(row = index, tax, "Unknown tax");
        }
    }

    vals
}

fn parse_float(raw: Option<&str>) -> f64 {
    raw.and_then(|r| r.replace(',', ".").parse().ok()).unwrap_or(0.0)
}

/// Resolve a comma-separated tax cell against a tax map; returns the ids
/// found and the names that were not.
fn resolve_taxes(
    raw: Option<&str>,
    taxes: &HashMap<String, i64>,
) -> (Vec<i64>, Vec<String>) {
    let mut ids = Vec::new();
    let mut unknown = Vec::new();
    for name in raw.unwrap_or_default().split(',') {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        match taxes.get(name) {
            Some(id) => ids.push(*id),
            None => unknown.push(name.to_string()),
        }
    }
    (ids, unknown)
}

async fn apply_updates(client: &Client, updates: &[PriceUpdate], batch_size: usize) {
    if updates.is_empty() {
        return;
    }
    let bar = ProgressBar::new("Updating prices", updates.len());
    let mut done = 0usize;
    for chunk in updates.chunks(batch_size) {
        for update in chunk {
            let mut vals = json!({});
            if let Some((old, new)) = update.cost {
                vals["standard_price"] = json!(new);
                info!(product = update.name, old, new, "Cost change");
            }
            if let Some((old, new)) = update.price {
                vals["list_price"] = json!(new);
                info!(product = update.name, old, new, "Sale price change");
            }
            if let Err(err) = client.write("product.template", &[update.id], vals).await {
                error!(product = update.name, id = update.id, error = %err, "Update failed");
            }
            done += 1;
            bar.update(done);
        }
    }
}

/// Create products in batches; returns barcode to created id.
async fn apply_creates(
    client: &Client,
    creates: &[NewProduct],
    batch_size: usize,
) -> HashMap<String, i64> {
    let mut created = HashMap::new();
    if creates.is_empty() {
        return created;
    }
    let bar = ProgressBar::new("Creating products", creates.len());
    let mut done = 0usize;
    for chunk in creates.chunks(batch_size) {
        let vals: Vec<&serde_json::Value> = chunk.iter().map(|p| &p.vals).collect();
        match client.create("product.template", json!(vals)).await {
            Ok(ids) => {
                for (product, id) in chunk.iter().zip(ids) {
                    created.insert(product.barcode.clone(), id);
                }
            }
            Err(err) => error!(size = chunk.len(), error = %err, "Create batch failed"),
        }
        done += chunk.len();
        bar.update(done);
    }
    created
}

/// Attach the default supplier (`product.supplierinfo`) to the products
/// just created.
async fn link_suppliers(
    client: &Client,
    creates: &[NewProduct],
    created: &HashMap<String, i64>,
) -> Result<()> {
    let mut pending: Vec<(&str, i64)> = Vec::new();
    let mut names: HashSet<&str> = HashSet::new();
    for product in creates {
        let (Some(seller), Some(id)) = (product.seller.as_deref(), created.get(&product.barcode))
        else {
            continue;
        };
        pending.push((seller, *id));
        names.insert(seller);
    }
    if pending.is_empty() {
        return Ok(());
    }

    // One dump for the suppliers the file mentions, then create the rest.
    let mut partners = PartnerCache::new();
    let name_list: Vec<&str> = names.iter().copied().collect();
    let rows = client
        .search_read(
            "res.partner",
            json!([["name", "in", name_list]]),
            json!({"fields": ["id", "name"]}),
        )
        .await?;
    for row in &rows {
        if let (Some(id), Some(name)) = (
            row.get("id").and_then(Value::as_i64),
            row.get("name").and_then(Value::as_str),
        ) {
            partners.insert(name, id);
        }
    }

    // Missing suppliers are created in batches, not one call each
    let missing = missing_suppliers(&names, &partners);
    for chunk in missing.chunks(100) {
        let vals: Vec<serde_json::Value> = chunk
            .iter()
            .map(|name| json!({"name": name, "supplier_rank": 1}))
            .collect();
        match client.create("res.partner", json!(vals)).await {
            Ok(ids) => {
                for (name, id) in chunk.iter().zip(ids) {
                    partners.insert(name, id);
                }
            }
            Err(err) => {
                error!(size = chunk.len(), error = %err, "Supplier create batch failed")
            }
        }
    }

    let mut links: Vec<serde_json::Value> = Vec::new();
    for (seller, product_id) in &pending {
        let Some(partner_id) = partners.get(seller) else {
            warn!(supplier = seller, "Supplier unresolved");
            continue;
        };
        // supplierinfo's partner field is historically called `name`
        links.push(json!({"product_tmpl_id": product_id, "name": partner_id}));
    }

    let bar = ProgressBar::new("Linking suppliers", links.len());
    let mut done = 0usize;
    for chunk in links.chunks(100) {
        if let Err(err) = client.create("product.supplierinfo", json!(chunk)).await {
            error!(size = chunk.len(), error = %err, "Supplier link batch failed");
        }
        done += chunk.len();
        bar.update(done);
    }
    info!(links = links.len(), "Suppliers linked");
    Ok(())
}

/// Supplier names from the file with no partner yet, in stable order.
fn missing_suppliers(names: &HashSet<&str>, partners: &PartnerCache) -> Vec<String> {
    let mut missing: Vec<String> = names
        .iter()
        .filter(|name| partners.get(name).is_none())
        .map(|name| name.to_string())
        .collect();
    missing.sort();
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], cells: &[&str]) -> Table {
        Table::from_parts(
            headers.iter().map(|h| h.to_string()).collect(),
            vec![cells.iter().map(|c| c.to_string()).collect()],
        )
    }

    fn taxes() -> (HashMap<String, i64>, HashMap<String, i64>) {
        (
            HashMap::from([("IVA 21%".to_string(), 1), ("IVA 10.5%".to_string(), 2)]),
            HashMap::from([("IVA 21%".to_string(), 3)]),
        )
    }

    #[test]
    fn builds_full_product_vals() {
        let (sale, purchase) = taxes();
        let categories = HashMap::from([("almacen".to_string(), 7)]);
        let pos_categories = HashMap::from([("bebidas".to_string(), 2)]);
        let t = table(
            &[
                "barcode", "name", "list_price", "standard_price", "categ_id/name",
                "pos_categ_id/name", "taxes_id/id", "available_in_pos", "purchase_method",
            ],
            &[
                "7791234567890", "Yerba 1kg", "1500,50", "900", "Almacen",
                "Bebidas", "IVA 21%, IVA 10.5%", "VERDADERO", "receive",
            ],
        );

        let vals = build_vals(&t, &t.rows[0], &sale, &purchase, &categories, &pos_categories, 1);
        assert_eq!(vals["name"], "Yerba 1kg");
        assert_eq!(vals["barcode"], "7791234567890");
        assert_eq!(vals["type"], "product");
        assert_eq!(vals["list_price"], 1500.5);
        assert_eq!(vals["standard_price"], 900.0);
        assert_eq!(vals["categ_id"], 7);
        assert_eq!(vals["pos_categ_id"], 2);
        assert_eq!(vals["taxes_id"], json!([[6, 0, [1, 2]]]));
        assert_eq!(vals["supplier_taxes_id"], json!([[6, 0, [3]]]));
        assert_eq!(vals["available_in_pos"], true);
        assert_eq!(vals["purchase_method"], "receive");
    }

    #[test]
    fn defaults_cover_sparse_rows() {
        let (sale, purchase) = taxes();
        let t = table(&["barcode"], &["123"]);
        let vals =
            build_vals(&t, &t.rows[0], &sale, &purchase, &HashMap::new(), &HashMap::new(), 1);
        assert_eq!(vals["name"], "SIN NOMBRE");
        assert_eq!(vals["list_price"], 0.0);
        assert_eq!(vals["available_in_pos"], false);
        assert!(vals.get("taxes_id").is_none());
        assert!(vals.get("purchase_method").is_none());
    }

    #[test]
    fn invalid_purchase_method_is_dropped() {
        let (sale, purchase) = taxes();
        let t = table(&["barcode", "purchase_method"], &["123", "comprar"]);
        let vals =
            build_vals(&t, &t.rows[0], &sale, &purchase, &HashMap::new(), &HashMap::new(), 1);
        assert!(vals.get("purchase_method").is_none());
    }

    #[test]
    fn unknown_taxes_are_reported_not_sent() {
        let (sale, _) = taxes();
        let (ids, unknown) = resolve_taxes(Some("IVA 21%, Ingresos Brutos"), &sale);
        assert_eq!(ids, vec![1]);
        assert_eq!(unknown, vec!["Ingresos Brutos".to_string()]);
    }

    #[test]
    fn price_update_only_reports_changes() {
        let record = cache::ProductRecord {
            id: 42,
            name: "Yerba".to_string(),
            list_price: 1500.0,
            standard_price: 900.0,
        };
        let options = ProductOptions {
            update_prices: true,
            update_cost: true,
            update_sale_price: true,
            batch_size: 50,
            assume_yes: true,
        };

        let t = table(&["barcode", "list_price", "standard_price"], &["x", "1600", "900"]);
        let update = price_update(&t, &t.rows[0], &record, &options).unwrap();
        assert_eq!(update.price, Some((1500.0, 1600.0)));
        assert_eq!(update.cost, None);

        let t = table(&["barcode", "list_price", "standard_price"], &["x", "1500", "900"]);
        assert!(price_update(&t, &t.rows[0], &record, &options).is_none());
    }

    #[test]
    fn plan_summary_reports_tax_stats_and_first_skips() {
        let mut plan = ImportPlan {
            rows: 50,
            existing: 5,
            with_taxes: 30,
            without_taxes: 2,
            skips: Vec::new(),
        };
        for row in 1..=25 {
            plan.skips.push((row, "no barcode".to_string()));
        }

        let summary = plan_summary(&plan, 32, 4);
        assert!(summary.contains("with taxes:        30"));
        assert!(summary.contains("without taxes:     2"));
        assert!(summary.contains("skipped rows:        25"));
        assert!(summary.contains("row 1: no barcode"));
        assert!(summary.contains("row 20: no barcode"));
        assert!(!summary.contains("row 21:"));
        assert!(summary.contains("... and 5 more"));
    }

    #[test]
    fn missing_suppliers_excludes_known_partners() {
        let mut partners = PartnerCache::new();
        partners.insert("ACME SRL", 7);
        let names: HashSet<&str> = ["ACME SRL", "Gamma", "Beta SA"].into_iter().collect();
        assert_eq!(
            missing_suppliers(&names, &partners),
            vec!["Beta SA".to_string(), "Gamma".to_string()]
        );
    }

    #[test]
    fn update_flags_gate_each_price() {
        let record = cache::ProductRecord {
            id: 1,
            name: "p".to_string(),
            list_price: 10.0,
            standard_price: 5.0,
        };
        let options = ProductOptions {
            update_prices: true,
            update_cost: false,
            update_sale_price: true,
            batch_size: 50,
            assume_yes: true,
        };
        let t = table(&["barcode", "list_price", "standard_price"], &["x", "20", "8"]);
        let update = price_update(&t, &t.rows[0], &record, &options).unwrap();
        assert_eq!(update.price, Some((10.0, 20.0)));
        assert_eq!(update.cost, None);
    }
}
