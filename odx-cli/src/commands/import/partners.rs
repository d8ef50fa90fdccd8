//! Bulk import of partners (`res.partner`), covering supplier and
//! customer files.
//!
//! Both kinds share the Argentine fiscal columns: the identification
//! type (`l10n_latam_identification_type_id/name`), the AFIP
//! responsibility (`l10n_ar_afip_responsibility_type_id/name`) and the
//! `vat` number. A CUIT must have exactly 11 digits and a DNI exactly 8;
//! anything else imports the partner without a VAT rather than failing
//! the whole batch server-side.

use crate::cache;
use crate::input::Table;
use anyhow::Result;
use odx_common::util::{digits_only, normalize_key};
use odx_rpc::Client;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartnerKind {
    Supplier,
    Customer,
}

impl PartnerKind {
    fn label(self) -> &'static str {
        match self {
            PartnerKind::Supplier => "supplier",
            PartnerKind::Customer => "customer",
        }
    }
}

/// A row translated into create values, plus the keys used for
/// duplicate detection.
#[derive(Debug)]
struct BuiltPartner {
    vals: serde_json::Value,
    name: String,
    vat: Option<String>,
}

pub async fn run(client: &Client, file: &Path, kind: PartnerKind, batch_size: usize) -> Result<()> {
    let table = Table::read(file)?;
    table.require_column("name")?;

    let id_types = cache::identification_types(client).await?;
    let afip_types = cache::afip_responsibility_types(client).await?;
    info!(
        identification_types = id_types.len(),
        afip_types = afip_types.len(),
        "Reference data loaded"
    );

    // Customer files are large; one upfront dump beats a search per row.
    let (mut known_names, mut known_vats) = match kind {
        PartnerKind::Customer => existing_partners(client).await?,
        PartnerKind::Supplier => (HashSet::new(), HashSet::new()),
    };

    let started = Instant::now();
    let mut ok = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;
    let mut batch: Vec<serde_json::Value> = Vec::new();

    for (index, row) in table.rows.iter().enumerate() {
        let index = index + 1;
        let built = match build_partner(&table, row, kind, &id_types, &afip_types) {
            Ok(built) => built,
            Err(reason) => {
                warn!(row = index, reason = %reason, "Row skipped");
                failed += 1;
                continue;
            }
        };

        let duplicate = match kind {
            PartnerKind::Customer => {
                let name_key = built.name.trim().to_uppercase();
                let vat_hit = built
                    .vat
                    .as_deref()
                    .is_some_and(|vat| known_vats.contains(vat));
                if known_names.contains(&name_key) || vat_hit {
                    true
                } else {
                    known_names.insert(name_key);
                    if let Some(vat) = &built.vat {
                        known_vats.insert(vat.clone());
                    }
                    false
                }
            }
            PartnerKind::Supplier => {
                match find_supplier(client, &built.name, built.vat.as_deref()).await {
                    Ok(found) => found,
                    Err(err) => {
                        error!(row = index, partner = built.name, error = %err, "Row failed");
                        failed += 1;
                        continue;
                    }
                }
            }
        };
        if duplicate {
            info!(row = index, partner = built.name, "Partner already exists");
            skipped += 1;
            continue;
        }

        batch.push(built.vals);
        ok += 1;
        if batch.len() >= batch_size {
            flush(client, kind, &mut batch).await;
        }
    }
    if !batch.is_empty() {
        flush(client, kind, &mut batch).await;
    }

    println!(
        "{} import finished: {ok} created, {skipped} already existed, {failed} failed ({:.2}s)",
        kind.label(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Names (uppercased) and VATs of every partner already in the database.
async fn existing_partners(client: &Client) -> Result<(HashSet<String>, HashSet<String>)> {
    let rows = client
        .search_read("res.partner", json!([]), json!({"fields": ["name", "vat"]}))
        .await?;
    let mut names = HashSet::new();
    let mut vats = HashSet::new();
    for row in &rows {
        if let Some(name) = row.get("name").and_then(odx_rpc::Value::as_str) {
            names.insert(name.trim().to_uppercase());
        }
        if let Some(vat) = row.get("vat").and_then(odx_rpc::Value::as_str) {
            vats.insert(vat.trim().to_string());
        }
    }
    info!(partners = names.len(), "Loaded existing partners");
    Ok((names, vats))
}

async fn find_supplier(client: &Client, name: &str, vat: Option<&str>) -> Result<bool> {
    let domain = match vat {
        Some(vat) => json!(["|", ["name", "=", name], ["vat", "=", vat]]),
        None => json!([["name", "=", name]]),
    };
    let ids = client.search("res.partner", domain, json!({"limit": 1})).await?;
    Ok(!ids.is_empty())
}

/// Translate one row to `res.partner` create values. Errors are
/// human-readable skip reasons, not failures.
fn build_partner(
    table: &Table,
    row: &[String],
    kind: PartnerKind,
    id_types: &HashMap<String, i64>,
    afip_types: &HashMap<String, i64>,
) -> Result<BuiltPartner, String> {
    let name = table.cell(row, "name").ok_or("empty name")?.to_string();

    let mut vals = json!({
        "name": name,
        "company_type": table.cell(row, "company_type").unwrap_or("company"),
    });
    for (column, field) in [
        ("street", "street"),
        ("city", "city"),
        ("email", "email"),
        ("phone", "phone"),
        // the legacy exports carry the phone under this search-field name
        ("phone_mobile_search", "phone_mobile_search"),
    ] {
        if let Some(value) = table.cell(row, column) {
            vals[field] = json!(value);
        }
    }

    // Identification type, by id column or by name
    let mut id_type_name = None;
    if let Some(raw) = table.cell(row, "l10n_latam_identification_type_id/id") {
        if let Ok(id) = raw.parse::<i64>() {
            vals["l10n_latam_identification_type_id"] = json!(id);
        }
    } else if let Some(type_name) = table.cell(row, "l10n_latam_identification_type_id/name") {
        match id_types.get(&normalize_key(type_name)) {
            Some(id) => {
                vals["l10n_latam_identification_type_id"] = json!(id);
                id_type_name = Some(normalize_key(type_name));
            }
            None => return Err(format!("unknown identification type '{type_name}'")),
        }
    }

    if let Some(raw) = table.cell(row, "l10n_ar_afip_responsibility_type_id/id") {
        if let Ok(id) = raw.parse::<i64>() {
            vals["l10n_ar_afip_responsibility_type_id"] = json!(id);
        }
    } else if let Some(afip_name) = table.cell(row, "l10n_ar_afip_responsibility_type_id/name") {
        match afip_types.get(&afip_name.trim().to_uppercase()) {
            Some(id) => vals["l10n_ar_afip_responsibility_type_id"] = json!(id),
            None => return Err(format!("unknown AFIP responsibility '{afip_name}'")),
        }
    }

    let vat = validated_vat(
        table.cell(row, "vat"),
        id_type_name.as_deref(),
        kind,
        &name,
    );
    if let Some(vat) = &vat {
        vals["vat"] = json!(vat);
    }

    match kind {
        PartnerKind::Supplier => {
            vals["supplier_rank"] = json!(1);
        }
        PartnerKind::Customer => {
            let rank = table
                .cell(row, "customer_rank")
                .and_then(|raw| raw.parse::<i64>().ok())
                .unwrap_or(1);
            vals["customer_rank"] = json!(rank);
            if let Some(rank) = table
                .cell(row, "supplier_rank")
                .and_then(|raw| raw.parse::<i64>().ok())
            {
                vals["supplier_rank"] = json!(rank);
            }
        }
    }

    Ok(BuiltPartner { vals, name, vat })
}

/// Keep only VAT numbers that match their document type. Customers with a
/// document type other than CUIT/DNI import without a VAT, like the
/// originals did to dodge server-side l10n validation.
fn validated_vat(
    raw: Option<&str>,
    id_type: Option<&str>,
    kind: PartnerKind,
    partner: &str,
) -> Option<String> {
    let digits = digits_only(raw?);
    if digits.is_empty() {
        return None;
    }
    match id_type {
        Some("CUIT") => {
            if digits.len() == 11 {
                Some(digits)
            } else {
                warn!(partner, vat = digits, "CUIT is not 11 digits, importing without VAT");
                None
            }
        }
        Some("DNI") if kind == PartnerKind::Customer => {
            if digits.len() == 8 {
                Some(digits)
            } else {
                warn!(partner, vat = digits, "DNI is not 8 digits, importing without VAT");
                None
            }
        }
        Some(_) if kind == PartnerKind::Customer => {
            warn!(partner, "Unvalidated document type, importing without VAT");
            None
        }
        _ => Some(digits),
    }
}

async fn flush(client: &Client, kind: PartnerKind, batch: &mut Vec<serde_json::Value>) {
    let size = batch.len();
    match client.create("res.partner", json!(std::mem::take(batch))).await {
        Ok(_) => info!(kind = kind.label(), size, "Partner batch created"),
        Err(err) => error!(kind = kind.label(), size, error = %err, "Partner batch failed"),
    }
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

    fn reference() -> (HashMap<String, i64>, HashMap<String, i64>) {
        let id_types = HashMap::from([("CUIT".to_string(), 4), ("DNI".to_string(), 5)]);
        let afip_types = HashMap::from([
            ("IVA RESPONSABLE INSCRIPTO".to_string(), 1),
            ("CONSUMIDOR FINAL".to_string(), 5),
        ]);
        (id_types, afip_types)
    }

    #[test]
    fn builds_supplier_with_valid_cuit() {
        let (id_types, afip_types) = reference();
        let t = table(
            &["name", "vat", "l10n_latam_identification_type_id/name"],
            &["ACME SRL", "30-71234567-8", "CUIT"],
        );
        let built =
            build_partner(&t, &t.rows[0], PartnerKind::Supplier, &id_types, &afip_types).unwrap();
        assert_eq!(built.vals["vat"], "30712345678");
        assert_eq!(built.vals["supplier_rank"], 1);
        assert_eq!(built.vals["l10n_latam_identification_type_id"], 4);
        assert_eq!(built.vat.as_deref(), Some("30712345678"));
    }

    #[test]
    fn short_cuit_drops_vat_but_keeps_partner() {
        let (id_types, afip_types) = reference();
        let t = table(
            &["name", "vat", "l10n_latam_identification_type_id/name"],
            &["ACME SRL", "12345", "CUIT"],
        );
        let built =
            build_partner(&t, &t.rows[0], PartnerKind::Supplier, &id_types, &afip_types).unwrap();
        assert!(built.vals.get("vat").is_none());
        assert!(built.vat.is_none());
    }

    #[test]
    fn customer_dni_must_have_eight_digits() {
        let (id_types, afip_types) = reference();
        let t = table(
            &["name", "vat", "l10n_latam_identification_type_id/name"],
            &["Juan Perez", "12.345.678", "DNI"],
        );
        let built =
            build_partner(&t, &t.rows[0], PartnerKind::Customer, &id_types, &afip_types).unwrap();
        assert_eq!(built.vals["vat"], "12345678");
        assert_eq!(built.vals["customer_rank"], 1);

        let t = table(
            &["name", "vat", "l10n_latam_identification_type_id/name"],
            &["Juan Perez", "123", "DNI"],
        );
        let built =
            build_partner(&t, &t.rows[0], PartnerKind::Customer, &id_types, &afip_types).unwrap();
        assert!(built.vals.get("vat").is_none());
    }

    #[test]
    fn unknown_identification_type_is_a_skip_reason() {
        let (id_types, afip_types) = reference();
        let t = table(
            &["name", "l10n_latam_identification_type_id/name"],
            &["ACME", "PASAPORTE MARCIANO"],
        );
        let err = build_partner(&t, &t.rows[0], PartnerKind::Customer, &id_types, &afip_types)
            .unwrap_err();
        assert!(err.contains("PASAPORTE MARCIANO"));
    }

    #[test]
    fn empty_name_is_rejected() {
        let (id_types, afip_types) = reference();
        let t = table(&["name"], &[""]);
        assert!(
            build_partner(&t, &t.rows[0], PartnerKind::Customer, &id_types, &afip_types).is_err()
        );
    }

    #[test]
    fn optional_columns_flow_through() {
        let (id_types, afip_types) = reference();
        let t = table(
            &["name", "street", "phone", "company_type"],
            &["ACME", "Av. Siempreviva 742", "555-1234", "person"],
        );
        let built =
            build_partner(&t, &t.rows[0], PartnerKind::Customer, &id_types, &afip_types).unwrap();
        assert_eq!(built.vals["street"], "Av. Siempreviva 742");
        assert_eq!(built.vals["phone"], "555-1234");
        assert_eq!(built.vals["company_type"], "person");
    }
}
