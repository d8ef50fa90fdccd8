//! Product image sync with the point-of-sale database.
//!
//! `pull` reads the image blobs straight from the POS database with
//! psql, writing one `<barcode>.jpg` per article. `push` uploads a
//! directory of such files to `image_1920` of the matching templates.

use crate::psql::PsqlRunner;
use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use odx_common::OdxConfig;
use odx_rpc::Client;
use serde_json::json;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub async fn pull(config: &OdxConfig, out: &Path, table: &str) -> Result<()> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("Invalid table name '{table}'");
    }
    let runner = PsqlRunner::new(config.pg()?.clone());
    fs::create_dir_all(out).with_context(|| format!("Cannot create {}", out.display()))?;

    // chr(10): Postgres inserts newlines into encode() output
    let sql = format!(
        "SELECT trim(cod_barra) || '|' || replace(encode(imagen, 'base64'), chr(10), '') \
         FROM {table} \
         WHERE imagen IS NOT NULL AND length(imagen) > 0 \
         AND cod_barra IS NOT NULL AND trim(cod_barra) <> '' \
         AND inhabilitado = 0 \
         ORDER BY id_art;"
    );
    let output = runner.run(&sql).await?;

    let mut written = 0usize;
    let mut failed = 0usize;
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((barcode, encoded)) = line.split_once('|') else {
            warn!(line, "Unparseable image row");
            failed += 1;
            continue;
        };
        let bytes = match STANDARD.decode(encoded) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(barcode, error = %err, "Image is not valid base64");
                failed += 1;
                continue;
            }
        };
        let path = out.join(format!("{barcode}.jpg"));
        if let Err(err) = fs::write(&path, &bytes) {
            warn!(barcode, error = %err, "Cannot write image");
            failed += 1;
            continue;
        }
        written += 1;
    }

    println!("{written} images written to {} ({failed} failed)", out.display());
    Ok(())
}

pub async fn push(client: &Client, dir: &Path) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Cannot read {}", dir.display()))?;

    let mut uploaded = 0usize;
    let mut missing = 0usize;
    let mut skipped = 0usize;
    for entry in entries {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_lowercase().as_str(), "jpg" | "jpeg" | "png"));
        if !is_image {
            skipped += 1;
            continue;
        }
        let Some(barcode) = path.file_stem().and_then(|s| s.to_str()) else {
            skipped += 1;
            continue;
        };

        let ids = client
            .search(
                "product.template",
                json!([["barcode", "=", barcode]]),
                json!({"limit": 1}),
            )
            .await?;
        let Some(id) = ids.first() else {
            warn!(barcode, "No product with this barcode");
            missing += 1;
            continue;
        };

        let bytes =
            fs::read(&path).with_context(|| format!("Cannot read {}", path.display()))?;
        client
            .write("product.template", &[*id], json!({"image_1920": STANDARD.encode(&bytes)}))
            .await?;
        info!(barcode, id, "Image uploaded");
        uploaded += 1;
    }

    println!("{uploaded} images uploaded, {missing} without product, {skipped} non-image files");
    Ok(())
}
