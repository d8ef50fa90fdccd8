//! Direct database access through the `psql` command-line client,
//! optionally inside a docker container.

use anyhow::{bail, Context, Result};
use odx_common::PgConfig;
use tokio::process::Command;
use tracing::{debug, info};

pub struct PsqlRunner {
    pg: PgConfig,
}

impl PsqlRunner {
    pub fn new(pg: PgConfig) -> Self {
        Self { pg }
    }

    /// Run one SQL command, returning trimmed stdout
    /// (`psql -t -A`: tuples only, unaligned).
    pub async fn run(&self, sql: &str) -> Result<String> {
        let mut command = match &self.pg.container {
            Some(container) => {
                let mut c = Command::new("docker");
                c.args(["exec", container, "psql"]);
                c
            }
            None => Command::new("psql"),
        };
        command.args([
            "-h",
            &self.pg.host,
            "-p",
            &self.pg.port.to_string(),
            "-U",
            &self.pg.user,
            "-d",
            &self.pg.dbname,
            "-t",
            "-A",
            "-c",
            sql,
        ]);
        if let Some(password) = &self.pg.password {
            command.env("PGPASSWORD", password);
        }

        debug!(sql, "psql");
        let output = command
            .output()
            .await
            .context("Cannot run psql (is postgresql-client installed?)")?;
        if !output.status.success() {
            bail!("psql failed: {}", String::from_utf8_lossy(&output.stderr).trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Verify the connection and that ir_attachment exists.
    pub async fn check_connection(&self) -> Result<()> {
        self.run("SELECT version();").await?;
        let exists = self
            .run(
                "SELECT EXISTS (SELECT FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_name = 'ir_attachment');",
            )
            .await?;
        if exists != "t" {
            bail!("Table ir_attachment does not exist in '{}'", self.pg.dbname);
        }
        Ok(())
    }

    pub async fn count_attachments(&self, pattern: &str) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM ir_attachment WHERE name ILIKE '%{}%';",
            sql_quote(pattern)
        );
        let output = self.run(&sql).await?;
        output
            .parse()
            .with_context(|| format!("Unexpected count output '{output}'"))
    }

    /// Delete one batch of matching attachments; returns the deleted count.
    /// `SKIP LOCKED` keeps the loop from stalling behind live transactions.
    pub async fn delete_attachment_batch(&self, pattern: &str, batch_size: usize) -> Result<u64> {
        let sql = format!(
            "WITH batch AS (\
               SELECT id FROM ir_attachment \
               WHERE name ILIKE '%{}%' \
               ORDER BY id LIMIT {batch_size} \
               FOR UPDATE SKIP LOCKED\
             ) \
             DELETE FROM ir_attachment WHERE id IN (SELECT id FROM batch);",
            sql_quote(pattern)
        );
        let output = self.run(&sql).await?;
        Ok(parse_delete_count(&output))
    }

    /// Post-purge maintenance: reindex, refresh statistics, vacuum.
    pub async fn maintenance(&self) -> Result<()> {
        info!("Reindexing ir_attachment");
        self.run("REINDEX TABLE ir_attachment;").await?;
        info!("Refreshing statistics");
        self.run("ANALYZE ir_attachment;").await?;
        info!("Vacuuming");
        self.run("VACUUM;").await?;
        self.run("VACUUM ir_attachment;").await?;
        Ok(())
    }

    pub async fn database_size(&self) -> Result<String> {
        let sql = format!(
            "SELECT pg_size_pretty(pg_database_size('{}'));",
            sql_quote(&self.pg.dbname)
        );
        self.run(&sql).await
    }
}

/// Escape a string literal for inclusion in single quotes.
fn sql_quote(value: &str) -> String {
    value.replace('\'', "''")
}

/// Extract the row count from a `DELETE n` command tag.
pub fn parse_delete_count(output: &str) -> u64 {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("DELETE "))
        .filter_map(|count| count.trim().parse().ok())
        .next_back()
        .unwrap_or(0)
}
