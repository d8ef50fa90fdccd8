#![warn(clippy::all)]

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cache;
mod commands;
mod input;
mod progress;
mod psql;

use commands::import::partners::PartnerKind;
use commands::import::products::ProductOptions;
use odx_common::OdxConfig;
use odx_rpc::Client;

/// Bulk administration toolkit for an Odoo instance.
#[derive(Parser, Debug)]
#[command(name = "odx")]
#[command(version = "0.1.0")]
#[command(about = "Batch imports, purges and image sync for Odoo", long_about = None)]
struct Cli {
    /// Connection profile (default: <config dir>/odx/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also append logs to this plain-text file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new master password hash for odoo.conf
    Passwd,

    /// Bulk-import records from a CSV or XLSX file
    Import {
        #[command(subcommand)]
        entity: ImportCommands,
    },

    /// Export data from the instance to CSV files
    Export {
        #[command(subcommand)]
        what: ExportCommands,
    },

    /// Synchronize product images with the point-of-sale database
    Images {
        #[command(subcommand)]
        action: ImagesCommands,
    },

    /// Bulk-delete records
    Purge {
        #[command(subcommand)]
        target: PurgeCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ImportCommands {
    /// Product brands (product.brand), column: name
    Brands {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = 50)]
        batch_size: usize,
    },

    /// Inventory categories (product.category), or POS categories with --pos
    Categories {
        #[arg(long)]
        file: PathBuf,
        /// Import pos.category instead of product.category
        #[arg(long)]
        pos: bool,
        #[arg(long, default_value_t = 50)]
        batch_size: usize,
    },

    /// Supplier partners (res.partner with supplier_rank = 1)
    Suppliers {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = 50)]
        batch_size: usize,
    },

    /// Customer partners (res.partner)
    Customers {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = 200)]
        batch_size: usize,
    },

    /// Price lists (product.pricelist)
    Pricelists {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = 50)]
        batch_size: usize,
    },

    /// Price list rules (product.pricelist.item)
    PricelistRules {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = 200)]
        batch_size: usize,
        /// Pause between create batches, in milliseconds
        #[arg(long, default_value_t = 300)]
        pause_ms: u64,
    },

    /// Product templates (product.template), keyed by barcode
    Products {
        #[arg(long)]
        file: PathBuf,
        /// Update cost/sale price of products that already exist
        #[arg(long)]
        update_prices: bool,
        /// With --update-prices, leave standard_price untouched
        #[arg(long)]
        no_update_cost: bool,
        /// With --update-prices, leave list_price untouched
        #[arg(long)]
        no_update_sale_price: bool,
        #[arg(long, default_value_t = 50)]
        batch_size: usize,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ExportCommands {
    /// POS-format product/category CSVs for one stock location
    Stock {
        /// stock.location id (visible in the location's URL)
        #[arg(long)]
        location: i64,
        #[arg(long, default_value = "productos.csv")]
        products_file: PathBuf,
        #[arg(long, default_value = "category.csv")]
        categories_file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ImagesCommands {
    /// Export images from the POS database into <out>/<barcode>.jpg
    Pull {
        #[arg(long)]
        out: PathBuf,
        /// POS table holding the images
        #[arg(long, default_value = "articulos")]
        table: String,
    },

    /// Upload <dir>/<barcode>.{jpg,jpeg,png} to the matching products
    Push {
        #[arg(long)]
        dir: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum PurgeCommands {
    /// Delete attachments matching a name pattern
    Attachments {
        #[arg(long, default_value = "factur-x.xml")]
        pattern: String,
        /// rpc: through the API; sql: directly with psql
        #[arg(long, value_enum, default_value_t = Via::Rpc)]
        via: Via,
        /// Maximum attachments to delete (rpc)
        #[arg(long, default_value_t = 10_000)]
        max: usize,
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,
        /// Safety cap on the number of SQL batches
        #[arg(long, default_value_t = 1000)]
        max_batches: usize,
        /// Skip the confirmation prompt (sql)
        #[arg(long)]
        yes: bool,
    },

    /// Delete every product template
    Products {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Via {
    Rpc,
    Sql,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    odx_common::logging::init_logging(&cli.log_level, cli.log_file.as_deref())?;

    // passwd is local-only; everything else needs the connection profile
    if matches!(cli.command, Commands::Passwd) {
        return commands::passwd::run();
    }

    let config = OdxConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Passwd => unreachable!(),

        Commands::Import { entity } => {
            let client = Client::connect(&config).await?;
            match entity {
                ImportCommands::Brands { file, batch_size } => {
                    commands::import::brands::run(&client, &file, batch_size).await
                }
                ImportCommands::Categories { file, pos, batch_size } => {
                    let model = if pos { "pos.category" } else { "product.category" };
                    commands::import::categories::run(&client, &file, model, batch_size).await
                }
                ImportCommands::Suppliers { file, batch_size } => {
                    commands::import::partners::run(&client, &file, PartnerKind::Supplier, batch_size)
                        .await
                }
                ImportCommands::Customers { file, batch_size } => {
                    commands::import::partners::run(&client, &file, PartnerKind::Customer, batch_size)
                        .await
                }
                ImportCommands::Pricelists { file, batch_size } => {
                    commands::import::pricelists::run_pricelists(&client, &file, batch_size).await
                }
                ImportCommands::PricelistRules { file, batch_size, pause_ms } => {
                    commands::import::pricelists::run_rules(&client, &file, batch_size, pause_ms)
                        .await
                }
                ImportCommands::Products {
                    file,
                    update_prices,
                    no_update_cost,
                    no_update_sale_price,
                    batch_size,
                    yes,
                } => {
                    let options = ProductOptions {
                        update_prices,
                        update_cost: !no_update_cost,
                        update_sale_price: !no_update_sale_price,
                        batch_size,
                        assume_yes: yes,
                    };
                    commands::import::products::run(&client, &file, &options).await
                }
            }
        }

        Commands::Export { what } => {
            let client = Client::connect(&config).await?;
            match what {
                ExportCommands::Stock { location, products_file, categories_file } => {
                    commands::export::stock(&client, location, &products_file, &categories_file)
                        .await
                }
            }
        }

        Commands::Images { action } => match action {
            ImagesCommands::Pull { out, table } => {
                commands::images::pull(&config, &out, &table).await
            }
            ImagesCommands::Push { dir } => {
                let client = Client::connect(&config).await?;
                commands::images::push(&client, &dir).await
            }
        },

        Commands::Purge { target } => match target {
            PurgeCommands::Attachments { pattern, via, max, batch_size, max_batches, yes } => {
                match via {
                    Via::Rpc => {
                        let client = Client::connect(&config).await?;
                        commands::purge::attachments_rpc(&client, &pattern, max, batch_size).await
                    }
                    Via::Sql => {
                        commands::purge::attachments_sql(
                            &config,
                            &pattern,
                            batch_size,
                            max_batches,
                            yes,
                        )
                        .await
                    }
                }
            }
            PurgeCommands::Products { yes } => {
                let client = Client::connect(&config).await?;
                commands::purge::products(&client, yes).await
            }
        },
    }
}
