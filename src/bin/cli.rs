// BookVerse - Book sharing platform storage layer
// Copyright (C) 2025 BookVerse contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::Context;
use bookverse_store::config::{redact_connection_string, StoreConfig, DATABASE_ENV, DOCUMENT_ENV};
use bookverse_store::docstore::{initialize, DocumentStore, Repository};
use bookverse_store::storage::Database;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bookverse-cli")]
#[command(about = "BookVerse storage maintenance tool", long_about = None)]
struct Cli {
    /// Relational database (path or sqlite:// URL)
    #[arg(long, env = DATABASE_ENV, global = true)]
    database: Option<String>,

    /// Document store (path or sqlite:// URL)
    #[arg(long, env = DOCUMENT_ENV, global = true)]
    documents: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the relational store and declare the document indexes
    Init,
    /// Print the declared indexes
    Indexes {
        /// Only this collection
        collection: Option<String>,
    },
    /// Run integrity checks on both stores
    Check,
    /// Print dashboard counters
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = StoreConfig::default();
    if let Some(location) = &cli.database {
        tracing::debug!(location = %redact_connection_string(location), "relational store override");
        config = config.with_database_path(location)?;
    }
    if let Some(location) = &cli.documents {
        tracing::debug!(location = %redact_connection_string(location), "document store override");
        config = config.with_document_path(location)?;
    }

    match cli.command {
        Commands::Init => {
            let db = Database::new(&config.database_path)
                .await
                .with_context(|| format!("opening {}", config.database_path.display()))?;
            db.close().await?;

            let store = DocumentStore::open(&config.document_path)
                .await
                .with_context(|| format!("opening {}", config.document_path.display()))?;
            let report = initialize(&store).await.context("document store initialization failed")?;

            println!(
                "collections: {} created, {} existing",
                report.collections_created.len(),
                report.collections_existing.len()
            );
            println!(
                "indexes: {} created, {} existing",
                report.indexes_created.len(),
                report.indexes_existing.len()
            );
            for name in &report.indexes_created {
                println!("  + {}", name);
            }
            store.close().await?;
        }
        Commands::Indexes { collection } => {
            let store = DocumentStore::open(&config.document_path).await?;
            let collections = match collection {
                Some(name) => vec![name],
                None => store.list_collections().await?,
            };

            for name in collections {
                println!("{}", name);
                for index in store.list_indexes(&name).await? {
                    println!(
                        "  {:<42} {{ {} }}{}",
                        index.name,
                        index.describe_keys(),
                        if index.unique { " unique" } else { "" }
                    );
                }
            }
            store.close().await?;
        }
        Commands::Check => {
            let db = Database::new(&config.database_path).await?;
            let db_ok = db.check_integrity().await?;
            let stats = db.get_stats().await?;
            db.close().await?;

            let store = DocumentStore::open(&config.document_path).await?;
            let docs_ok = store.check_integrity().await?;
            store.close().await?;

            println!(
                "relational store: {} ({} users, {} books, {} bytes)",
                if db_ok { "ok" } else { "FAILED" },
                stats.users,
                stats.books,
                stats.total_size
            );
            println!("document store:   {}", if docs_ok { "ok" } else { "FAILED" });

            if !(db_ok && docs_ok) {
                anyhow::bail!("integrity check failed");
            }
        }
        Commands::Stats => {
            let store = DocumentStore::open(&config.document_path).await?;
            let repo = Repository::new(store);
            let stats = repo.dashboard_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
