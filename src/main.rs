//! Prints the view definitions stored in the configured SQLite view store.
//!
//! ```bash
//! veneer --config veneer.toml
//! veneer --config veneer.toml clinic lab
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

use veneer::error::Result;
use veneer::persist::Persistor;
use veneer::registry::DatasourceRegistry;
use veneer::settings::{init_tracing, Settings};

#[derive(Parser, Debug)]
#[command(name = "veneer", version, about = "Lists stored view definitions")]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Data sources to list; all stored data sources when omitted
    datasources: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.config.as_ref().map(|path| path.to_string_lossy().to_string());
    let settings = Settings::load(config.as_deref())?;
    init_tracing(&settings.log.filter);

    let Some(mode) = settings.persistence_mode() else {
        warn!("persistence.mode is memory, there is no view store to read");
        return Ok(());
    };
    let registry = Arc::new(DatasourceRegistry::new());
    let persistor = Persistor::new(mode, &registry)?;
    let datasources = if args.datasources.is_empty() {
        persistor.datasources()?
    } else {
        args.datasources
    };
    info!(datasources = datasources.len(), "reading stored views");

    for datasource in &datasources {
        for (descriptor, timestamps) in persistor.descriptors(datasource)? {
            let printed = json!({
                "datasource": datasource,
                "view": descriptor,
                "created": timestamps.created.map(|t| t.to_rfc3339()),
                "updated": timestamps.last_update.map(|t| t.to_rfc3339()),
            });
            println!("{}", serde_json::to_string_pretty(&printed)?);
        }
    }
    Ok(())
}
