//! Configuration and logging setup.
//!
//! Settings come from built-in defaults, then an optional file, then
//! `VENEER__`-prefixed environment variables (`VENEER__PERSISTENCE__MODE=sqlite`).

use std::sync::Arc;

// config lets you read a separate config file
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::Result;
use crate::persist::{MemoryPersistence, PersistenceMode, Persistor, ViewPersistenceStrategy};
use crate::registry::DatasourceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceSettings {
    pub mode: StoreKind,
    /// SQLite file; absent means an in-memory database.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub persistence: PersistenceSettings,
    pub log: LogSettings,
}

impl Settings {
    pub fn load(file: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("persistence.mode", "memory")?
            .set_default("log.filter", "info")?;
        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix("VENEER").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// The SQLite mode, or `None` when views are kept in process memory.
    pub fn persistence_mode(&self) -> Option<PersistenceMode> {
        match self.persistence.mode {
            StoreKind::Memory => None,
            StoreKind::Sqlite => Some(match &self.persistence.path {
                Some(path) => PersistenceMode::File(path.clone()),
                None => PersistenceMode::InMemory,
            }),
        }
    }

    pub fn persistence(&self, registry: &Arc<DatasourceRegistry>) -> Result<Arc<dyn ViewPersistenceStrategy>> {
        Ok(match self.persistence_mode() {
            None => Arc::new(MemoryPersistence::new()),
            Some(mode) => Arc::new(Persistor::new(mode, registry)?),
        })
    }
}

/// Installs a formatting subscriber unless one is already installed.
/// `RUST_LOG` wins over `filter` when set.
pub fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
