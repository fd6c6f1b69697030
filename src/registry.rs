//! Name resolution for data sources and their tables.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use crate::cache::NameHasher;
use crate::error::{Result, VeneerError};
use crate::table::{Datasource, ValueTable};

lazy_static! {
    // datasource and table, split on the first dot
    static ref TABLE_REFERENCE: Regex = Regex::new(r"^([^.]+)\.(.+)$").unwrap();
}

// ------------- TableReference -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableReference {
    datasource: String,
    table: String,
}

impl TableReference {
    pub fn new(datasource: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            datasource: datasource.into(),
            table: table.into(),
        }
    }
    /// Parses `datasource.table`.
    pub fn parse(reference: &str) -> Result<Self> {
        let captures = TABLE_REFERENCE.captures(reference).ok_or_else(|| {
            VeneerError::InvalidArgument(format!(
                "'{}' is not a datasource.table reference",
                reference
            ))
        })?;
        Ok(Self::new(&captures[1], &captures[2]))
    }
    pub fn datasource(&self) -> &str {
        &self.datasource
    }
    pub fn table(&self) -> &str {
        &self.table
    }
}
impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.datasource, self.table)
    }
}

// ------------- DatasourceRegistry -------------
/// Data sources known by name.
#[derive(Default)]
pub struct DatasourceRegistry {
    datasources: RwLock<HashMap<String, Arc<dyn Datasource>, NameHasher>>,
}

impl DatasourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn register(&self, datasource: Arc<dyn Datasource>) -> Result<()> {
        let name = datasource.name().to_string();
        if name.is_empty() {
            return Err(VeneerError::InvalidArgument(
                "datasource name cannot be empty".to_string(),
            ));
        }
        let mut datasources = self.datasources.write()?;
        if datasources.contains_key(&name) {
            return Err(VeneerError::InvalidArgument(format!(
                "datasource {} is already registered",
                name
            )));
        }
        info!(datasource = %name, "datasource registered");
        datasources.insert(name, datasource);
        Ok(())
    }
    /// Registers a data source, replacing any other one of the same name.
    pub fn register_or_replace(&self, datasource: Arc<dyn Datasource>) -> Result<()> {
        let name = datasource.name().to_string();
        let replaced = self.datasources.write()?.insert(name.clone(), datasource);
        debug!(datasource = %name, replaced = replaced.is_some(), "datasource installed");
        Ok(())
    }
    pub fn unregister(&self, name: &str) -> Result<Option<Arc<dyn Datasource>>> {
        Ok(self.datasources.write()?.remove(name))
    }
    pub fn has_datasource(&self, name: &str) -> bool {
        self.datasources
            .read()
            .map(|datasources| datasources.contains_key(name))
            .unwrap_or(false)
    }
    pub fn datasource(&self, name: &str) -> Result<Arc<dyn Datasource>> {
        self.datasources
            .read()?
            .get(name)
            .cloned()
            .ok_or_else(|| VeneerError::NoSuchDatasource(name.to_string()))
    }
    pub fn datasource_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.datasources.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
    pub fn resolve_table(&self, reference: &str) -> Result<Arc<dyn ValueTable>> {
        let reference = TableReference::parse(reference)?;
        self.datasource(reference.datasource())?
            .value_table(reference.table())
    }
}
