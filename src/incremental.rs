//! Delta extraction: keep the source rows that are newer than their copy in a
//! destination table, or that have no copy at all.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::cache::OnceCache;
use crate::clause::{ClauseSpec, WhereClause};
use crate::datatype::VariableEntity;
use crate::error::{Result, VeneerError};
use crate::registry::DatasourceRegistry;
use crate::table::{ValueSet, ValueTable};

struct Resolved {
    source: Arc<dyn ValueTable>,
    // None when the destination does not exist yet: it behaves as empty
    destination: Option<Arc<dyn ValueTable>>,
}

/// Includes a row when the destination has no row for the entity, when the
/// source row was updated strictly after the destination row, or when
/// either update time is unknown.
///
/// Both tables are named by `datasource.table` references and resolved on
/// first use; the resolution is then kept for the life of the clause.
pub struct IncrementalWhereClause {
    registry: Weak<DatasourceRegistry>,
    source: String,
    destination: String,
    resolved: OnceCache<Resolved>,
}

impl IncrementalWhereClause {
    pub fn new(registry: Weak<DatasourceRegistry>, source: &str, destination: &str) -> Self {
        Self {
            registry,
            source: source.to_string(),
            destination: destination.to_string(),
            resolved: OnceCache::new(),
        }
    }
    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn destination(&self) -> &str {
        &self.destination
    }

    fn resolved(&self) -> Result<&Resolved> {
        self.resolved.get_or_try_init(|| {
            let registry = self.registry.upgrade().ok_or_else(|| {
                VeneerError::NoSuchDatasource(format!("registry gone while resolving {}", self.source))
            })?;
            let source = registry.resolve_table(&self.source)?;
            let destination = match registry.resolve_table(&self.destination) {
                Ok(table) => Some(table),
                Err(VeneerError::NoSuchDatasource(_)) | Err(VeneerError::NoSuchValueTable { .. }) => {
                    debug!(destination = %self.destination, "destination missing, treated as empty");
                    None
                }
                Err(e) => return Err(e),
            };
            Ok(Resolved {
                source,
                destination,
            })
        })
    }
}

fn last_update(table: &dyn ValueTable, entity: &VariableEntity) -> Result<Option<DateTime<Utc>>> {
    Ok(table
        .value_set_timestamps(entity)?
        .and_then(|ts| ts.last_update))
}

impl WhereClause for IncrementalWhereClause {
    fn matches(&self, value_set: &ValueSet, _table: &dyn ValueTable) -> Result<bool> {
        let resolved = self.resolved()?;
        let entity = value_set.variable_entity();
        let Some(destination) = &resolved.destination else {
            return Ok(true);
        };
        if !destination.has_value_set(entity)? {
            return Ok(true);
        }
        let source_update = last_update(resolved.source.as_ref(), entity)?;
        let destination_update = last_update(destination.as_ref(), entity)?;
        Ok(match (source_update, destination_update) {
            (Some(source), Some(destination)) => source > destination,
            // unknown recency counts as changed
            _ => true,
        })
    }
    fn spec(&self) -> Option<ClauseSpec> {
        Some(ClauseSpec::Incremental {
            source: self.source.clone(),
            destination: self.destination.clone(),
        })
    }
}
