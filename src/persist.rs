// used for persistence
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::cache::NameHasher;
use crate::clause::ClauseSpec;
use crate::datatype::Timestamps;
use crate::error::{Result, VeneerError};
use crate::join::JoinTable;
use crate::registry::DatasourceRegistry;
use crate::table::{TableSpec, ValueTable};
use crate::view::View;

// ------------- Strategy -------------
/// Durable storage of the views registered on data sources.
pub trait ViewPersistenceStrategy: Send + Sync {
    /// Replaces everything stored for the data source with `views`. The
    /// replacement happens completely or not at all.
    fn write_views(&self, datasource: &str, views: &[View]) -> Result<()>;
    /// The stored views, unattached. Empty when nothing is stored.
    fn read_views(&self, datasource: &str) -> Result<Vec<View>>;
}

/// Keeps views in memory for the life of the process.
#[derive(Default)]
pub struct MemoryPersistence {
    views: Mutex<HashMap<String, Vec<View>, NameHasher>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ViewPersistenceStrategy for MemoryPersistence {
    fn write_views(&self, datasource: &str, views: &[View]) -> Result<()> {
        self.views
            .lock()?
            .insert(datasource.to_string(), views.to_vec());
        Ok(())
    }
    fn read_views(&self, datasource: &str) -> Result<Vec<View>> {
        Ok(self
            .views
            .lock()?
            .get(datasource)
            .map(|views| views.iter().map(View::detached_copy).collect())
            .unwrap_or_default())
    }
}

// ------------- ViewDescriptor -------------
/// The stored form of a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDescriptor {
    pub name: String,
    pub from: TableSpec,
    pub select: ClauseSpec,
    #[serde(rename = "where")]
    pub where_clause: ClauseSpec,
}

impl ViewDescriptor {
    /// Fails with unsupported when some part of the view has no stored form.
    pub fn describe(view: &View) -> Result<Self> {
        let unsupported = |what: &str| {
            VeneerError::Unsupported(format!("view {} has {} that cannot be stored", view.name(), what))
        };
        if view.list_clause().is_some() {
            return Err(unsupported("a list clause"));
        }
        if !view.entity_mapping().is_identity() {
            return Err(unsupported("an entity mapping"));
        }
        if view.wrapped_table().is_view() {
            return Err(unsupported("another view as its table"));
        }
        Ok(Self {
            name: view.name().to_string(),
            from: view
                .wrapped_table()
                .reference()
                .ok_or_else(|| unsupported("a table with no stored reference"))?,
            select: view
                .select_clause()
                .spec()
                .ok_or_else(|| unsupported("a select function"))?,
            where_clause: view
                .where_clause()
                .spec()
                .ok_or_else(|| unsupported("a where function"))?,
        })
    }

    /// Rebuilds the view, resolving its tables through `registry`.
    pub fn build(self, registry: &Arc<DatasourceRegistry>, timestamps: Timestamps) -> Result<View> {
        let wrapped = resolve(&self.from, registry)?;
        View::builder(self.name, wrapped)
            .select(self.select.into_select()?)
            .where_clause(self.where_clause.into_where(registry)?)
            .timestamps(timestamps)
            .build()
    }
}

fn resolve(spec: &TableSpec, registry: &DatasourceRegistry) -> Result<Arc<dyn ValueTable>> {
    match spec {
        TableSpec::Table { reference } => registry.resolve_table(reference),
        TableSpec::Join { tables } => {
            let members = tables
                .iter()
                .map(|member| resolve(member, registry))
                .collect::<Result<Vec<_>>>()?;
            Ok(Arc::new(JoinTable::new(members)?))
        }
    }
}

// ------------- Persistence -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

/// SQLite backed views, stored as JSON descriptors.
pub struct Persistor {
    connection: Mutex<Connection>,
    registry: Weak<DatasourceRegistry>,
}

impl Persistor {
    pub fn new(mode: PersistenceMode, registry: &Arc<DatasourceRegistry>) -> Result<Self> {
        let connection = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        // The "STRICT" keyword introduced in 3.37.0 breaks JDBC connections, which makes
        // debugging using an external tool like DBeaver impossible
        connection.execute_batch(
            "
            create table if not exists View (
                Datasource text not null,
                View text not null,
                Definition text not null,
                Created any null,
                Updated any null,
                constraint unique_and_referenceable_View primary key (
                    Datasource,
                    View
                )
            );-- STRICT;
            ",
        )?;
        if let PersistenceMode::File(path) = &mode {
            info!(path = %path, "view store opened");
        }
        Ok(Self {
            connection: Mutex::new(connection),
            registry: Arc::downgrade(registry),
        })
    }

    /// Names of the data sources with stored views.
    pub fn datasources(&self) -> Result<Vec<String>> {
        let connection = self.connection.lock()?;
        let mut statement = connection.prepare(
            "
            select distinct Datasource
                from View
                order by Datasource
            ",
        )?;
        let names = statement
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Stored descriptors with their timestamps, without resolving any table.
    pub fn descriptors(&self, datasource: &str) -> Result<Vec<(ViewDescriptor, Timestamps)>> {
        let connection = self.connection.lock()?;
        let mut statement = connection.prepare(
            "
            select Definition, Created, Updated
                from View
                where Datasource = ?
                order by View
            ",
        )?;
        let rows = statement
            .query_map(params![datasource], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<DateTime<Utc>>>(1)?,
                    row.get::<_, Option<DateTime<Utc>>>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(definition, created, updated)| {
                let descriptor: ViewDescriptor = serde_json::from_str(&definition)?;
                Ok((
                    descriptor,
                    Timestamps {
                        created,
                        last_update: updated,
                    },
                ))
            })
            .collect()
    }
}

impl ViewPersistenceStrategy for Persistor {
    fn write_views(&self, datasource: &str, views: &[View]) -> Result<()> {
        // describe everything before touching the store
        let mut rows = Vec::with_capacity(views.len());
        for view in views {
            let definition = serde_json::to_string(&ViewDescriptor::describe(view)?)?;
            rows.push((view.name().to_string(), definition, view.view_timestamps()));
        }
        let mut connection = self.connection.lock()?;
        let transaction = connection.transaction()?;
        transaction.execute(
            "
            delete from View
                where Datasource = ?
            ",
            params![datasource],
        )?;
        {
            let mut insert = transaction.prepare(
                "
                insert into View (
                    Datasource,
                    View,
                    Definition,
                    Created,
                    Updated
                ) values (?, ?, ?, ?, ?)
                ",
            )?;
            for (name, definition, timestamps) in &rows {
                insert.execute(params![
                    datasource,
                    name,
                    definition,
                    timestamps.created,
                    timestamps.last_update
                ])?;
            }
        }
        transaction.commit()?;
        debug!(datasource = %datasource, views = rows.len(), "views written");
        Ok(())
    }

    fn read_views(&self, datasource: &str) -> Result<Vec<View>> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| VeneerError::Persistence("datasource registry is gone".to_string()))?;
        self.descriptors(datasource)?
            .into_iter()
            .map(|(descriptor, timestamps)| descriptor.build(&registry, timestamps))
            .collect()
    }
}
