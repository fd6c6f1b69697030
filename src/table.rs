//! The table contract every adapter and every virtual table satisfies.
//!
//! A [`ValueTable`] is a named collection of entities, variables and rows
//! (value sets) that all share one entity type. Rows are [`ValueSet`]s: they
//! carry no data themselves, they are handed back to a
//! [`VariableValueSource`] to pull a value lazily.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::datatype::{Timestamps, Value, Variable, VariableEntity};
use crate::error::{Result, VeneerError};
use crate::join::JoinedValueSet;

// ------------- ValueSet -------------
/// Where a value set came from. Virtual tables keep an explicit handle on
/// the row they wrap, so nothing has to guess at the concrete table type.
#[derive(Clone, Debug)]
pub(crate) enum Origin {
    Physical,
    Wrapped(Arc<ValueSet>),
    Joined(Arc<JoinedValueSet>),
}

/// One entity's row in one table.
#[derive(Clone, Debug)]
pub struct ValueSet {
    table: Arc<str>,
    entity: VariableEntity,
    origin: Origin,
}

impl ValueSet {
    /// A row owned directly by a physical table.
    pub fn new(table: &str, entity: VariableEntity) -> Self {
        Self {
            table: Arc::from(table),
            entity,
            origin: Origin::Physical,
        }
    }
    pub(crate) fn wrapping(table: &str, entity: VariableEntity, inner: ValueSet) -> Self {
        Self {
            table: Arc::from(table),
            entity,
            origin: Origin::Wrapped(Arc::new(inner)),
        }
    }
    pub(crate) fn joined(table: &str, joined: JoinedValueSet) -> Self {
        Self {
            table: Arc::from(table),
            entity: joined.variable_entity().clone(),
            origin: Origin::Joined(Arc::new(joined)),
        }
    }
    pub fn table_name(&self) -> &str {
        &self.table
    }
    pub fn variable_entity(&self) -> &VariableEntity {
        &self.entity
    }
    /// The row this one wraps, if it belongs to a transforming table.
    pub fn inner(&self) -> Option<&ValueSet> {
        match &self.origin {
            Origin::Wrapped(inner) => Some(inner),
            _ => None,
        }
    }
    /// The member rows behind a join row.
    pub fn as_joined(&self) -> Option<&JoinedValueSet> {
        match &self.origin {
            Origin::Joined(joined) => Some(joined),
            _ => None,
        }
    }
    pub(crate) fn origin(&self) -> &Origin {
        &self.origin
    }
}

// ------------- VariableValueSource -------------
/// Binds a variable to the function resolving its value for a row.
pub trait VariableValueSource: Send + Sync {
    fn variable(&self) -> &Variable;
    fn value(&self, value_set: &ValueSet) -> Result<Value>;
}

// ------------- TableSpec -------------
/// How a table can be found again by name, used when views are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableSpec {
    /// A table reachable as `datasource.table`.
    Table { reference: String },
    /// A join of the listed tables, in order.
    Join { tables: Vec<TableSpec> },
}

// ------------- ValueTable -------------
pub trait ValueTable: Send + Sync {
    fn name(&self) -> &str;
    fn entity_type(&self) -> &str;
    /// Name of the data source this table belongs to, if any.
    fn datasource_name(&self) -> Option<String>;
    fn is_view(&self) -> bool {
        false
    }
    fn is_for_entity(&self, entity_type: &str) -> bool {
        self.entity_type() == entity_type
    }

    fn variables(&self) -> Result<Vec<Variable>>;
    fn variable_value_source(&self, name: &str) -> Result<Arc<dyn VariableValueSource>>;
    fn variable(&self, name: &str) -> Result<Variable> {
        Ok(self.variable_value_source(name)?.variable().clone())
    }
    fn has_variable(&self, name: &str) -> bool {
        self.variable(name).is_ok()
    }

    fn variable_entities(&self) -> Result<Vec<VariableEntity>>;
    fn has_value_set(&self, entity: &VariableEntity) -> Result<bool>;
    fn value_set(&self, entity: &VariableEntity) -> Result<ValueSet>;
    fn value_sets(&self) -> Result<Vec<ValueSet>> {
        self.variable_entities()?
            .iter()
            .map(|entity| self.value_set(entity))
            .collect()
    }
    fn value(&self, variable: &Variable, value_set: &ValueSet) -> Result<Value> {
        self.variable_value_source(variable.name())?.value(value_set)
    }

    fn timestamps(&self) -> Timestamps;
    /// Row timestamps; `None` means the recency of the row is unknown.
    fn value_set_timestamps(&self, entity: &VariableEntity) -> Result<Option<Timestamps>>;

    fn reference(&self) -> Option<TableSpec> {
        self.datasource_name().map(|datasource| TableSpec::Table {
            reference: format!("{}.{}", datasource, self.name()),
        })
    }
}

impl fmt::Debug for dyn ValueTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.datasource_name() {
            Some(datasource) => write!(f, "ValueTable({}.{})", datasource, self.name()),
            None => write!(f, "ValueTable({})", self.name()),
        }
    }
}

// ------------- Datasource -------------
pub trait ValueTableWriter {
    fn write_variable(&mut self, variable: Variable) -> Result<()>;
    fn write_value(&mut self, entity: &VariableEntity, variable: &str, value: Value) -> Result<()>;
}

pub trait Datasource: Send + Sync {
    fn name(&self) -> &str;
    fn has_value_table(&self, name: &str) -> bool;
    fn value_table(&self, name: &str) -> Result<Arc<dyn ValueTable>>;
    fn value_tables(&self) -> Vec<Arc<dyn ValueTable>>;
    fn can_drop_table(&self, _name: &str) -> bool {
        false
    }
    fn drop_table(&self, name: &str) -> Result<()> {
        Err(VeneerError::Unsupported(format!(
            "cannot drop table {} from {}",
            name,
            self.name()
        )))
    }
    fn create_writer(&self, table: &str, entity_type: &str) -> Result<Box<dyn ValueTableWriter + '_>>;
}
