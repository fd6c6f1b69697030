//! In-memory physical tables and data sources.
//!
//! These satisfy the same contract as the file, spreadsheet and database
//! adapters do, and are what the views and joins get wrapped around in tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::debug;

use crate::cache::NameHasher;
use crate::datatype::{Timestamps, Value, Variable, VariableEntity};
use crate::error::{Result, VeneerError};
use crate::table::{Datasource, ValueSet, ValueTable, ValueTableWriter, VariableValueSource};

#[derive(Debug, Default)]
struct StaticState {
    variables: Vec<Variable>,
    entities: Vec<VariableEntity>,
    identifiers: HashSet<String, NameHasher>,
    values: HashMap<(String, String), Value, NameHasher>,
    row_timestamps: HashMap<String, Timestamps, NameHasher>,
    timestamps: Timestamps,
}

impl StaticState {
    fn position(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name() == name)
    }
    fn contains(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }
    /// Appends the entity unless it is already there.
    fn insert(&mut self, entity: VariableEntity) {
        if self.identifiers.insert(entity.identifier().to_string()) {
            self.entities.push(entity);
        }
    }
}

// ------------- StaticValueTable -------------
#[derive(Debug)]
pub struct StaticValueTable {
    name: String,
    entity_type: String,
    datasource: Option<String>,
    state: Arc<RwLock<StaticState>>,
}

impl StaticValueTable {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            datasource: None,
            state: Arc::new(RwLock::new(StaticState::default())),
        }
    }
    /// Adds or replaces a variable, keeping the position of the first definition.
    pub fn add_variable(&self, variable: Variable) -> Result<()> {
        if variable.entity_type() != self.entity_type {
            return Err(VeneerError::IncompatibleEntityType {
                table: self.name.clone(),
                variable: variable.name().to_string(),
                expected: self.entity_type.clone(),
                found: variable.entity_type().to_string(),
            });
        }
        let mut state = self.state.write()?;
        match state.position(variable.name()) {
            Some(i) => state.variables[i] = variable,
            None => state.variables.push(variable),
        }
        Ok(())
    }
    pub fn add_entity(&self, identifier: &str) -> Result<VariableEntity> {
        let mut state = self.state.write()?;
        let entity = VariableEntity::new(self.entity_type.as_str(), identifier);
        state.insert(entity.clone());
        Ok(entity)
    }
    /// Sets a value, adding the entity if it is new.
    pub fn set_value(&self, identifier: &str, variable: &str, value: Value) -> Result<()> {
        let mut state = self.state.write()?;
        if state.position(variable).is_none() {
            return Err(self.no_such_variable(variable));
        }
        state.insert(VariableEntity::new(self.entity_type.as_str(), identifier));
        state
            .values
            .insert((identifier.to_string(), variable.to_string()), value);
        Ok(())
    }
    pub fn set_value_set_timestamps(&self, identifier: &str, timestamps: Timestamps) -> Result<()> {
        self.add_entity(identifier)?;
        self.state
            .write()?
            .row_timestamps
            .insert(identifier.to_string(), timestamps);
        Ok(())
    }
    pub fn set_timestamps(&self, timestamps: Timestamps) -> Result<()> {
        self.state.write()?.timestamps = timestamps;
        Ok(())
    }
    pub fn remove_entity(&self, identifier: &str) -> Result<()> {
        let mut state = self.state.write()?;
        if !state.identifiers.remove(identifier) {
            return Ok(());
        }
        state.entities.retain(|e| e.identifier() != identifier);
        state.values.retain(|(id, _), _| id != identifier);
        state.row_timestamps.remove(identifier);
        Ok(())
    }
    fn no_such_variable(&self, variable: &str) -> VeneerError {
        VeneerError::NoSuchVariable {
            table: self.name.clone(),
            variable: variable.to_string(),
        }
    }
    fn no_such_value_set(&self, entity: &VariableEntity) -> VeneerError {
        VeneerError::NoSuchValueSet {
            table: self.name.clone(),
            entity: entity.to_string(),
        }
    }
}

impl ValueTable for StaticValueTable {
    fn name(&self) -> &str {
        &self.name
    }
    fn entity_type(&self) -> &str {
        &self.entity_type
    }
    fn datasource_name(&self) -> Option<String> {
        self.datasource.clone()
    }
    fn variables(&self) -> Result<Vec<Variable>> {
        Ok(self.state.read()?.variables.clone())
    }
    fn variable_value_source(&self, name: &str) -> Result<Arc<dyn VariableValueSource>> {
        let state = self.state.read()?;
        let variable = state
            .position(name)
            .map(|i| state.variables[i].clone())
            .ok_or_else(|| self.no_such_variable(name))?;
        Ok(Arc::new(StaticValueSource {
            variable,
            state: Arc::clone(&self.state),
        }))
    }
    fn variable_entities(&self) -> Result<Vec<VariableEntity>> {
        Ok(self.state.read()?.entities.clone())
    }
    fn has_value_set(&self, entity: &VariableEntity) -> Result<bool> {
        Ok(entity.entity_type() == self.entity_type
            && self.state.read()?.contains(entity.identifier()))
    }
    fn value_set(&self, entity: &VariableEntity) -> Result<ValueSet> {
        if !self.has_value_set(entity)? {
            return Err(self.no_such_value_set(entity));
        }
        Ok(ValueSet::new(&self.name, entity.clone()))
    }
    fn timestamps(&self) -> Timestamps {
        self.state
            .read()
            .map(|state| state.timestamps)
            .unwrap_or_default()
    }
    fn value_set_timestamps(&self, entity: &VariableEntity) -> Result<Option<Timestamps>> {
        if !self.has_value_set(entity)? {
            return Err(self.no_such_value_set(entity));
        }
        Ok(self
            .state
            .read()?
            .row_timestamps
            .get(entity.identifier())
            .copied())
    }
}

struct StaticValueSource {
    variable: Variable,
    state: Arc<RwLock<StaticState>>,
}

impl VariableValueSource for StaticValueSource {
    fn variable(&self) -> &Variable {
        &self.variable
    }
    fn value(&self, value_set: &ValueSet) -> Result<Value> {
        let state = self.state.read()?;
        let key = (
            value_set.variable_entity().identifier().to_string(),
            self.variable.name().to_string(),
        );
        Ok(state
            .values
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.variable.null_value()))
    }
}

// ------------- StaticDatasource -------------
#[derive(Debug)]
pub struct StaticDatasource {
    name: String,
    tables: RwLock<BTreeMap<String, Arc<StaticValueTable>>>,
}

impl StaticDatasource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(BTreeMap::new()),
        }
    }
    /// Takes ownership of a table, binding it to this data source.
    pub fn add_table(&self, mut table: StaticValueTable) -> Result<Arc<StaticValueTable>> {
        let mut tables = self.tables.write()?;
        if tables.contains_key(&table.name) {
            return Err(VeneerError::InvalidArgument(format!(
                "table {} already exists in {}",
                table.name, self.name
            )));
        }
        table.datasource = Some(self.name.clone());
        let table = Arc::new(table);
        tables.insert(table.name.clone(), Arc::clone(&table));
        Ok(table)
    }
    pub fn static_table(&self, name: &str) -> Result<Arc<StaticValueTable>> {
        self.tables
            .read()?
            .get(name)
            .cloned()
            .ok_or_else(|| VeneerError::NoSuchValueTable {
                datasource: self.name.clone(),
                table: name.to_string(),
            })
    }
}

impl Datasource for StaticDatasource {
    fn name(&self) -> &str {
        &self.name
    }
    fn has_value_table(&self, name: &str) -> bool {
        self.tables
            .read()
            .map(|tables| tables.contains_key(name))
            .unwrap_or(false)
    }
    fn value_table(&self, name: &str) -> Result<Arc<dyn ValueTable>> {
        Ok(self.static_table(name)?)
    }
    fn value_tables(&self) -> Vec<Arc<dyn ValueTable>> {
        self.tables
            .read()
            .map(|tables| {
                tables
                    .values()
                    .map(|t| Arc::clone(t) as Arc<dyn ValueTable>)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    }
    fn can_drop_table(&self, name: &str) -> bool {
        self.has_value_table(name)
    }
    fn drop_table(&self, name: &str) -> Result<()> {
        match self.tables.write()?.remove(name) {
            Some(_) => {
                debug!(datasource = %self.name, table = name, "table dropped");
                Ok(())
            }
            None => Err(VeneerError::NoSuchValueTable {
                datasource: self.name.clone(),
                table: name.to_string(),
            }),
        }
    }
    fn create_writer(&self, table: &str, entity_type: &str) -> Result<Box<dyn ValueTableWriter + '_>> {
        let table = match self.static_table(table) {
            Ok(existing) => existing,
            Err(VeneerError::NoSuchValueTable { .. }) => {
                self.add_table(StaticValueTable::new(table, entity_type))?
            }
            Err(e) => return Err(e),
        };
        if table.entity_type() != entity_type {
            return Err(VeneerError::InvalidArgument(format!(
                "table {} holds {} entities, not {}",
                table.name(),
                table.entity_type(),
                entity_type
            )));
        }
        Ok(Box::new(StaticTableWriter { table }))
    }
}

/// Writes into a [`StaticValueTable`], stamping row and table update times.
pub struct StaticTableWriter {
    table: Arc<StaticValueTable>,
}

impl ValueTableWriter for StaticTableWriter {
    fn write_variable(&mut self, variable: Variable) -> Result<()> {
        self.table.add_variable(variable)
    }
    fn write_value(&mut self, entity: &VariableEntity, variable: &str, value: Value) -> Result<()> {
        if entity.entity_type() != self.table.entity_type() {
            return Err(VeneerError::InvalidArgument(format!(
                "cannot write {} into {}",
                entity,
                self.table.name()
            )));
        }
        self.table.set_value(entity.identifier(), variable, value)?;
        let now = Utc::now();
        let created = self
            .table
            .value_set_timestamps(entity)?
            .and_then(|ts| ts.created)
            .unwrap_or(now);
        self.table
            .set_value_set_timestamps(entity.identifier(), Timestamps::new(created, now))?;
        let table_created = self.table.timestamps().created.unwrap_or(now);
        self.table.set_timestamps(Timestamps::new(table_created, now))
    }
}
