//! Joins: virtual tables unioning two or more tables of one entity type.
//!
//! Entities are the union of the members' entities. Variables are the union
//! of the members' variables by name, and the first member (in list order)
//! that defines a name owns it outright: its metadata and its values. Later
//! definitions of the same name are shadowed, never merged.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::cache::{NameHasher, OnceCache};
use crate::datatype::{Timestamps, Value, Variable, VariableEntity};
use crate::error::{Result, VeneerError};
use crate::table::{Origin, TableSpec, ValueSet, ValueTable, VariableValueSource};

/// Variable name to owning member, in first-seen order.
struct VariableOwners {
    variables: Vec<(Variable, usize)>,
    positions: HashMap<String, usize, NameHasher>,
}

impl VariableOwners {
    fn build(tables: &[Arc<dyn ValueTable>]) -> Result<Self> {
        let mut owners = Self {
            variables: Vec::new(),
            positions: HashMap::default(),
        };
        for (member, table) in tables.iter().enumerate() {
            for variable in table.variables()? {
                if owners.positions.contains_key(variable.name()) {
                    continue;
                }
                owners
                    .positions
                    .insert(variable.name().to_string(), owners.variables.len());
                owners.variables.push((variable, member));
            }
        }
        Ok(owners)
    }
    fn get(&self, name: &str) -> Option<&(Variable, usize)> {
        self.positions.get(name).map(|&i| &self.variables[i])
    }
}

struct JoinInner {
    name: String,
    entity_type: String,
    tables: Vec<Arc<dyn ValueTable>>,
    owners: OnceCache<VariableOwners>,
}

// ------------- JoinTable -------------
#[derive(Clone)]
pub struct JoinTable {
    inner: Arc<JoinInner>,
}

impl JoinTable {
    pub fn new(tables: Vec<Arc<dyn ValueTable>>) -> Result<Self> {
        if tables.len() < 2 {
            return Err(VeneerError::InvalidArgument(
                "a join needs at least two tables".to_string(),
            ));
        }
        let entity_type = tables[0].entity_type().to_string();
        if let Some(stray) = tables.iter().find(|t| t.entity_type() != entity_type) {
            return Err(VeneerError::InvalidArgument(format!(
                "cannot join {} entities of {} with {} entities",
                stray.entity_type(),
                stray.name(),
                entity_type
            )));
        }
        let name = tables
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join("-");
        Ok(Self {
            inner: Arc::new(JoinInner {
                name,
                entity_type,
                tables,
                owners: OnceCache::new(),
            }),
        })
    }
    pub fn tables(&self) -> &[Arc<dyn ValueTable>] {
        &self.inner.tables
    }
    /// The member that owns a variable name.
    pub fn owner_of(&self, name: &str) -> Result<Arc<dyn ValueTable>> {
        let (_, member) = self.owner(name)?;
        Ok(Arc::clone(&self.inner.tables[member]))
    }

    fn owners(&self) -> Result<&VariableOwners> {
        self.inner.owners.get_or_try_init(|| {
            let owners = VariableOwners::build(&self.inner.tables)?;
            debug!(join = %self.inner.name, variables = owners.variables.len(), "join variables resolved");
            Ok(owners)
        })
    }
    fn owner(&self, name: &str) -> Result<(Variable, usize)> {
        self.owners()?
            .get(name)
            .cloned()
            .ok_or_else(|| VeneerError::NoSuchVariable {
                table: self.inner.name.clone(),
                variable: name.to_string(),
            })
    }
    fn joined_value_set(&self, entity: &VariableEntity) -> JoinedValueSet {
        JoinedValueSet {
            join: self.clone(),
            entity: entity.clone(),
            members: Mutex::new(HashMap::default()),
        }
    }
}

impl fmt::Debug for JoinTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("JoinTable")
            .field("name", &self.inner.name)
            .field("entity_type", &self.inner.entity_type)
            .finish()
    }
}

impl ValueTable for JoinTable {
    fn name(&self) -> &str {
        &self.inner.name
    }
    fn entity_type(&self) -> &str {
        &self.inner.entity_type
    }
    fn datasource_name(&self) -> Option<String> {
        None
    }

    fn variables(&self) -> Result<Vec<Variable>> {
        Ok(self
            .owners()?
            .variables
            .iter()
            .map(|(variable, _)| variable.clone())
            .collect())
    }
    fn variable_value_source(&self, name: &str) -> Result<Arc<dyn VariableValueSource>> {
        let (variable, member) = self.owner(name)?;
        let source = self.inner.tables[member].variable_value_source(name)?;
        Ok(Arc::new(JoinedValueSource {
            join: self.clone(),
            variable,
            member,
            source,
        }))
    }

    fn variable_entities(&self) -> Result<Vec<VariableEntity>> {
        let mut seen: HashSet<VariableEntity, NameHasher> = HashSet::default();
        let mut entities = Vec::new();
        for table in &self.inner.tables {
            for entity in table.variable_entities()? {
                if seen.insert(entity.clone()) {
                    entities.push(entity);
                }
            }
        }
        Ok(entities)
    }
    fn has_value_set(&self, entity: &VariableEntity) -> Result<bool> {
        for table in &self.inner.tables {
            if table.has_value_set(entity)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
    fn value_set(&self, entity: &VariableEntity) -> Result<ValueSet> {
        if !self.has_value_set(entity)? {
            return Err(VeneerError::NoSuchValueSet {
                table: self.inner.name.clone(),
                entity: entity.to_string(),
            });
        }
        Ok(ValueSet::joined(&self.inner.name, self.joined_value_set(entity)))
    }

    fn timestamps(&self) -> Timestamps {
        Timestamps::aggregate(self.inner.tables.iter().map(|t| t.timestamps())).unwrap_or_default()
    }
    fn value_set_timestamps(&self, entity: &VariableEntity) -> Result<Option<Timestamps>> {
        let mut found = Vec::new();
        for table in &self.inner.tables {
            if !table.has_value_set(entity)? {
                continue;
            }
            // members that know nothing about the row do not count
            if let Some(ts) = table.value_set_timestamps(entity)? {
                if ts.created.is_some() || ts.last_update.is_some() {
                    found.push(ts);
                }
            }
        }
        Ok(Timestamps::aggregate(found))
    }

    fn reference(&self) -> Option<TableSpec> {
        let tables = self
            .inner
            .tables
            .iter()
            .map(|t| t.reference())
            .collect::<Option<Vec<_>>>()?;
        Some(TableSpec::Join { tables })
    }
}

// ------------- JoinedValueSet -------------
/// One entity's row in a join. Member rows are fetched the first time one of
/// their variables is read and then kept for the life of this row.
pub struct JoinedValueSet {
    join: JoinTable,
    entity: VariableEntity,
    // member position to its row, None when the member has no row
    members: Mutex<HashMap<usize, Option<ValueSet>, NameHasher>>,
}

impl JoinedValueSet {
    pub fn variable_entity(&self) -> &VariableEntity {
        &self.entity
    }
    pub fn member_value_set(&self, member: usize) -> Result<Option<ValueSet>> {
        let mut members = self.members.lock()?;
        if let Some(kept) = members.get(&member) {
            return Ok(kept.clone());
        }
        let table = self.join.inner.tables.get(member).ok_or_else(|| {
            VeneerError::InvalidArgument(format!(
                "join {} has no member {}",
                self.join.inner.name, member
            ))
        })?;
        let value_set = if table.has_value_set(&self.entity)? {
            Some(table.value_set(&self.entity)?)
        } else {
            None
        };
        members.insert(member, value_set.clone());
        Ok(value_set)
    }
    /// Number of member rows fetched so far.
    pub fn fetched(&self) -> usize {
        self.members.lock().map(|members| members.len()).unwrap_or(0)
    }
}

impl fmt::Debug for JoinedValueSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("JoinedValueSet")
            .field("join", &self.join.inner.name)
            .field("entity", &self.entity)
            .finish()
    }
}

struct JoinedValueSource {
    join: JoinTable,
    variable: Variable,
    member: usize,
    source: Arc<dyn VariableValueSource>,
}

impl VariableValueSource for JoinedValueSource {
    fn variable(&self) -> &Variable {
        &self.variable
    }
    fn value(&self, value_set: &ValueSet) -> Result<Value> {
        let member = match value_set.origin() {
            Origin::Joined(joined) => joined.member_value_set(self.member)?,
            _ => self
                .join
                .joined_value_set(value_set.variable_entity())
                .member_value_set(self.member)?,
        };
        match member {
            Some(member) => self.source.value(&member),
            None => Ok(self.variable.null_value()),
        }
    }
}
