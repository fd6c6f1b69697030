//! The wrapping primitive shared by every transforming table.
//!
//! An outer (virtual) table answers each read by translating its argument
//! into the domain of the inner (wrapped) table, delegating, and translating
//! the answer back. Entities are translated by a [`Bijection`]; rows are
//! translated by wrapping the inner [`ValueSet`] in an outer one that keeps
//! an explicit handle on it.

use std::sync::Arc;

// used to keep the one-to-one mapping between inner and outer entities
use bimap::BiMap;

use crate::datatype::{Timestamps, Value, Variable, VariableEntity};
use crate::error::{Result, VeneerError};
use crate::table::{ValueSet, ValueTable, VariableValueSource};

// ------------- Bijection -------------
/// A two-way entity mapping between an inner and an outer table.
#[derive(Debug, Clone, Default)]
pub struct Bijection {
    // None is the identity
    mapping: Option<BiMap<VariableEntity, VariableEntity>>,
}

impl Bijection {
    pub fn identity() -> Self {
        Self { mapping: None }
    }
    /// Builds a mapping from `(inner, outer)` pairs. Entities missing from
    /// the pairs do not appear through the outer table at all.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (VariableEntity, VariableEntity)>,
    {
        let mut mapping = BiMap::new();
        for (inner, outer) in pairs {
            if let Err((inner, outer)) = mapping.insert_no_overwrite(inner, outer) {
                return Err(VeneerError::InvalidArgument(format!(
                    "mapping {} to {} breaks the bijection",
                    inner, outer
                )));
            }
        }
        Ok(Self {
            mapping: Some(mapping),
        })
    }
    pub fn is_identity(&self) -> bool {
        self.mapping.is_none()
    }
    /// Inner to outer.
    pub fn forward(&self, inner: &VariableEntity) -> Option<VariableEntity> {
        match &self.mapping {
            None => Some(inner.clone()),
            Some(mapping) => mapping.get_by_left(inner).cloned(),
        }
    }
    /// Outer to inner.
    pub fn backward(&self, outer: &VariableEntity) -> Option<VariableEntity> {
        match &self.mapping {
            None => Some(outer.clone()),
            Some(mapping) => mapping.get_by_right(outer).cloned(),
        }
    }
}

// ------------- Wrapping -------------
/// A wrapped table together with the entity mapping used to reach it.
#[derive(Clone)]
pub struct Wrapping {
    wrapped: Arc<dyn ValueTable>,
    entities: Arc<Bijection>,
}

impl Wrapping {
    pub fn new(wrapped: Arc<dyn ValueTable>, entities: Bijection) -> Self {
        Self {
            wrapped,
            entities: Arc::new(entities),
        }
    }
    pub fn identity(wrapped: Arc<dyn ValueTable>) -> Self {
        Self::new(wrapped, Bijection::identity())
    }
    pub fn wrapped(&self) -> &Arc<dyn ValueTable> {
        &self.wrapped
    }
    pub fn entities(&self) -> &Bijection {
        &self.entities
    }

    /// Maps an outer entity inwards, failing with not-found when it has no
    /// counterpart.
    pub fn inner_entity(&self, outer_table: &str, outer: &VariableEntity) -> Result<VariableEntity> {
        self.entities
            .backward(outer)
            .ok_or_else(|| VeneerError::NoSuchValueSet {
                table: outer_table.to_string(),
                entity: outer.to_string(),
            })
    }
    pub fn outer_entity(&self, inner: &VariableEntity) -> Option<VariableEntity> {
        self.entities.forward(inner)
    }

    /// Re-binds an inner row to the outer table. `None` when the entity has
    /// no outer counterpart.
    pub fn wrap_value_set(&self, outer_table: &str, inner: ValueSet) -> Option<ValueSet> {
        let outer = self.entities.forward(inner.variable_entity())?;
        Some(ValueSet::wrapping(outer_table, outer, inner))
    }
    /// The inner row behind an outer one. Rows built by this wrapping carry
    /// it directly; any other row is looked up again by entity.
    pub fn unwrap_value_set(&self, outer_table: &str, outer: &ValueSet) -> Result<ValueSet> {
        if let Some(inner) = outer.inner() {
            if inner.table_name() == self.wrapped.name() {
                return Ok(inner.clone());
            }
        }
        let entity = self.inner_entity(outer_table, outer.variable_entity())?;
        self.wrapped.value_set(&entity)
    }

    /// Outer entities of every inner entity that maps outwards, maps back
    /// again and passes `keep`. Excluded entities are skipped, not errors.
    pub fn variable_entities<F>(&self, mut keep: F) -> Result<Vec<VariableEntity>>
    where
        F: FnMut(&VariableEntity) -> Result<bool>,
    {
        let mut entities = Vec::new();
        for inner in self.wrapped.variable_entities()? {
            let Some(outer) = self.entities.forward(&inner) else {
                continue;
            };
            if self.entities.backward(&outer).is_none() {
                continue;
            }
            if keep(&outer)? {
                entities.push(outer);
            }
        }
        Ok(entities)
    }
    pub fn has_value_set(&self, outer: &VariableEntity) -> Result<bool> {
        match self.entities.backward(outer) {
            Some(inner) => self.wrapped.has_value_set(&inner),
            None => Ok(false),
        }
    }
    /// The inner row for an outer entity, not yet re-bound.
    pub fn inner_value_set(&self, outer_table: &str, outer: &VariableEntity) -> Result<ValueSet> {
        let inner = self.inner_entity(outer_table, outer)?;
        self.wrapped.value_set(&inner)
    }
    pub fn value_set(&self, outer_table: &str, outer: &VariableEntity) -> Result<ValueSet> {
        let inner = self.inner_value_set(outer_table, outer)?;
        Ok(ValueSet::wrapping(outer_table, outer.clone(), inner))
    }
    pub fn value_sets(&self, outer_table: &str) -> Result<Vec<ValueSet>> {
        Ok(self
            .wrapped
            .value_sets()?
            .into_iter()
            .filter_map(|inner| self.wrap_value_set(outer_table, inner))
            .collect())
    }
    pub fn value_set_timestamps(&self, outer_table: &str, outer: &VariableEntity) -> Result<Option<Timestamps>> {
        let inner = self.inner_entity(outer_table, outer)?;
        self.wrapped.value_set_timestamps(&inner)
    }
}

// ------------- WrappedValueSource -------------
/// A value source written against the inner table, made usable with rows
/// of the outer table.
pub struct WrappedValueSource {
    source: Arc<dyn VariableValueSource>,
    wrapping: Wrapping,
    outer_table: String,
}

impl WrappedValueSource {
    pub fn new(source: Arc<dyn VariableValueSource>, wrapping: Wrapping, outer_table: &str) -> Self {
        Self {
            source,
            wrapping,
            outer_table: outer_table.to_string(),
        }
    }
    pub fn inner_value_set(&self, outer: &ValueSet) -> Result<ValueSet> {
        self.wrapping.unwrap_value_set(&self.outer_table, outer)
    }
    /// Resolves the value against an already unwrapped row.
    pub fn inner_value(&self, inner: &ValueSet) -> Result<Value> {
        self.source.value(inner)
    }
}

impl VariableValueSource for WrappedValueSource {
    fn variable(&self) -> &Variable {
        self.source.variable()
    }
    fn value(&self, value_set: &ValueSet) -> Result<Value> {
        let inner = self.inner_value_set(value_set)?;
        self.source.value(&inner)
    }
}
