//! Views: virtual tables projecting and filtering a wrapped table.
//!
//! A [`View`] is assembled with a consuming [`ViewBuilder`]; once built it
//! is immutable apart from its owner and its timestamps, both of which are
//! managed by the data source it is attached to.
//!
//! Reads go through three steps: map the outer entity to the wrapped
//! table's entity, ask the wrapped table, and evaluate the where clause
//! against the wrapped row. A row the where clause rejects is reported as
//! absent, exactly like a row that never existed.

use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::clause::{AllClause, ListClause, SelectClause, WhereClause};
use crate::datatype::{Timestamps, Value, Variable, VariableEntity};
use crate::error::{Result, VeneerError};
use crate::table::{TableSpec, ValueSet, ValueTable, VariableValueSource};
use crate::wrap::{Bijection, WrappedValueSource, Wrapping};

/// Where a view is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    Initialised,
    Attached { datasource: String },
    Disposed,
}

struct ViewInner {
    name: String,
    wrapping: Wrapping,
    select: Arc<dyn SelectClause>,
    where_clause: Arc<dyn WhereClause>,
    list: Option<Arc<dyn ListClause>>,
    state: RwLock<ViewState>,
    timestamps: RwLock<Timestamps>,
}

// ------------- View -------------
/// Cloning a view yields another handle on the same view.
#[derive(Clone)]
pub struct View {
    inner: Arc<ViewInner>,
}

impl View {
    pub fn builder(name: impl Into<String>, wrapped: Arc<dyn ValueTable>) -> ViewBuilder {
        ViewBuilder {
            name: name.into(),
            wrapped,
            entities: Bijection::identity(),
            select: AllClause::shared(),
            where_clause: AllClause::shared(),
            list: None,
            timestamps: Timestamps::default(),
        }
    }

    pub fn wrapped_table(&self) -> &Arc<dyn ValueTable> {
        self.inner.wrapping.wrapped()
    }
    pub fn entity_mapping(&self) -> &Bijection {
        self.inner.wrapping.entities()
    }
    pub fn select_clause(&self) -> &Arc<dyn SelectClause> {
        &self.inner.select
    }
    pub fn where_clause(&self) -> &Arc<dyn WhereClause> {
        &self.inner.where_clause
    }
    pub fn list_clause(&self) -> Option<&Arc<dyn ListClause>> {
        self.inner.list.as_ref()
    }
    pub fn state(&self) -> ViewState {
        self.inner
            .state
            .read()
            .map(|state| state.clone())
            .unwrap_or(ViewState::Disposed)
    }
    /// The view's own created and updated stamps, set when it is registered.
    pub fn view_timestamps(&self) -> Timestamps {
        self.inner
            .timestamps
            .read()
            .map(|ts| *ts)
            .unwrap_or_default()
    }
    /// Whether both handles designate the same view.
    pub fn same_as(&self, other: &View) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn attach(&self, datasource: &str) -> Result<()> {
        let mut state = self.inner.state.write()?;
        if *state == ViewState::Disposed {
            return Err(VeneerError::InvalidArgument(format!(
                "view {} is disposed",
                self.inner.name
            )));
        }
        *state = ViewState::Attached {
            datasource: datasource.to_string(),
        };
        Ok(())
    }
    pub(crate) fn detach(&self) -> Result<()> {
        let mut state = self.inner.state.write()?;
        if *state != ViewState::Disposed {
            *state = ViewState::Initialised;
        }
        Ok(())
    }
    pub(crate) fn stamp(&self, created: DateTime<Utc>, updated: DateTime<Utc>) -> Result<()> {
        *self.inner.timestamps.write()? = Timestamps::new(created, updated);
        Ok(())
    }
    pub(crate) fn restore_timestamps(&self, timestamps: Timestamps) -> Result<()> {
        *self.inner.timestamps.write()? = timestamps;
        Ok(())
    }
    pub fn dispose(&self) -> Result<()> {
        *self.inner.state.write()? = ViewState::Disposed;
        Ok(())
    }
    /// A new, unattached view built from the same parts.
    pub(crate) fn detached_copy(&self) -> View {
        View {
            inner: Arc::new(ViewInner {
                name: self.inner.name.clone(),
                wrapping: self.inner.wrapping.clone(),
                select: Arc::clone(&self.inner.select),
                where_clause: Arc::clone(&self.inner.where_clause),
                list: self.inner.list.clone(),
                state: RwLock::new(ViewState::Initialised),
                timestamps: RwLock::new(self.view_timestamps()),
            }),
        }
    }

    /// Every variable must belong to the view's entity type.
    pub fn check_entity_types(&self) -> Result<()> {
        for variable in self.variables()? {
            check_entity_type(&self.inner.name, self.entity_type(), &variable)?;
        }
        Ok(())
    }

    fn accepts(&self, inner: &ValueSet) -> Result<bool> {
        self.inner.where_clause.matches(inner, self)
    }
    fn no_such_value_set(&self, entity: &VariableEntity) -> VeneerError {
        VeneerError::NoSuchValueSet {
            table: self.inner.name.clone(),
            entity: entity.to_string(),
        }
    }
    fn no_such_variable(&self, name: &str) -> VeneerError {
        VeneerError::NoSuchVariable {
            table: self.inner.name.clone(),
            variable: name.to_string(),
        }
    }
}

fn check_entity_type(view: &str, entity_type: &str, variable: &Variable) -> Result<()> {
    if variable.entity_type() != entity_type {
        return Err(VeneerError::IncompatibleEntityType {
            table: view.to_string(),
            variable: variable.name().to_string(),
            expected: entity_type.to_string(),
            found: variable.entity_type().to_string(),
        });
    }
    Ok(())
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.inner.name)
            .field("wrapped", &self.wrapped_table().name())
            .field("state", &self.state())
            .finish()
    }
}

impl ValueTable for View {
    fn name(&self) -> &str {
        &self.inner.name
    }
    fn entity_type(&self) -> &str {
        self.wrapped_table().entity_type()
    }
    fn datasource_name(&self) -> Option<String> {
        match self.state() {
            ViewState::Attached { datasource } => Some(datasource),
            _ => None,
        }
    }
    fn is_view(&self) -> bool {
        true
    }
    // not resolvable while stored views load
    fn reference(&self) -> Option<TableSpec> {
        None
    }

    fn variables(&self) -> Result<Vec<Variable>> {
        if let Some(list) = &self.inner.list {
            return Ok(list
                .variable_value_sources()
                .iter()
                .map(|source| source.variable().clone())
                .collect());
        }
        Ok(self
            .wrapped_table()
            .variables()?
            .into_iter()
            .filter(|variable| self.inner.select.select(variable))
            .collect())
    }
    fn variable_value_source(&self, name: &str) -> Result<Arc<dyn VariableValueSource>> {
        let source = match &self.inner.list {
            Some(list) => list
                .variable_value_source(name)
                .ok_or_else(|| self.no_such_variable(name))?,
            None => self.wrapped_table().variable_value_source(name)?,
        };
        // visible physically is not enough, the select clause has the last word
        if !self.inner.select.select(source.variable()) {
            return Err(self.no_such_variable(name));
        }
        Ok(Arc::new(ViewValueSource {
            view: self.clone(),
            source: WrappedValueSource::new(source, self.inner.wrapping.clone(), &self.inner.name),
        }))
    }

    fn variable_entities(&self) -> Result<Vec<VariableEntity>> {
        self.inner
            .wrapping
            .variable_entities(|outer| self.has_value_set(outer))
    }
    fn has_value_set(&self, entity: &VariableEntity) -> Result<bool> {
        if !self.inner.wrapping.has_value_set(entity)? {
            return Ok(false);
        }
        let inner = self.inner.wrapping.inner_value_set(&self.inner.name, entity)?;
        self.accepts(&inner)
    }
    fn value_set(&self, entity: &VariableEntity) -> Result<ValueSet> {
        let inner = self.inner.wrapping.inner_value_set(&self.inner.name, entity)?;
        if !self.accepts(&inner)? {
            return Err(self.no_such_value_set(entity));
        }
        Ok(ValueSet::wrapping(&self.inner.name, entity.clone(), inner))
    }
    fn value_sets(&self) -> Result<Vec<ValueSet>> {
        let mut value_sets = Vec::new();
        for inner in self.wrapped_table().value_sets()? {
            if !self.accepts(&inner)? {
                continue;
            }
            if let Some(outer) = self.inner.wrapping.wrap_value_set(&self.inner.name, inner) {
                value_sets.push(outer);
            }
        }
        Ok(value_sets)
    }

    fn timestamps(&self) -> Timestamps {
        let own = self.view_timestamps();
        let wrapped = self.wrapped_table().timestamps();
        Timestamps {
            created: own.created,
            last_update: match (own.last_update, wrapped.last_update) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
        }
    }
    fn value_set_timestamps(&self, entity: &VariableEntity) -> Result<Option<Timestamps>> {
        if !self.has_value_set(entity)? {
            return Err(self.no_such_value_set(entity));
        }
        self.inner
            .wrapping
            .value_set_timestamps(&self.inner.name, entity)
    }
}

/// Re-checks the where clause on every read, so a stale value set cannot
/// be used to read a row the view no longer exposes.
struct ViewValueSource {
    view: View,
    source: WrappedValueSource,
}

impl VariableValueSource for ViewValueSource {
    fn variable(&self) -> &Variable {
        self.source.variable()
    }
    fn value(&self, value_set: &ValueSet) -> Result<Value> {
        let inner = self.source.inner_value_set(value_set)?;
        if !self.view.accepts(&inner)? {
            return Err(self.view.no_such_value_set(value_set.variable_entity()));
        }
        self.source.inner_value(&inner)
    }
}

// ------------- ViewBuilder -------------
pub struct ViewBuilder {
    name: String,
    wrapped: Arc<dyn ValueTable>,
    entities: Bijection,
    select: Arc<dyn SelectClause>,
    where_clause: Arc<dyn WhereClause>,
    list: Option<Arc<dyn ListClause>>,
    timestamps: Timestamps,
}

impl ViewBuilder {
    pub fn select(mut self, clause: Arc<dyn SelectClause>) -> Self {
        self.select = clause;
        self
    }
    pub fn where_clause(mut self, clause: Arc<dyn WhereClause>) -> Self {
        self.where_clause = clause;
        self
    }
    pub fn list(mut self, clause: Arc<dyn ListClause>) -> Self {
        self.list = Some(clause);
        self
    }
    pub fn entity_mapping(mut self, entities: Bijection) -> Self {
        self.entities = entities;
        self
    }
    pub fn timestamps(mut self, timestamps: Timestamps) -> Self {
        self.timestamps = timestamps;
        self
    }
    /// Validates and initialises the view.
    pub fn build(self) -> Result<View> {
        if self.name.is_empty() {
            return Err(VeneerError::InvalidArgument(
                "view name cannot be empty".to_string(),
            ));
        }
        if let Some(list) = &self.list {
            let entity_type = self.wrapped.entity_type();
            for source in list.variable_value_sources() {
                check_entity_type(&self.name, entity_type, source.variable())?;
            }
        }
        Ok(View {
            inner: Arc::new(ViewInner {
                name: self.name,
                wrapping: Wrapping::new(self.wrapped, self.entities),
                select: self.select,
                where_clause: self.where_clause,
                list: self.list,
                state: RwLock::new(ViewState::Initialised),
                timestamps: RwLock::new(self.timestamps),
            }),
        })
    }
}
