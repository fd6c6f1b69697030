//! Clauses are the pure pieces a [`crate::view::View`] is assembled from:
//! which columns show ([`SelectClause`]), which rows show ([`WhereClause`]),
//! and optionally an explicit list of computed columns ([`ListClause`]).

use std::collections::BTreeSet;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::datatype::{Value, Variable};
use crate::error::{Result, VeneerError};
use crate::incremental::IncrementalWhereClause;
use crate::registry::DatasourceRegistry;
use crate::table::{ValueSet, ValueTable, VariableValueSource};

// ------------- Contracts -------------
pub trait SelectClause: Send + Sync {
    fn select(&self, variable: &Variable) -> bool;
    /// A persistable description, when there is one.
    fn spec(&self) -> Option<ClauseSpec> {
        None
    }
}

/// Row inclusion. `table` is the view owning the clause, so a clause can
/// look beyond the row itself; clauses that only need the row ignore it.
pub trait WhereClause: Send + Sync {
    fn matches(&self, value_set: &ValueSet, table: &dyn ValueTable) -> Result<bool>;
    fn spec(&self) -> Option<ClauseSpec> {
        None
    }
}

/// An explicit, pre-resolved set of columns. When a view has one, it
/// replaces the wrapped table's variables instead of filtering them.
pub trait ListClause: Send + Sync {
    fn variable_value_sources(&self) -> Vec<Arc<dyn VariableValueSource>>;
    fn variable_value_source(&self, name: &str) -> Option<Arc<dyn VariableValueSource>> {
        self.variable_value_sources()
            .into_iter()
            .find(|source| source.variable().name() == name)
    }
}

// ------------- AllClause -------------
/// Selects every variable and includes every row.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllClause;

lazy_static! {
    static ref ALL: Arc<AllClause> = Arc::new(AllClause);
}

impl AllClause {
    /// The one shared instance.
    pub fn shared() -> Arc<AllClause> {
        Arc::clone(&ALL)
    }
}

impl SelectClause for AllClause {
    fn select(&self, _variable: &Variable) -> bool {
        true
    }
    fn spec(&self) -> Option<ClauseSpec> {
        Some(ClauseSpec::All)
    }
}

impl WhereClause for AllClause {
    fn matches(&self, _value_set: &ValueSet, _table: &dyn ValueTable) -> Result<bool> {
        Ok(true)
    }
    fn spec(&self) -> Option<ClauseSpec> {
        Some(ClauseSpec::All)
    }
}

// ------------- Select clauses -------------
/// Selects variables by name.
#[derive(Debug, Clone)]
pub struct VariableNameClause {
    names: BTreeSet<String>,
}

impl VariableNameClause {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl SelectClause for VariableNameClause {
    fn select(&self, variable: &Variable) -> bool {
        self.names.contains(variable.name())
    }
    fn spec(&self) -> Option<ClauseSpec> {
        Some(ClauseSpec::Variables {
            names: self.names.iter().cloned().collect(),
        })
    }
}

/// Selects variables whose name matches a regular expression.
#[derive(Debug, Clone)]
pub struct VariablePatternClause {
    pattern: Regex,
}

impl VariablePatternClause {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| VeneerError::InvalidArgument(format!("bad variable pattern: {}", e)))?;
        Ok(Self { pattern })
    }
}

impl SelectClause for VariablePatternClause {
    fn select(&self, variable: &Variable) -> bool {
        self.pattern.is_match(variable.name())
    }
    fn spec(&self) -> Option<ClauseSpec> {
        Some(ClauseSpec::Pattern {
            regex: self.pattern.as_str().to_string(),
        })
    }
}

/// Adapts a closure into a select clause.
pub struct SelectFn<F>(F);

impl<F> SelectFn<F>
where
    F: Fn(&Variable) -> bool + Send + Sync,
{
    pub fn new(select: F) -> Self {
        Self(select)
    }
}

impl<F> SelectClause for SelectFn<F>
where
    F: Fn(&Variable) -> bool + Send + Sync,
{
    fn select(&self, variable: &Variable) -> bool {
        (self.0)(variable)
    }
}

// ------------- Where clauses -------------
/// Includes the rows of the listed entity identifiers.
#[derive(Debug, Clone)]
pub struct EntityClause {
    identifiers: BTreeSet<String>,
}

impl EntityClause {
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifiers: identifiers.into_iter().map(Into::into).collect(),
        }
    }
}

impl WhereClause for EntityClause {
    fn matches(&self, value_set: &ValueSet, _table: &dyn ValueTable) -> Result<bool> {
        Ok(self
            .identifiers
            .contains(value_set.variable_entity().identifier()))
    }
    fn spec(&self) -> Option<ClauseSpec> {
        Some(ClauseSpec::Entities {
            identifiers: self.identifiers.iter().cloned().collect(),
        })
    }
}

/// Adapts a closure into a where clause.
pub struct WhereFn<F>(F);

impl<F> WhereFn<F>
where
    F: Fn(&ValueSet, &dyn ValueTable) -> Result<bool> + Send + Sync,
{
    pub fn new(matches: F) -> Self {
        Self(matches)
    }
}

impl<F> WhereClause for WhereFn<F>
where
    F: Fn(&ValueSet, &dyn ValueTable) -> Result<bool> + Send + Sync,
{
    fn matches(&self, value_set: &ValueSet, table: &dyn ValueTable) -> Result<bool> {
        (self.0)(value_set, table)
    }
}

// ------------- List clauses -------------
#[derive(Default)]
pub struct StaticListClause {
    sources: Vec<Arc<dyn VariableValueSource>>,
}

impl StaticListClause {
    pub fn new(sources: Vec<Arc<dyn VariableValueSource>>) -> Self {
        Self { sources }
    }
}

impl ListClause for StaticListClause {
    fn variable_value_sources(&self) -> Vec<Arc<dyn VariableValueSource>> {
        self.sources.clone()
    }
}

/// A computed column. The function receives rows of the wrapped table.
pub struct DerivedValueSource<F> {
    variable: Variable,
    derive: F,
}

impl<F> DerivedValueSource<F>
where
    F: Fn(&ValueSet) -> Result<Value> + Send + Sync,
{
    pub fn new(variable: Variable, derive: F) -> Self {
        Self { variable, derive }
    }
}

impl<F> VariableValueSource for DerivedValueSource<F>
where
    F: Fn(&ValueSet) -> Result<Value> + Send + Sync,
{
    fn variable(&self) -> &Variable {
        &self.variable
    }
    fn value(&self, value_set: &ValueSet) -> Result<Value> {
        (self.derive)(value_set)
    }
}

// ------------- ClauseSpec -------------
/// Serializable description of the built-in clauses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClauseSpec {
    All,
    Variables { names: Vec<String> },
    Pattern { regex: String },
    Entities { identifiers: Vec<String> },
    Incremental { source: String, destination: String },
}

impl ClauseSpec {
    pub fn into_select(self) -> Result<Arc<dyn SelectClause>> {
        match self {
            Self::All => Ok(AllClause::shared()),
            Self::Variables { names } => Ok(Arc::new(VariableNameClause::new(names))),
            Self::Pattern { regex } => Ok(Arc::new(VariablePatternClause::new(&regex)?)),
            other => Err(VeneerError::InvalidArgument(format!(
                "{:?} is not a select clause",
                other
            ))),
        }
    }
    pub fn into_where(self, registry: &Arc<DatasourceRegistry>) -> Result<Arc<dyn WhereClause>> {
        match self {
            Self::All => Ok(AllClause::shared()),
            Self::Entities { identifiers } => Ok(Arc::new(EntityClause::new(identifiers))),
            Self::Incremental {
                source,
                destination,
            } => Ok(Arc::new(IncrementalWhereClause::new(
                Arc::downgrade(registry),
                &source,
                &destination,
            ))),
            other => Err(VeneerError::InvalidArgument(format!(
                "{:?} is not a where clause",
                other
            ))),
        }
    }
}
