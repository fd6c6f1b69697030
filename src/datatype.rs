// used for timestamps and temporal values
use chrono::{DateTime, NaiveDate, Utc};
// used for decimal numbers
use bigdecimal::BigDecimal;
// used to (de)serialize value types in view definitions
use serde::{Deserialize, Serialize};

// used to keep attributes in a stable order
use std::collections::BTreeMap;
// custom made ordering for values
use std::cmp::Ordering;
// used to print out readable forms of values and entities
use std::fmt;

use crate::error::{Result, VeneerError};

// ------------- ValueType -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
}

impl ValueType {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
        }
    }
    pub fn null_value(self) -> Value {
        Value::null(self)
    }
    pub fn null_sequence(self) -> Value {
        Value::null_sequence(self)
    }
}
impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ------------- Datum -------------
/// A single non-null scalar.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Datum {
    Text(String),
    Integer(i64),
    Decimal(BigDecimal),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl Datum {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Text(_) => ValueType::Text,
            Self::Integer(_) => ValueType::Integer,
            Self::Decimal(_) => ValueType::Decimal,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Date(_) => ValueType::Date,
            Self::DateTime(_) => ValueType::DateTime,
        }
    }
}
impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Date(d) => write!(f, "{}", d),
            Self::DateTime(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

// ------------- Value -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Content {
    Scalar(Option<Datum>),
    Sequence(Option<Vec<Option<Datum>>>),
}

/// A typed scalar or sequence of scalars. Null is an explicit value that
/// still carries its type and shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Value {
    value_type: ValueType,
    content: Content,
}

impl Value {
    pub fn new(datum: Datum) -> Self {
        Self {
            value_type: datum.value_type(),
            content: Content::Scalar(Some(datum)),
        }
    }
    pub fn null(value_type: ValueType) -> Self {
        Self {
            value_type,
            content: Content::Scalar(None),
        }
    }
    pub fn null_sequence(value_type: ValueType) -> Self {
        Self {
            value_type,
            content: Content::Sequence(None),
        }
    }
    /// Builds a sequence, rejecting items of another type than `value_type`.
    pub fn sequence(value_type: ValueType, items: Vec<Option<Datum>>) -> Result<Self> {
        if let Some(stray) = items.iter().flatten().find(|d| d.value_type() != value_type) {
            return Err(VeneerError::InvalidArgument(format!(
                "{} item in a {} sequence",
                stray.value_type(),
                value_type
            )));
        }
        Ok(Self {
            value_type,
            content: Content::Sequence(Some(items)),
        })
    }
    pub fn text(s: impl Into<String>) -> Self {
        Self::new(Datum::Text(s.into()))
    }
    pub fn integer(i: i64) -> Self {
        Self::new(Datum::Integer(i))
    }
    pub fn boolean(b: bool) -> Self {
        Self::new(Datum::Boolean(b))
    }
    pub fn date_time(t: DateTime<Utc>) -> Self {
        Self::new(Datum::DateTime(t))
    }
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }
    pub fn is_null(&self) -> bool {
        matches!(self.content, Content::Scalar(None) | Content::Sequence(None))
    }
    pub fn is_sequence(&self) -> bool {
        matches!(self.content, Content::Sequence(_))
    }
    pub fn datum(&self) -> Option<&Datum> {
        match &self.content {
            Content::Scalar(datum) => datum.as_ref(),
            Content::Sequence(_) => None,
        }
    }
    pub fn items(&self) -> Option<&[Option<Datum>]> {
        match &self.content {
            Content::Sequence(Some(items)) => Some(items),
            _ => None,
        }
    }
}

// Values of different types or shapes are not comparable. Null sorts first.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.value_type != other.value_type {
            return None;
        }
        match (&self.content, &other.content) {
            (Content::Scalar(a), Content::Scalar(b)) => Some(a.cmp(b)),
            (Content::Sequence(a), Content::Sequence(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.content {
            Content::Scalar(None) | Content::Sequence(None) => write!(f, "null"),
            Content::Scalar(Some(datum)) => write!(f, "{}", datum),
            Content::Sequence(Some(items)) => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Some(datum) => datum.to_string(),
                        None => "null".to_string(),
                    })
                    .collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}

// ------------- VariableEntity -------------
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableEntity {
    entity_type: String,
    identifier: String,
}

impl VariableEntity {
    pub fn new(entity_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            identifier: identifier.into(),
        }
    }
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}
impl fmt::Display for VariableEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.identifier)
    }
}

// ------------- Variable -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    name: String,
    missing: bool,
}

impl Category {
    pub fn new(name: impl Into<String>, missing: bool) -> Self {
        Self {
            name: name.into(),
            missing,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn missing(&self) -> bool {
        self.missing
    }
}

/// Column metadata. Built with the `with_*` methods and never mutated once
/// handed to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    name: String,
    value_type: ValueType,
    entity_type: String,
    repeatable: bool,
    categories: Vec<Category>,
    attributes: BTreeMap<String, String>,
}

impl Variable {
    pub fn new(
        name: impl Into<String>,
        value_type: ValueType,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value_type,
            entity_type: entity_type.into(),
            repeatable: false,
            categories: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }
    pub fn with_repeatable(mut self, repeatable: bool) -> Self {
        self.repeatable = repeatable;
        self
    }
    pub fn with_category(mut self, category: Category) -> Self {
        self.categories.push(category);
        self
    }
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }
    pub fn repeatable(&self) -> bool {
        self.repeatable
    }
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
    /// The null this variable resolves to when a row is missing.
    pub fn null_value(&self) -> Value {
        if self.repeatable {
            Value::null_sequence(self.value_type)
        } else {
            Value::null(self.value_type)
        }
    }
}

// ------------- Timestamps -------------
/// Created and last update instants of a table or of one of its rows.
/// Either may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub created: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
}

impl Timestamps {
    pub fn new(created: DateTime<Utc>, last_update: DateTime<Utc>) -> Self {
        Self {
            created: Some(created),
            last_update: Some(last_update),
        }
    }
    /// Earliest known created and latest known last update. `None` when
    /// there was nothing to aggregate.
    pub fn aggregate<I: IntoIterator<Item = Timestamps>>(timestamps: I) -> Option<Timestamps> {
        let mut aggregate: Option<Timestamps> = None;
        for ts in timestamps {
            let merged = aggregate.get_or_insert_with(Timestamps::default);
            merged.created = match (merged.created, ts.created) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            merged.last_update = match (merged.last_update, ts.last_update) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }
        aggregate
    }
}
