//! Veneer – virtual tables over heterogeneous data sources.
//!
//! Veneer presents every data source through one abstraction, a
//! [`table::ValueTable`]: a named collection of entities × variables whose
//! rows ([`table::ValueSet`]s) are pulled lazily through
//! [`table::VariableValueSource`]s. On top of that contract it builds
//! virtual tables that never copy data:
//! * A [`view::View`] wraps one table and filters its columns with a
//!   [`clause::SelectClause`] and its rows with a [`clause::WhereClause`],
//!   or replaces its columns with a [`clause::ListClause`].
//! * A [`join::JoinTable`] unions two or more tables of one entity type.
//!   The first member defining a variable name owns that variable.
//! * An [`incremental::IncrementalWhereClause`] keeps only the rows of a
//!   source table that are newer than their copy in a destination table.
//!
//! Entity identities are translated between a virtual table and the table
//! it wraps by the [`wrap`] primitive, built on a [`wrap::Bijection`].
//!
//! ## Registering views
//! Views live on data sources. A [`manager::ViewManager`] decorates each
//! data source once with a [`manager::ViewAwareDatasource`], which exposes
//! views next to the physical tables and keeps the view set in step with a
//! [`persist::ViewPersistenceStrategy`]: when a write fails, the in-memory
//! change is rolled back and the error is returned unchanged.
//!
//! ## Persistence
//! [`persist::MemoryPersistence`] keeps views for the life of the process.
//! [`persist::Persistor`] stores them in SQLite as JSON descriptors and
//! rebuilds them through the [`registry::DatasourceRegistry`].
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use veneer::clause::VariableNameClause;
//! use veneer::datatype::{Value, ValueType, Variable};
//! use veneer::manager::ViewManager;
//! use veneer::persist::MemoryPersistence;
//! use veneer::registry::DatasourceRegistry;
//! use veneer::support::{StaticDatasource, StaticValueTable};
//! use veneer::table::{Datasource, ValueTable};
//! use veneer::view::View;
//!
//! let source = Arc::new(StaticDatasource::new("clinic"));
//! let patients = source.add_table(StaticValueTable::new("patients", "Participant")).unwrap();
//! patients.add_variable(Variable::new("age", ValueType::Integer, "Participant")).unwrap();
//! patients.set_value("p1", "age", Value::integer(42)).unwrap();
//!
//! let registry = Arc::new(DatasourceRegistry::new());
//! let manager = ViewManager::new(Arc::clone(&registry), Arc::new(MemoryPersistence::new()));
//! let clinic = manager.decorate(source).unwrap();
//! let view = View::builder("ages", clinic.value_table("patients").unwrap())
//!     .select(Arc::new(VariableNameClause::new(["age"])))
//!     .build()
//!     .unwrap();
//! manager.add_view("clinic", view).unwrap();
//! assert!(manager.has_view("clinic", "ages"));
//! assert_eq!(clinic.value_table("ages").unwrap().variable_entities().unwrap().len(), 1);
//! ```

pub mod cache;
pub mod clause;
pub mod datatype;
pub mod error;
pub mod incremental;
pub mod join;
pub mod manager;
pub mod persist;
pub mod registry;
pub mod settings;
pub mod support;
pub mod table;
pub mod view;
pub mod wrap;

pub use error::{Result, VeneerError};
