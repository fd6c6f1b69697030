use thiserror::Error;

#[derive(Error, Debug)]
pub enum VeneerError {
    #[error("No such datasource: {0}")]
    NoSuchDatasource(String),
    #[error("No such value table: {datasource}.{table}")]
    NoSuchValueTable { datasource: String, table: String },
    #[error("No such variable: {variable} in {table}")]
    NoSuchVariable { table: String, variable: String },
    #[error("No such value set: {entity} in {table}")]
    NoSuchValueSet { table: String, entity: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Incompatible entity type in {table}: variable {variable} is {found}, expected {expected}")]
    IncompatibleEntityType {
        table: String,
        variable: String,
        expected: String,
        found: String,
    },
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

/// Coarse classification of a [`VeneerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    IncompatibleEntityType,
    Unsupported,
    Persistence,
    Config,
    Internal,
}

impl VeneerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSuchDatasource(_)
            | Self::NoSuchValueTable { .. }
            | Self::NoSuchVariable { .. }
            | Self::NoSuchValueSet { .. } => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::IncompatibleEntityType { .. } => ErrorKind::IncompatibleEntityType,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Config(_) => ErrorKind::Config,
            Self::Lock(_) => ErrorKind::Internal,
        }
    }
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type Result<T> = std::result::Result<T, VeneerError>;

// Helper conversions
impl From<rusqlite::Error> for VeneerError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<serde_json::Error> for VeneerError {
    fn from(e: serde_json::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for VeneerError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl<T> From<std::sync::PoisonError<T>> for VeneerError {
    fn from(e: std::sync::PoisonError<T>) -> Self { Self::Lock(e.to_string()) }
}
