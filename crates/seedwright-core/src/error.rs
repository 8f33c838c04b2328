use thiserror::Error;

/// Core error type shared across seedwright crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading a schema source failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A table name was not found in the schema.
    #[error("unknown table: {0}")]
    UnknownTable(String),
    /// Two or more distinct tables reference each other.
    #[error("dependency cycle between tables: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
}

/// Convenience alias for results returned by seedwright crates.
pub type Result<T> = std::result::Result<T, Error>;
