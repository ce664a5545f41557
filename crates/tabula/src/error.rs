use std::process::ExitStatus;

use thiserror::Error;

/// Everything that can go wrong while ensuring, syncing or resetting a database.
///
/// URLs carried by these variants are already password-masked.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid database url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no database name found in database url: {url}")]
    MissingDatabaseName { url: String },

    #[error("database name in {url} is not valid UTF-8 once decoded: {source}")]
    DatabaseNameEncoding {
        url: String,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("error {what}: {source}")]
    Query {
        what: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("error creating database {name}: {source}")]
    CreateDatabase {
        name: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("error restarting sequence {sequence}: {source}")]
    RestartSequence {
        sequence: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("error deleting from table {table}: {source}")]
    DeleteRows {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Every round still hit a foreign key violation. `source` is the last one seen.
    #[error("error deleting from tables: gave up after {rounds} rounds, last error on {table}: {source}")]
    TooManyRounds {
        rounds: u32,
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error running {program} ({status})\n\nOutput: {output}")]
    ToolFailed {
        program: String,
        status: ExitStatus,
        output: String,
    },
}
