//! Wiping a database back to empty between test runs.
//!
//! Sequences are restarted, then every base table is emptied. The foreign-key
//! graph between tables is never inspected: deletes are retried in rounds
//! until a round goes through without a foreign key violation.
//!
//! ## Example
//!
//! ```text
//! -- discovery order: invoice, customer   (invoice.customer_id -> customer.id)
//! round 1: DELETE FROM "public"."invoice"   ok
//!          DELETE FROM "public"."customer"  ok
//!
//! -- discovery order: customer, invoice
//! round 1: DELETE FROM "public"."customer"  foreign_key_violation
//!          DELETE FROM "public"."invoice"   ok
//! round 2: DELETE FROM "public"."customer"  ok
//!          DELETE FROM "public"."invoice"   ok
//! ```
//!
//! Rows removed in one round never come back, so the set of blocked tables
//! only shrinks. An acyclic graph of N tables needs at most N rounds; a cycle
//! that no delete order can break runs into [`MAX_ROUNDS`].

use std::fmt;
use std::future::Future;

use tokio_postgres::error::SqlState;

use crate::ident::qualified;
use crate::traced::{Connection, ConnectionExt};
use crate::{Error, Result};

/// Upper bound on delete rounds for a single reset.
pub const MAX_ROUNDS: u32 = 100;

const SYSTEM_SCHEMAS: &str = "('information_schema', 'pg_catalog', 'pg_toast')";

/// A sequence object, e.g. the one backing a `SERIAL` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub schema: String,
    pub name: String,
}

impl Sequence {
    pub fn restart_sql(&self) -> String {
        format!(
            "ALTER SEQUENCE {} RESTART WITH 1",
            qualified(&self.schema, &self.name)
        )
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A base table (not a view, not a catalog).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub schema: String,
    pub name: String,
}

impl Table {
    /// Delete every row. Referential actions configured on the constraints
    /// (`ON DELETE CASCADE`) still apply.
    pub fn delete_sql(&self) -> String {
        format!("DELETE FROM {}", qualified(&self.schema, &self.name))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// What a successful reset did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReport {
    /// Sequences restarted at 1.
    pub sequences: usize,
    /// Tables emptied.
    pub tables: usize,
    /// Delete rounds it took to get every table empty.
    pub rounds: u32,
}

/// Restart every sequence and delete every row in every user table.
///
/// The connection is borrowed for the whole call and left open. Statements
/// run one at a time; nothing here guards against another reset running on
/// the same database concurrently.
pub async fn reset_database<C: Connection>(conn: &C) -> Result<ResetReport> {
    let sequences = list_sequences(conn).await?;
    for sequence in &sequences {
        conn.on(sequence)
            .execute(&sequence.restart_sql())
            .await
            .map_err(|source| Error::RestartSequence {
                sequence: sequence.to_string(),
                source,
            })?;
    }

    let tables = list_tables(conn).await?;
    let rounds = clear_tables(&tables, MAX_ROUNDS, move |table| {
        let table = table.clone();
        async move { conn.on(&table).execute(&table.delete_sql()).await.map(|_| ()) }
    })
    .await?;

    tracing::info!(
        sequences = sequences.len(),
        tables = tables.len(),
        rounds,
        "database reset"
    );

    Ok(ResetReport {
        sequences: sequences.len(),
        tables: tables.len(),
        rounds,
    })
}

/// List sequences outside the system schemas.
pub async fn list_sequences<C: Connection>(conn: &C) -> Result<Vec<Sequence>> {
    let sql = format!(
        "SELECT sequence_schema::text, sequence_name::text \
         FROM information_schema.sequences \
         WHERE sequence_schema NOT IN {SYSTEM_SCHEMAS} \
         ORDER BY 1, 2"
    );
    let rows = conn
        .on(&"information_schema.sequences")
        .query(&sql, &[])
        .await
        .map_err(|source| Error::Query {
            what: "selecting sequences from information schema",
            source,
        })?;

    Ok(rows
        .iter()
        .map(|row| Sequence {
            schema: row.get(0),
            name: row.get(1),
        })
        .collect())
}

/// List base tables outside the system schemas, ordered by schema then name.
pub async fn list_tables<C: Connection>(conn: &C) -> Result<Vec<Table>> {
    let sql = format!(
        "SELECT table_schema::text, table_name::text \
         FROM information_schema.tables \
         WHERE table_schema NOT IN {SYSTEM_SCHEMAS} AND table_type = 'BASE TABLE' \
         ORDER BY 1, 2"
    );
    let rows = conn
        .on(&"information_schema.tables")
        .query(&sql, &[])
        .await
        .map_err(|source| Error::Query {
            what: "selecting tables from information schema",
            source,
        })?;

    Ok(rows
        .iter()
        .map(|row| Table {
            schema: row.get(0),
            name: row.get(1),
        })
        .collect())
}

/// Classifies a failed delete.
pub trait DeleteFailure {
    /// True when the delete was refused because other rows still reference
    /// the ones being deleted. Such failures are retried next round.
    fn is_foreign_key_violation(&self) -> bool;
}

impl DeleteFailure for tokio_postgres::Error {
    fn is_foreign_key_violation(&self) -> bool {
        self.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION)
    }
}

/// Why [`clear_tables`] gave up.
#[derive(Debug)]
pub enum ClearError<E> {
    /// A delete failed for a reason retrying can't fix.
    Fatal { table: Table, source: E },
    /// Every round up to the cap still had a foreign key violation.
    Exhausted { rounds: u32, table: Table, source: E },
}

impl From<ClearError<tokio_postgres::Error>> for Error {
    fn from(err: ClearError<tokio_postgres::Error>) -> Self {
        match err {
            ClearError::Fatal { table, source } => Error::DeleteRows {
                table: table.to_string(),
                source,
            },
            ClearError::Exhausted {
                rounds,
                table,
                source,
            } => Error::TooManyRounds {
                rounds,
                table: table.to_string(),
                source,
            },
        }
    }
}

/// Run `delete` over every table, round after round, until a round has no
/// foreign key violation. Returns the number of rounds used.
///
/// Tables are tried in the given order each round. A foreign key violation
/// is remembered and the round carries on; any other error stops everything.
pub async fn clear_tables<E, F, Fut>(
    tables: &[Table],
    max_rounds: u32,
    mut delete: F,
) -> std::result::Result<u32, ClearError<E>>
where
    E: DeleteFailure + fmt::Display,
    F: FnMut(&Table) -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
{
    let mut round = 0;
    loop {
        round += 1;
        let mut blocked = 0usize;
        let mut last_violation = None;

        for table in tables {
            match delete(table).await {
                Ok(()) => {}
                Err(e) if e.is_foreign_key_violation() => {
                    tracing::debug!(round, table = %table, "delete blocked: {}", e);
                    blocked += 1;
                    last_violation = Some((table.clone(), e));
                }
                Err(source) => {
                    return Err(ClearError::Fatal {
                        table: table.clone(),
                        source,
                    });
                }
            }
        }

        let Some((table, source)) = last_violation else {
            return Ok(round);
        };

        if round >= max_rounds {
            tracing::warn!(rounds = round, blocked, "giving up on clearing tables");
            return Err(ClearError::Exhausted {
                rounds: round,
                table,
                source,
            });
        }

        tracing::debug!(round, blocked, "tables still referenced, going again");
    }
}
