//! Statement tracing.
//!
//! Every statement tabula sends runs inside a `tabula.sql` debug span that
//! names the object it acts on: the table being emptied, the sequence being
//! restarted, the database being created or the catalog being read. A refused
//! statement records its SQLSTATE on that span, so in a reset trace a blocked
//! delete shows up as `object=public.customer sqlstate=23503`.

use std::fmt;
use std::future::Future;

use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{Instrument, Span};

use crate::db_url::mask_password;

/// Open a connection and spawn its driver onto the current runtime.
///
/// The returned client is owned by the caller; dropping it closes the
/// connection.
pub async fn connect(url: &str) -> crate::Result<Client> {
    let (client, connection) =
        tokio_postgres::connect(url, NoTls)
            .await
            .map_err(|source| crate::Error::Connect {
                url: mask_password(url),
                source,
            })?;

    let masked = mask_password(url);
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(url = %masked, "database connection error: {}", e);
        }
    });

    Ok(client)
}

/// The two statement shapes tabula needs from a connection.
///
/// Implemented for `tokio_postgres::Client`; tests substitute their own.
pub trait Connection: Send + Sync {
    fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<u64, tokio_postgres::Error>> + Send;

    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<Vec<Row>, tokio_postgres::Error>> + Send;
}

impl Connection for Client {
    fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<u64, tokio_postgres::Error>> + Send {
        Client::execute(self, sql, params)
    }

    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<Vec<Row>, tokio_postgres::Error>> + Send {
        Client::query(self, sql, params)
    }
}

/// A connection bound to the object its next statements act on.
pub struct TracedConn<'a, C> {
    conn: &'a C,
    object: &'a (dyn fmt::Display + Sync),
}

impl<C: Connection> TracedConn<'_, C> {
    /// Run a parameterless statement (DDL, `DELETE`, `ALTER SEQUENCE`).
    pub async fn execute(&self, sql: &str) -> Result<u64, tokio_postgres::Error> {
        let span = self.span(sql);
        let result = self.conn.execute(sql, &[]).instrument(span.clone()).await;
        finish(&span, result, |affected| *affected)
    }

    /// Run a catalog query.
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, tokio_postgres::Error> {
        let span = self.span(sql);
        let result = self.conn.query(sql, params).instrument(span.clone()).await;
        finish(&span, result, |rows| rows.len() as u64)
    }

    fn span(&self, sql: &str) -> Span {
        tracing::debug_span!(
            "tabula.sql",
            object = %self.object,
            sql = %sql,
            rows = tracing::field::Empty,
            sqlstate = tracing::field::Empty,
        )
    }
}

fn finish<T>(
    span: &Span,
    result: Result<T, tokio_postgres::Error>,
    rows: impl FnOnce(&T) -> u64,
) -> Result<T, tokio_postgres::Error> {
    match &result {
        Ok(value) => {
            span.record("rows", rows(value));
        }
        Err(err) => {
            if let Some(state) = err.code() {
                span.record("sqlstate", state.code());
            }
            tracing::debug!(parent: span, "statement refused: {}", err);
        }
    }
    result
}

/// Attach the object being worked on to a connection's statements.
pub trait ConnectionExt: Connection + Sized {
    /// Trace the following statements as acting on `object`.
    fn on<'a>(&'a self, object: &'a (dyn fmt::Display + Sync)) -> TracedConn<'a, Self> {
        TracedConn { conn: self, object }
    }
}

impl<C: Connection> ConnectionExt for C {}
