//! Create-if-absent for databases.

use crate::db_url::DatabaseUrl;
use crate::ident::quote_ident;
use crate::traced::{ConnectionExt, connect};
use crate::{Error, Result};

/// Make sure the database named in `url` exists, creating it if needed.
///
/// Connects to the server's default database (the same URL with the path
/// cleared), looks the name up in `pg_database` and issues `CREATE DATABASE`
/// when it is missing. The administrative connection is dropped on return.
///
/// The check and the create are not atomic: two concurrent callers can both
/// see the database missing, and the loser gets [`Error::CreateDatabase`].
pub async fn ensure_database_exists(url: &str) -> Result<()> {
    let url = DatabaseUrl::parse(url)?;
    let name = url.database_name();

    let client = connect(&url.admin_url()).await?;

    let existing = client
        .on(&"pg_database")
        .query("SELECT 1 FROM pg_database WHERE datname = $1", &[&name])
        .await
        .map_err(|source| Error::Query {
            what: "checking pg_database",
            source,
        })?;

    if !existing.is_empty() {
        tracing::debug!(database = %name, "database already exists");
        return Ok(());
    }

    let sql = format!("CREATE DATABASE {}", quote_ident(name));
    client
        .on(&name)
        .execute(&sql)
        .await
        .map_err(|source| Error::CreateDatabase {
            name: name.to_string(),
            source,
        })?;

    tracing::info!(database = %name, server = %url, "created database");
    Ok(())
}
