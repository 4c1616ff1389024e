use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;

use fleetmon_core::{Host, HostStore, MonitorError};

use crate::db::{execute_async, DbPool};

/// `HostStore` backed by the server's sqlite database; the registry caches in
/// front of this.
pub struct SqliteHostStore {
    pool: DbPool,
}

impl SqliteHostStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_host(row: &rusqlite::Row<'_>) -> rusqlite::Result<Host> {
    Ok(Host {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        port: row.get(3)?,
        secure: row.get::<_, i64>(4)? != 0,
    })
}

fn load_hosts_sync(conn: &Connection) -> Result<Vec<Host>> {
    let mut stmt = conn
        .prepare("SELECT id, name, address, port, secure FROM hosts ORDER BY id")
        .context("Failed to prepare statement")?;

    let hosts = stmt
        .query_map([], row_to_host)
        .context("Failed to query hosts")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to collect hosts")?;

    Ok(hosts)
}

fn save_host_sync(conn: &Connection, mut host: Host) -> Result<Host> {
    if host.id == 0 {
        conn.execute(
            "INSERT INTO hosts (name, address, port, secure) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![host.name, host.address, host.port, host.secure as i64],
        )
        .context("Failed to insert host")?;
        host.id = conn.last_insert_rowid();
    } else {
        conn.execute(
            "INSERT OR REPLACE INTO hosts (id, name, address, port, secure) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![host.id, host.name, host.address, host.port, host.secure as i64],
        )
        .context("Failed to upsert host")?;
    }
    Ok(host)
}

fn delete_host_sync(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM hosts WHERE id = ?1", rusqlite::params![id])
        .context("Failed to delete host")?;
    Ok(())
}

fn store_err(err: anyhow::Error) -> MonitorError {
    MonitorError::Store(err.to_string())
}

#[async_trait]
impl HostStore for SqliteHostStore {
    async fn load_hosts(&self) -> fleetmon_core::Result<Vec<Host>> {
        execute_async(&self.pool, load_hosts_sync)
            .await
            .map_err(store_err)
    }

    async fn save_host(&self, host: &Host) -> fleetmon_core::Result<Host> {
        let host = host.clone();
        execute_async(&self.pool, move |conn| save_host_sync(conn, host))
            .await
            .map_err(store_err)
    }

    async fn delete_host(&self, id: i64) -> fleetmon_core::Result<()> {
        execute_async(&self.pool, move |conn| delete_host_sync(conn, id))
            .await
            .map_err(store_err)
    }
}
