//! SQLite storage
//!
//! A single connection behind a mutex. Every processed packet gets one row in
//! the `packets` table with its final verdict, written in per-batch
//! transactions by [`writer::PersistenceWriter`].

pub mod writer;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

pub use writer::{PersistenceWriter, StoredPacket};

/// Shared handle to the SQLite connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (creating if needed) the database file and ensure the schema
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.init_schema()?;
        info!("Database ready at {}", path.display());
        Ok(db)
    }

    /// In-memory database for tests
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS packets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                src_ip TEXT NOT NULL,
                dest_ip TEXT NOT NULL,
                protocol TEXT NOT NULL,
                length INTEGER NOT NULL,
                flags TEXT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT NOT NULL,
                attack_type TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_packets_timestamp ON packets(timestamp);
            CREATE INDEX IF NOT EXISTS idx_packets_status ON packets(status);",
        )
        .context("failed to initialize schema")?;
        Ok(())
    }

    /// Lock the underlying connection
    ///
    /// Poisoning is recovered: SQLite rolls back an interrupted transaction
    /// on the next statement, so the connection stays usable.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
