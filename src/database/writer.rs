//! Batched packet persistence
//!
//! One row per processed packet, inserted inside an explicit transaction per
//! batch. Rows are written after scoring, so every row carries its final
//! status, reason and attack type.

use anyhow::{bail, Context, Result};
use rusqlite::params;
use tracing::debug;

use crate::batch::PendingItem;
use crate::detect::Decision;
use super::Database;

/// A persisted packet row, as read back by the query helpers
#[derive(Debug, Clone)]
pub struct StoredPacket {
    pub timestamp: String,
    pub src_ip: String,
    pub dest_ip: String,
    pub protocol: String,
    pub length: u32,
    pub flags: String,
    pub status: String,
    pub reason: String,
    pub attack_type: String,
}

/// Writes scored batches to the `packets` table
pub struct PersistenceWriter {
    db: Database,
}

impl PersistenceWriter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a scored batch, one row per item
    ///
    /// Items and decisions must be parallel slices. The whole batch goes into
    /// a single transaction; on error nothing from the batch is kept. Returns
    /// the number of rows written.
    pub fn record_batch(&self, items: &[PendingItem], decisions: &[Decision]) -> Result<usize> {
        if items.len() != decisions.len() {
            bail!(
                "batch has {} items but {} decisions",
                items.len(),
                decisions.len()
            );
        }
        if items.is_empty() {
            return Ok(0);
        }

        let conn = self.db.lock();
        conn.execute_batch("BEGIN TRANSACTION")
            .context("failed to begin transaction")?;

        let insert = || -> Result<()> {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO packets (timestamp, src_ip, dest_ip, protocol, length, flags, status, reason, attack_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (item, decision) in items.iter().zip(decisions) {
                stmt.execute(params![
                    item.timestamp.to_rfc3339(),
                    item.src_ip.to_string(),
                    item.dst_ip.to_string(),
                    item.protocol.to_string(),
                    item.length,
                    item.flags.to_string(),
                    decision.status.to_string(),
                    decision.reason,
                    decision.attack_label,
                ])?;
            }
            Ok(())
        };

        match insert() {
            Ok(()) => {
                conn.execute_batch("COMMIT")
                    .context("failed to commit batch")?;
                debug!("Persisted batch of {} packets", items.len());
                Ok(items.len())
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e.context("failed to persist batch"))
            }
        }
    }

    /// Total rows in the packets table
    pub fn count_packets(&self) -> Result<i64> {
        let conn = self.db.lock();
        conn.query_row("SELECT COUNT(*) FROM packets", [], |row| row.get(0))
            .context("failed to count packets")
    }

    /// Most recent confirmed anomalies, newest first
    pub fn recent_anomalies(&self, limit: usize) -> Result<Vec<StoredPacket>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT timestamp, src_ip, dest_ip, protocol, length, flags, status, reason, attack_type
             FROM packets WHERE status = 'Anomaly'
             ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(StoredPacket {
                    timestamp: row.get(0)?,
                    src_ip: row.get(1)?,
                    dest_ip: row.get(2)?,
                    protocol: row.get(3)?,
                    length: row.get(4)?,
                    flags: row.get(5)?,
                    status: row.get(6)?,
                    reason: row.get(7)?,
                    attack_type: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to read anomalies")?;
        Ok(rows)
    }
}
