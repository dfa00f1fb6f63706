//! Packet-to-verdict orchestration
//!
//! Single-threaded, packet-at-a-time pipeline: flow tracking, batching,
//! scoring, alerting and persistence run serially in the caller's session.
//! A scoring failure drops the batch and keeps the session alive; the only
//! startup-fatal conditions are artifact and database failures.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::alert::AlertDispatcher;
use crate::batch::{Batch, BatchAccumulator, PendingItem};
use crate::config::Config;
use crate::core::PacketRecord;
use crate::database::{Database, PersistenceWriter};
use crate::detect::{ArtifactBundle, DetectionEngine, Status};
use crate::flow::FlowTracker;

/// Cumulative pipeline counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub packets_seen: u64,
    pub non_ip_dropped: u64,
    pub batches_scored: u64,
    pub batches_failed: u64,
    pub anomalies_confirmed: u64,
    pub alerts_sent: u64,
    pub rows_persisted: u64,
}

/// The end-to-end processing pipeline
pub struct Pipeline {
    tracker: FlowTracker,
    accumulator: BatchAccumulator,
    engine: DetectionEngine,
    dispatcher: AlertDispatcher,
    writer: PersistenceWriter,
    stats: PipelineStats,
}

impl Pipeline {
    /// Assemble the pipeline from validated artifacts and an open database
    pub fn new(config: &Config, artifacts: Arc<ArtifactBundle>, db: Database) -> Self {
        let dispatcher = AlertDispatcher::new(&config.alerts);
        Self::assemble(config, artifacts, db, dispatcher)
    }

    /// Pipeline with a caller-supplied dispatcher (tests)
    pub fn with_dispatcher(
        config: &Config,
        artifacts: Arc<ArtifactBundle>,
        db: Database,
        dispatcher: AlertDispatcher,
    ) -> Self {
        Self::assemble(config, artifacts, db, dispatcher)
    }

    fn assemble(
        config: &Config,
        artifacts: Arc<ArtifactBundle>,
        db: Database,
        dispatcher: AlertDispatcher,
    ) -> Self {
        info!(
            "Pipeline ready ({} classes, batch size {})",
            artifacts.labels.len(),
            config.batch.max_size
        );
        Self {
            tracker: FlowTracker::new(config.flow.clone()),
            accumulator: BatchAccumulator::new(config.batch.clone()),
            engine: DetectionEngine::new(artifacts),
            dispatcher,
            writer: PersistenceWriter::new(db),
            stats: PipelineStats::default(),
        }
    }

    /// Feed one packet through the pipeline
    ///
    /// Runs to completion before returning: if this packet triggers a flush,
    /// the whole batch is scored, alerted on and persisted synchronously.
    pub fn handle_packet(&mut self, pkt: &PacketRecord) {
        self.stats.packets_seen += 1;

        let features = match self.tracker.observe(pkt) {
            Some(features) => features,
            None => {
                self.stats.non_ip_dropped += 1;
                return;
            }
        };

        let (src_ip, dst_ip) = match (pkt.src_ip, pkt.dst_ip) {
            (Some(src), Some(dst)) => (src, dst),
            _ => return,
        };

        let item = PendingItem {
            features,
            src_ip,
            dst_ip,
            protocol: pkt.protocol,
            length: pkt.raw_len,
            flags: pkt.flags(),
            timestamp: pkt.timestamp,
        };

        if let Some(batch) = self.accumulator.add(item) {
            self.process_batch(batch);
        }
    }

    /// Drain and score whatever is buffered (shutdown path)
    pub fn flush_now(&mut self) {
        if let Some(batch) = self.accumulator.force_flush() {
            self.process_batch(batch);
        }
    }

    fn process_batch(&mut self, batch: Batch) {
        let decisions = match self.engine.score(&batch) {
            Ok(decisions) => decisions,
            Err(e) => {
                self.stats.batches_failed += 1;
                warn!("Dropping batch of {}: {}", batch.len(), e);
                return;
            }
        };
        self.stats.batches_scored += 1;

        for (item, decision) in batch.iter().zip(&decisions) {
            if decision.status == Status::Anomaly {
                self.stats.anomalies_confirmed += 1;
            }
            if self.dispatcher.maybe_alert(item, decision) {
                self.stats.alerts_sent += 1;
            }
        }

        // Persistence failure loses this batch's rows but not the session
        match self.writer.record_batch(&batch, &decisions) {
            Ok(rows) => self.stats.rows_persisted += rows as u64,
            Err(e) => error!("Failed to persist batch: {:#}", e),
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn tracker(&self) -> &FlowTracker {
        &self.tracker
    }

    pub fn writer(&self) -> &PersistenceWriter {
        &self.writer
    }
}
