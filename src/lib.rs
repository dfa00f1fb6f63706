//! Real-time network-flow classification
//!
//! Packets come in already parsed, get aggregated into bidirectional flows,
//! batched, and scored by a two-stage detector: an isolation forest flags
//! statistically novel traffic, then a gradient-boosted classifier attributes
//! an attack type with per-class confidence gating. Confirmed anomalies fan
//! out to a webhook and every packet verdict lands in SQLite.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use packeteye::config::Config;
//! use packeteye::database::Database;
//! use packeteye::detect::ArtifactBundle;
//! use packeteye::pipeline::Pipeline;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load(Path::new("config.toml"))?;
//! let artifacts = Arc::new(ArtifactBundle::load(&config.artifacts.dir)?);
//! let db = Database::open(&config.database.path)?;
//! let mut pipeline = Pipeline::new(&config, artifacts, db);
//! // pipeline.handle_packet(&pkt) for every captured packet
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod batch;
pub mod config;
pub mod core;
pub mod database;
pub mod detect;
pub mod flow;
pub mod pipeline;

pub use crate::alert::{AlertConfig, AlertDispatcher, AlertNotification};
pub use crate::batch::{Batch, BatchAccumulator, BatchConfig, PendingItem};
pub use crate::config::Config;
pub use crate::core::{IpProtocol, PacketRecord, TcpFlags};
pub use crate::database::{Database, PersistenceWriter};
pub use crate::detect::{ArtifactBundle, Decision, DetectionEngine, Status};
pub use crate::flow::{FeatureVector, FlowTracker};
pub use crate::pipeline::{Pipeline, PipelineStats};
