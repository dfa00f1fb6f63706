//! Alert fan-out
//!
//! Confirmed anomalies whose attack type is on the allow list become alert
//! notifications, pushed onto a bounded queue and delivered by a background
//! worker. Delivery is strictly best-effort: a full queue or a failed webhook
//! never blocks or fails packet processing.

use std::net::IpAddr;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::batch::PendingItem;
use crate::detect::{Decision, Status};

fn default_allow_list() -> Vec<String> {
    ["DoS", "DDoS", "PortScan", "Infiltration", "Bot", "Web Attack"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_queue_size() -> usize {
    256
}

fn default_timeout_secs() -> u64 {
    5
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Attack types (exact labels or label prefixes) that produce alerts
    #[serde(default = "default_allow_list")]
    pub allow_list: Vec<String>,
    /// Webhook endpoint; `None` disables delivery but keeps filtering/logging
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Per-request delivery timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bounded queue capacity between the pipeline and the worker
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            allow_list: default_allow_list(),
            webhook_url: None,
            timeout_secs: default_timeout_secs(),
            queue_size: default_queue_size(),
        }
    }
}

/// One outbound alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub attack_type: String,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub reason: String,
}

/// Delivery backend for the alert worker
pub trait AlertSink: Send + 'static {
    fn deliver(&self, alert: &AlertNotification) -> anyhow::Result<()>;
}

/// JSON POST to a webhook endpoint
pub struct WebhookSink {
    agent: ureq::Agent,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self { agent, url }
    }
}

impl AlertSink for WebhookSink {
    fn deliver(&self, alert: &AlertNotification) -> anyhow::Result<()> {
        self.agent
            .post(&self.url)
            .send_json(serde_json::to_value(alert)?)?;
        Ok(())
    }
}

/// Filters decisions and hands matching alerts to a background worker
pub struct AlertDispatcher {
    allow_list: Vec<String>,
    tx: Option<Sender<AlertNotification>>,
    worker: Option<JoinHandle<()>>,
}

impl AlertDispatcher {
    /// Dispatcher with the configured webhook sink (or log-only when unset)
    pub fn new(config: &AlertConfig) -> Self {
        match &config.webhook_url {
            Some(url) => {
                let sink = WebhookSink::new(url.clone(), Duration::from_secs(config.timeout_secs));
                Self::with_sink(config, sink)
            }
            None => {
                info!("No webhook configured; alerts are log-only");
                Self {
                    allow_list: config.allow_list.clone(),
                    tx: None,
                    worker: None,
                }
            }
        }
    }

    /// Dispatcher backed by an arbitrary sink
    pub fn with_sink<S: AlertSink>(config: &AlertConfig, sink: S) -> Self {
        let (tx, rx) = bounded::<AlertNotification>(config.queue_size);
        let worker = std::thread::spawn(move || {
            for alert in rx.iter() {
                if let Err(e) = sink.deliver(&alert) {
                    warn!("Alert {} delivery failed: {:#}", alert.id, e);
                }
            }
        });

        Self {
            allow_list: config.allow_list.clone(),
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Dispatcher whose queue drains into a test-held receiver
    pub fn with_channel(config: &AlertConfig) -> (Self, Receiver<AlertNotification>) {
        let (tx, rx) = bounded::<AlertNotification>(config.queue_size);
        let dispatcher = Self {
            allow_list: config.allow_list.clone(),
            tx: Some(tx),
            worker: None,
        };
        (dispatcher, rx)
    }

    /// Enqueue an alert if the decision warrants one
    ///
    /// Returns whether a notification was produced. Non-anomalies and attack
    /// types off the allow list are silently skipped; a full queue drops the
    /// alert with a warning.
    pub fn maybe_alert(&self, item: &PendingItem, decision: &Decision) -> bool {
        if decision.status != Status::Anomaly {
            return false;
        }
        if !self.allows(&decision.attack_label) {
            debug!("Anomaly {:?} not on the alert allow list", decision.attack_label);
            return false;
        }

        let alert = AlertNotification {
            id: Uuid::new_v4(),
            timestamp: item.timestamp,
            attack_type: decision.attack_label.clone(),
            src_ip: item.src_ip,
            dst_ip: item.dst_ip,
            reason: decision.reason.clone(),
        };
        info!(
            "ALERT {}: {} from {} to {}",
            alert.id, alert.attack_type, alert.src_ip, alert.dst_ip
        );

        if let Some(tx) = &self.tx {
            match tx.try_send(alert) {
                Ok(()) => {}
                Err(TrySendError::Full(dropped)) => {
                    warn!("Alert queue full, dropping alert {}", dropped.id);
                }
                Err(TrySendError::Disconnected(dropped)) => {
                    warn!("Alert worker gone, dropping alert {}", dropped.id);
                }
            }
        }
        true
    }

    /// Exact match or label-prefix match against the allow list
    fn allows(&self, attack_type: &str) -> bool {
        self.allow_list
            .iter()
            .any(|entry| attack_type == entry || attack_type.starts_with(entry.as_str()))
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
