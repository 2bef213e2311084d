//! Deferred Workers
//!
//! One worker per bus topic. Each frame is relayed to the Storage Engine with
//! failover; the outcome is only logged and counted, since the client was
//! answered when the router published the frame. The counters are reported
//! every `STATS_INTERVAL` and whenever the subscription drops.

use crate::bus::{BusSubscriber, Frame, Topic};
use crate::failover::{Delivery, Failover, Origin};
use crate::protocol::WorkerIntent;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
pub struct WorkerStats {
    pub applied: AtomicU64,
    pub rejected: AtomicU64,
    pub undelivered: AtomicU64,
}

impl WorkerStats {
    fn record(&self, delivery: &Delivery) {
        let counter = match (delivery.origin, delivery.result.ok) {
            (Origin::None, _) => &self.undelivered,
            (_, true) => &self.applied,
            (_, false) => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for WorkerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "applied={} rejected={} undelivered={}",
            self.applied.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.undelivered.load(Ordering::Relaxed)
        )
    }
}

pub struct DeferredWorker {
    topic: Topic,
    failover: Failover,
    stats: Arc<WorkerStats>,
}

impl DeferredWorker {
    pub fn new(topic: Topic, failover: Failover) -> Self {
        Self {
            topic,
            failover,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Applies one frame. The frame's own action is ignored: a worker only
    /// ever applies the kind of its topic.
    pub async fn handle_frame(&self, frame: Frame) -> Delivery {
        let intent = WorkerIntent {
            kind: self.topic.kind(),
            ..frame.intent
        };

        let delivery = self.failover.deliver(&intent).await;
        self.stats.record(&delivery);

        if delivery.origin == Origin::None {
            tracing::error!(
                "{} {} {} lost: {}",
                intent.kind,
                intent.book_code,
                intent.borrower,
                delivery.result.mensaje
            );
        } else {
            tracing::info!(
                "{} {} {} answered by {}: {}",
                intent.kind,
                intent.book_code,
                intent.borrower,
                delivery.origin,
                delivery.result.mensaje
            );
        }

        delivery
    }

    /// Subscribes to the bus and processes frames forever, reconnecting
    /// whenever the publisher goes away.
    pub async fn run(self, bus_addr: SocketAddr) {
        let mut report = tokio::time::interval(STATS_INTERVAL);
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);
        report.tick().await;

        loop {
            let mut subscriber = match BusSubscriber::connect(bus_addr, &[self.topic]).await {
                Ok(subscriber) => subscriber,
                Err(e) => {
                    tracing::warn!("{} worker cannot reach bus: {:#}", self.topic, e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };
            tracing::info!("{} worker subscribed at {}", self.topic, bus_addr);

            loop {
                tokio::select! {
                    _ = report.tick() => {
                        tracing::info!("{} worker stats: {}", self.topic, self.stats);
                    }
                    received = subscriber.recv() => match received {
                        Ok(Some(frame)) if frame.topic == self.topic => {
                            self.handle_frame(frame).await;
                        }
                        Ok(Some(frame)) => {
                            tracing::warn!("{} worker ignoring {} frame", self.topic, frame.topic);
                        }
                        Ok(None) => {
                            tracing::warn!("Bus at {} closed the subscription", bus_addr);
                            break;
                        }
                        Err(e) => {
                            tracing::warn!("Bus read failed: {:#}", e);
                            break;
                        }
                    },
                }
            }

            tracing::info!("{} worker stats: {}", self.topic, self.stats);
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
}
