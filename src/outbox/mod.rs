//! Outbox module
//!
//! Durable queue of not-yet-published ledger events. The ledger core only
//! appends rows inside its unit of work; the dispatcher here is a separate
//! component that publishes them to a message bus with at-least-once
//! delivery and stamps `published_at` afterwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::LedgerEvent;
use crate::store::{OutboxStore, StoreError};

/// Outbox row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Build an unpublished row for a ledger event
    pub fn from_event(event: &LedgerEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            aggregate_type: event.aggregate_type().to_string(),
            aggregate_id: event.aggregate_id(),
            event_type: event.event_type().to_string(),
            payload: serde_json::to_value(event)?,
            created_at: Utc::now(),
            published_at: None,
        })
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    /// Decode the payload back into the ledger event
    pub fn event(&self) -> Result<LedgerEvent, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

// =========================================================================
// Message bus
// =========================================================================

#[derive(Debug, thiserror::Error)]
#[error("Message bus rejected event: {0}")]
pub struct BusError(pub String);

/// Downstream message bus
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), BusError>;
}

/// Bus that writes each event to the log
#[derive(Debug, Clone, Default)]
pub struct TracingMessageBus;

#[async_trait]
impl MessageBus for TracingMessageBus {
    async fn publish(&self, event: &OutboxEvent) -> Result<(), BusError> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            aggregate_type = %event.aggregate_type,
            aggregate_id = %event.aggregate_id,
            payload = %event.payload,
            "Published ledger event"
        );
        Ok(())
    }
}

// =========================================================================
// Dispatcher
// =========================================================================

/// Result of one dispatch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub fetched: usize,
    pub published: usize,
}

/// Polls the outbox and forwards events to the bus
#[derive(Clone)]
pub struct OutboxDispatcher {
    store: Arc<dyn OutboxStore>,
    bus: Arc<dyn MessageBus>,
    batch_size: i64,
}

impl OutboxDispatcher {
    pub fn new(store: Arc<dyn OutboxStore>, bus: Arc<dyn MessageBus>, batch_size: i64) -> Self {
        Self {
            store,
            bus,
            batch_size,
        }
    }

    /// Publish one batch in creation order.
    ///
    /// An event is marked published only after the bus accepted it. A bus
    /// failure stops the batch; the remaining events wait for the next poll.
    pub async fn dispatch_batch(&self) -> Result<DispatchReport, StoreError> {
        let events = self.store.fetch_unpublished(self.batch_size).await?;
        let mut report = DispatchReport {
            fetched: events.len(),
            published: 0,
        };

        for event in &events {
            if let Err(e) = self.bus.publish(event).await {
                tracing::warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Outbox publish failed, retrying on next poll: {}",
                    e
                );
                break;
            }

            self.store.mark_published(&[event.id], Utc::now()).await?;
            report.published += 1;
        }

        if report.published > 0 {
            tracing::debug!(
                fetched = report.fetched,
                published = report.published,
                "Outbox batch dispatched"
            );
        }

        Ok(report)
    }

    /// Remove published events older than `retention`
    pub async fn purge(&self, retention: chrono::Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - retention;
        let purged = self.store.purge_published(cutoff).await?;
        if purged > 0 {
            tracing::info!(purged, %cutoff, "Purged published outbox events");
        }
        Ok(purged)
    }
}
