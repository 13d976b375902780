//! Audit sink port
//!
//! Every committed mutation produces an [`AuditRecord`]. Recording is
//! fire-and-forget from the core's perspective: a failing sink never rolls
//! back the operation, the caller just receives a warning.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::AuditEventId;
use crate::ports::{DomainPort, PortError};

/// One entry for the audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditEventId,
    /// Actor identifier from the identity context
    pub actor: String,
    /// Action name, e.g. `dispatch_sale`
    pub action: String,
    /// Entity type, e.g. `lot`
    pub entity_type: String,
    /// Display form of the entity identifier
    pub entity_id: String,
    /// Serialized state before the change, if any
    pub before: Option<serde_json::Value>,
    /// Serialized state after the change, if any
    pub after: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Creates a record without state snapshots
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl ToString,
    ) -> Self {
        Self {
            id: AuditEventId::new(),
            actor: actor.into(),
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            before: None,
            after: None,
            recorded_at: Utc::now(),
        }
    }

    /// Attaches the serialized state before the change
    pub fn with_before<T: Serialize>(mut self, before: &T) -> Self {
        self.before = serde_json::to_value(before).ok();
        self
    }

    /// Attaches the serialized state after the change
    pub fn with_after<T: Serialize>(mut self, after: &T) -> Self {
        self.after = serde_json::to_value(after).ok();
        self
    }
}

/// Destination for audit records
#[async_trait]
pub trait AuditSink: DomainPort {
    /// Stores one audit record
    async fn record(&self, record: AuditRecord) -> Result<(), PortError>;
}

/// In-memory sinks for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Keeps every record it receives
    #[derive(Debug, Default, Clone)]
    pub struct RecordingAuditSink {
        records: Arc<RwLock<Vec<AuditRecord>>>,
    }

    impl RecordingAuditSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Returns a copy of everything recorded so far
        pub async fn records(&self) -> Vec<AuditRecord> {
            self.records.read().await.clone()
        }

        /// Returns the actions recorded so far, in order
        pub async fn actions(&self) -> Vec<String> {
            self.records
                .read()
                .await
                .iter()
                .map(|r| r.action.clone())
                .collect()
        }
    }

    impl DomainPort for RecordingAuditSink {}

    #[async_trait]
    impl AuditSink for RecordingAuditSink {
        async fn record(&self, record: AuditRecord) -> Result<(), PortError> {
            self.records.write().await.push(record);
            Ok(())
        }
    }

    /// Rejects every record
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FailingAuditSink;

    impl DomainPort for FailingAuditSink {}

    #[async_trait]
    impl AuditSink for FailingAuditSink {
        async fn record(&self, _record: AuditRecord) -> Result<(), PortError> {
            Err(PortError::Rejected {
                service: "audit".to_string(),
                reason: "sink is closed".to_string(),
            })
        }
    }
}
