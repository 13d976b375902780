//! Audit sink that writes to the tracing pipeline

use async_trait::async_trait;

use core_kernel::{AuditRecord, AuditSink, DomainPort, PortError};

/// Emits every audit record as an `info` event on the `audit` target
///
/// Used when no external audit store is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl DomainPort for TracingAuditSink {}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), PortError> {
        let after = record
            .after
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        tracing::info!(
            target: "audit",
            audit_id = %record.id,
            actor = %record.actor,
            action = %record.action,
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            after = %after,
            "audit"
        );
        Ok(())
    }
}
