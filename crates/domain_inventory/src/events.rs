//! Domain events emitted by the shipment aggregate
//!
//! Drained by the application service after a successful commit and turned
//! into audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::ShipmentId;

use crate::lifecycle::LifecycleTransition;

/// Significant occurrences in a shipment's life
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShipmentEvent {
    /// Shipment was registered at intake
    Created {
        shipment_id: ShipmentId,
        code: String,
        timestamp: DateTime<Utc>,
    },

    /// Lifecycle state changed
    StateChanged {
        shipment_id: ShipmentId,
        transition: LifecycleTransition,
    },
}

impl ShipmentEvent {
    /// Audit action name for the event
    pub fn action(&self) -> String {
        match self {
            ShipmentEvent::Created { .. } => "shipment.created".to_string(),
            ShipmentEvent::StateChanged { transition, .. } => format!("shipment.{}", transition.to),
        }
    }

    pub fn shipment_id(&self) -> ShipmentId {
        match self {
            ShipmentEvent::Created { shipment_id, .. } => *shipment_id,
            ShipmentEvent::StateChanged { shipment_id, .. } => *shipment_id,
        }
    }
}
