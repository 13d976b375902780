//! Shared harness for service tests

#![allow(dead_code)]

use std::sync::Arc;

use core_kernel::audit::mock::RecordingAuditSink;
use core_kernel::{AuditSink, ClientId, LotId, ShipmentId};
use domain_fx::{ExchangeRateProvider, InMemoryRateStore};
use ledger_service::{LedgerService, ServiceConfig};
use test_utils::{ActorFixtures, LotBuilder, RateFixtures, ShipmentBuilder};

pub struct Harness {
    pub service: Arc<LedgerService>,
    pub rates: Arc<InMemoryRateStore>,
    pub audit: RecordingAuditSink,
}

impl Harness {
    /// Service with the 90 RUB/USD rate and a recording audit sink
    pub fn new() -> Self {
        Self::with_rates(InMemoryRateStore::from_history(RateFixtures::history()))
    }

    /// Service whose rate store starts empty
    pub fn without_rates() -> Self {
        Self::with_rates(InMemoryRateStore::new())
    }

    fn with_rates(store: InMemoryRateStore) -> Self {
        let rates = Arc::new(store);
        let audit = RecordingAuditSink::new();
        let service = service_with(
            ServiceConfig::default(),
            rates.clone(),
            Arc::new(audit.clone()),
        );
        Self {
            service: Arc::new(service),
            rates,
            audit,
        }
    }

    /// Shipment with the 100 m³ / 50,000 RUB scenario lot
    pub async fn scenario_lot(&self) -> (ShipmentId, LotId) {
        let operator = ActorFixtures::operator();
        let shipment = self
            .service
            .create_shipment(ShipmentBuilder::new().build(), &operator)
            .await
            .unwrap()
            .value;
        let lot = self
            .service
            .add_lot(shipment.id, LotBuilder::new().build(), &operator)
            .await
            .unwrap()
            .value;
        (shipment.id, lot.id)
    }

    pub async fn client(&self, name: &str) -> ClientId {
        self.service
            .create_client(name, &ActorFixtures::operator())
            .await
            .unwrap()
            .value
            .id
    }
}

pub fn service_with(
    config: ServiceConfig,
    rates: Arc<dyn ExchangeRateProvider>,
    audit: Arc<dyn AuditSink>,
) -> LedgerService {
    LedgerService::new(config, rates, audit).unwrap()
}
