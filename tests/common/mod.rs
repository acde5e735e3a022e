#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use opensase_checkout::domain::events::DomainEvent;
use opensase_checkout::domain::value_objects::{Quantity, UserId};
use opensase_checkout::publisher::EventPublisher;
use opensase_checkout::services::{CartService, CheckoutService, CheckoutSettings, InventoryService, OrderService};
use opensase_checkout::store::MemoryStore;

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<DomainEvent> { self.events.lock().unwrap().clone() }

    pub fn subjects(&self) -> Vec<&'static str> { self.events().iter().map(DomainEvent::subject).collect() }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub inventory: InventoryService,
    pub events: Arc<RecordingPublisher>,
}

impl Harness {
    pub fn new() -> Self { Self::with_settings(CheckoutSettings::default()) }

    pub fn with_settings(settings: CheckoutSettings) -> Self {
        let store = MemoryStore::new();
        let shared = Arc::new(store.clone());
        let events = Arc::new(RecordingPublisher::default());
        Self {
            carts: CartService::new(shared.clone(), shared.clone(), shared.clone()),
            checkout: CheckoutService::new(shared.clone(), events.clone(), settings),
            orders: OrderService::new(shared.clone(), events.clone()),
            inventory: InventoryService::new(shared.clone(), shared, events.clone()),
            store,
            events,
        }
    }
}

pub fn user(id: i64) -> UserId { UserId::new(id).unwrap() }

pub fn qty(n: u32) -> Quantity { Quantity::new(n).unwrap() }
