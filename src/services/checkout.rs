//! Checkout: turns a user's cart into an order in one all-or-nothing unit.
//!
//! ```text
//! Idle -> Validating -> Reserving -> OrderCreated -> CartCleared -> Committed
//!   \__________\____________\______________\_____________\-> Aborted
//! ```
//!
//! Row locks are taken cart first, then inventory in ascending variant
//! order, so two checkouts touching overlapping variants never deadlock.
//! Stock is validated against the locked rows only.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::aggregates::{NewOrder, NewOrderLine, Order, VariantInventory};
use crate::domain::events::{DomainEvent, InventoryEvent};
use crate::domain::value_objects::{CurrencyCode, UserId};
use crate::publisher::{publish_all, EventPublisher};
use crate::store::{CheckoutStore, CheckoutTransaction};
use crate::{EcommerceError, Result};

#[derive(Clone, Debug)]
pub struct CheckoutSettings {
    /// Upper bound on locking and staging the whole checkout.
    pub checkout_timeout: Duration,
    /// Upper bound on waiting for any single row lock.
    pub lock_timeout: Duration,
    pub default_currency: CurrencyCode,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self { checkout_timeout: Duration::from_secs(5), lock_timeout: Duration::from_secs(2), default_currency: CurrencyCode::usd() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutCommand {
    pub user_id: UserId,
    /// Falls back to the configured default currency.
    pub currency: Option<CurrencyCode>,
    pub shipping_address_id: Option<i64>,
    pub billing_address_id: Option<i64>,
}

impl CheckoutCommand {
    pub fn for_user(user_id: UserId) -> Self {
        Self { user_id, currency: None, shipping_address_id: None, billing_address_id: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckoutState {
    Idle,
    Validating,
    Reserving,
    OrderCreated,
    CartCleared,
    Committed,
    Aborted,
}

impl fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Reserving => "reserving",
            Self::OrderCreated => "order_created",
            Self::CartCleared => "cart_cleared",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

fn enter(state: &mut CheckoutState, next: CheckoutState) {
    tracing::debug!(from = %state, to = %next, "checkout state");
    *state = next;
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn CheckoutStore>,
    events: Arc<dyn EventPublisher>,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn CheckoutStore>, events: Arc<dyn EventPublisher>, settings: CheckoutSettings) -> Self {
        Self { store, events, settings }
    }

    pub fn settings(&self) -> &CheckoutSettings { &self.settings }

    pub async fn checkout(&self, command: CheckoutCommand) -> Result<Order> {
        let user = command.user_id;
        let span = tracing::info_span!("checkout", user_id = %user, checkout_id = %Uuid::now_v7());
        self.checkout_as(user, command).instrument(span).await
    }

    async fn checkout_as(&self, user: UserId, command: CheckoutCommand) -> Result<Order> {
        let mut state = CheckoutState::Idle;
        let mut tx = self.store.begin_checkout(self.settings.lock_timeout).await?;

        let staged = tokio::time::timeout(self.settings.checkout_timeout, self.stage(tx.as_mut(), user, &command, &mut state)).await;
        let order = match staged {
            Ok(Ok(order)) => order,
            Ok(Err(e)) => return Err(abort(tx, &mut state, e).await),
            Err(_) => {
                let e = EcommerceError::Conflict(format!("checkout did not finish within {}ms", self.settings.checkout_timeout.as_millis()));
                return Err(abort(tx, &mut state, e).await);
            }
        };

        if let Err(e) = tx.commit().await {
            enter(&mut state, CheckoutState::Aborted);
            tracing::error!(error = %e, "checkout commit failed");
            return Err(e);
        }
        enter(&mut state, CheckoutState::Committed);
        tracing::info!(order_id = %order.id(), total = order.total().minor_units(), items = order.item_count(), "order placed");

        let mut events = Vec::with_capacity(order.item_count() + 1);
        events.push(order.placed_event());
        events.extend(order.lines().iter().map(|line| {
            DomainEvent::Inventory(InventoryEvent::Claimed { variant_id: line.variant_id, quantity: line.quantity.value(), order_id: order.id() })
        }));
        publish_all(self.events.as_ref(), &events).await;
        Ok(order)
    }

    /// Every step short of commit. Any error leaves the transaction to be rolled back.
    async fn stage(&self, tx: &mut dyn CheckoutTransaction, user: UserId, command: &CheckoutCommand, state: &mut CheckoutState) -> Result<Order> {
        enter(state, CheckoutState::Validating);
        let lines = tx.lock_cart_lines(user).await?;
        if lines.is_empty() {
            return Err(EcommerceError::EmptyCart);
        }

        let mut priced = Vec::with_capacity(lines.len());
        for line in &lines {
            let net_available = line.inventory.as_ref().map_or(0, VariantInventory::net_available);
            if i64::from(line.quantity.value()) > net_available {
                return Err(EcommerceError::InsufficientStock { variant_id: line.variant_id, available: net_available, requested: line.quantity.value() });
            }
            let price = line.unit_price.ok_or_else(|| EcommerceError::not_found("Variant", line.variant_id))?;
            priced.push(NewOrderLine::price(line.variant_id, price, line.quantity)?);
        }

        enter(state, CheckoutState::Reserving);
        for line in &lines {
            if !tx.claim_stock(line.variant_id, line.quantity).await? {
                let available = line.inventory.as_ref().map_or(0, VariantInventory::net_available);
                return Err(EcommerceError::InsufficientStock { variant_id: line.variant_id, available, requested: line.quantity.value() });
            }
        }

        let currency = command.currency.clone().unwrap_or_else(|| self.settings.default_currency.clone());
        let new_order = NewOrder::new(user, currency, command.shipping_address_id, command.billing_address_id, priced)?;
        let order = tx.insert_order(new_order).await?;
        enter(state, CheckoutState::OrderCreated);

        tx.clear_cart(user).await?;
        enter(state, CheckoutState::CartCleared);
        Ok(order)
    }
}

async fn abort(tx: Box<dyn CheckoutTransaction>, state: &mut CheckoutState, error: EcommerceError) -> EcommerceError {
    let failed_in = *state;
    enter(state, CheckoutState::Aborted);
    if let Err(e) = tx.rollback().await {
        tracing::error!(error = %e, "checkout rollback failed");
    }
    match &error {
        EcommerceError::Conflict(_) => tracing::warn!(%failed_in, error = %error, "checkout aborted"),
        EcommerceError::Storage(_) => tracing::error!(%failed_in, error = %error, "checkout aborted"),
        _ => tracing::info!(%failed_in, error = %error, "checkout rejected"),
    }
    error
}
