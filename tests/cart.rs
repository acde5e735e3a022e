mod common;

use common::{qty, user, Harness};

use opensase_checkout::domain::value_objects::{CartItemId, Money, VariantId};
use opensase_checkout::domain::events::{DomainEvent, InventoryEvent};
use opensase_checkout::services::CartItemUpdate;
use opensase_checkout::store::VariantInfo;
use opensase_checkout::EcommerceError;

fn counters(h: &Harness, id: VariantId) -> (i32, i32) {
    let inv = h.store.inventory(id).unwrap();
    (inv.available(), inv.reserved())
}

#[tokio::test]
async fn add_item_requires_a_catalog_variant() {
    let h = Harness::new();
    let err = h.carts.add_item(user(1), VariantId::new(404), qty(1)).await.unwrap_err();
    assert!(matches!(err, EcommerceError::NotFound { resource: "Variant", .. }));
}

#[tokio::test]
async fn add_item_merges_lines_and_refreshes_price() {
    let h = Harness::new();
    let v = h.store.stock_variant(1, 400, 50).unwrap();

    let first = h.carts.add_item(user(1), v, qty(2)).await.unwrap();
    h.store.set_price(v, Money::from_minor(450).unwrap());
    let merged = h.carts.add_item(user(1), v, qty(3)).await.unwrap();

    assert_eq!(first.id, merged.id);
    assert_eq!(merged.quantity.value(), 5);
    assert_eq!(merged.unit_price.minor_units(), 450);
    let cart = h.carts.get_cart(user(1)).await.unwrap();
    assert_eq!(cart.line_count(), 1);
    assert_eq!(cart.display_total().unwrap().minor_units(), 2_250);
}

#[tokio::test]
async fn add_item_past_the_line_cap_is_rejected() {
    let h = Harness::new();
    let v = h.store.stock_variant(1, 100, 500).unwrap();
    h.carts.add_item(user(1), v, qty(98)).await.unwrap();

    let err = h.carts.add_item(user(1), v, qty(2)).await.unwrap_err();

    assert!(matches!(err, EcommerceError::Validation(_)));
    assert_eq!(h.carts.get_cart(user(1)).await.unwrap().total_quantity(), 98);
}

#[tokio::test]
async fn add_item_checks_net_available_for_the_merged_total() {
    let h = Harness::new();
    let v = h.store.stock_variant(1, 100, 5).unwrap();
    h.carts.add_item(user(1), v, qty(4)).await.unwrap();

    let err = h.carts.add_item(user(1), v, qty(2)).await.unwrap_err();

    assert!(matches!(err, EcommerceError::InsufficientStock { available: 5, requested: 6, .. }));
    assert_eq!(h.carts.get_cart(user(1)).await.unwrap().total_quantity(), 4);
}

#[tokio::test]
async fn cart_changes_never_touch_inventory() {
    let h = Harness::new();
    let v = h.store.stock_variant(1, 100, 10).unwrap();

    let line = h.carts.add_item(user(1), v, qty(3)).await.unwrap();
    h.carts.update_item(user(1), line.id, 7).await.unwrap();
    assert_eq!(counters(&h, v), (10, 0));

    let removed = h.carts.update_item(user(1), line.id, 0).await.unwrap();
    assert_eq!(removed, CartItemUpdate::Removed(line.id));
    assert!(h.carts.get_cart(user(1)).await.unwrap().is_empty());
    assert_eq!(counters(&h, v), (10, 0));
}

#[tokio::test]
async fn update_item_validates_stock_and_ownership() {
    let h = Harness::new();
    let v = h.store.stock_variant(1, 100, 10).unwrap();
    let line = h.carts.add_item(user(1), v, qty(3)).await.unwrap();

    let err = h.carts.update_item(user(1), line.id, 11).await.unwrap_err();
    assert!(matches!(err, EcommerceError::InsufficientStock { .. }));

    let err = h.carts.update_item(user(2), line.id, 1).await.unwrap_err();
    assert!(matches!(err, EcommerceError::NotFound { .. }));
    let err = h.carts.update_item(user(2), line.id, 0).await.unwrap_err();
    assert!(matches!(err, EcommerceError::NotFound { .. }));

    let err = h.carts.update_item(user(1), line.id, 100).await.unwrap_err();
    assert!(matches!(err, EcommerceError::Validation(_)));

    match h.carts.update_item(user(1), line.id, 10).await.unwrap() {
        CartItemUpdate::Updated(updated) => assert_eq!(updated.quantity.value(), 10),
        other => panic!("expected update, got {other:?}"),
    }
}

#[tokio::test]
async fn remove_and_clear() {
    let h = Harness::new();
    let v1 = h.store.stock_variant(1, 100, 10).unwrap();
    let v2 = h.store.stock_variant(2, 100, 10).unwrap();
    let line = h.carts.add_item(user(1), v1, qty(1)).await.unwrap();
    h.carts.add_item(user(1), v2, qty(1)).await.unwrap();

    assert!(matches!(h.carts.remove_item(user(2), line.id).await, Err(EcommerceError::NotFound { .. })));
    h.carts.remove_item(user(1), line.id).await.unwrap();
    assert!(matches!(h.carts.remove_item(user(1), line.id).await, Err(EcommerceError::NotFound { .. })));
    assert!(matches!(h.carts.remove_item(user(1), CartItemId::new(9_999)).await, Err(EcommerceError::NotFound { .. })));

    assert_eq!(h.carts.clear(user(1)).await.unwrap(), 1);
    assert_eq!(h.carts.clear(user(1)).await.unwrap(), 0);
    assert_eq!(h.carts.clear(user(5)).await.unwrap(), 0);
}

#[tokio::test]
async fn advisory_reserve_and_release() {
    let h = Harness::new();
    let v = h.store.stock_variant(1, 100, 10).unwrap();

    assert!(h.inventory.check_availability(v, qty(10)).await.unwrap());
    assert!(h.inventory.reserve(v, qty(7)).await.unwrap());
    assert!(!h.inventory.reserve(v, qty(4)).await.unwrap());
    assert!(!h.inventory.check_availability(v, qty(4)).await.unwrap());
    assert_eq!(counters(&h, v), (10, 7));

    assert!(h.inventory.release(v, qty(20)).await.unwrap());
    assert!(h.inventory.release(v, qty(20)).await.unwrap());
    assert_eq!(counters(&h, v), (10, 0));

    assert!(!h.inventory.release(VariantId::new(77), qty(1)).await.unwrap());
    assert!(!h.inventory.check_availability(VariantId::new(77), qty(1)).await.unwrap());
    assert!(h.events.events().contains(&DomainEvent::Inventory(InventoryEvent::Reserved { variant_id: v, quantity: 7 })));
}

#[tokio::test]
async fn resync_is_validated() {
    let h = Harness::new();
    let v = h.store.stock_variant(1, 100, 10).unwrap();

    assert!(matches!(h.inventory.resync(v, 5, 6).await, Err(EcommerceError::Validation(_))));
    assert!(matches!(h.inventory.resync(v, -1, 0).await, Err(EcommerceError::Validation(_))));
    assert!(matches!(h.inventory.resync(v, 10_001, 0).await, Err(EcommerceError::Validation(_))));
    assert!(matches!(h.inventory.resync(VariantId::new(55), 5, 0).await, Err(EcommerceError::NotFound { .. })));

    let inv = h.inventory.resync(v, 40, 15).await.unwrap();
    assert_eq!((inv.available(), inv.reserved(), inv.net_available()), (40, 15, 25));
    assert_eq!(counters(&h, v), (40, 15));
}

#[tokio::test]
async fn cart_details_carry_catalog_facts() {
    let h = Harness::new();
    let shirt = VariantId::new(11);
    h.store.add_variant(VariantInfo {
        id: shirt,
        sku: "TEE-RED-M".to_string(),
        price: Money::from_minor(1_900).unwrap(),
        attributes: serde_json::json!({ "color": "red", "size": "M" }),
    });
    h.inventory.resync(shirt, 10, 0).await.unwrap();
    let mug = h.store.stock_variant(12, 800, 10).unwrap();

    h.carts.add_item(user(1), shirt, qty(1)).await.unwrap();
    h.carts.add_item(user(1), mug, qty(2)).await.unwrap();
    h.store.delist_variant(mug);

    let details = h.carts.get_cart_details(user(1)).await.unwrap();
    assert_eq!(details.cart.line_count(), 2);
    let info = details.variant(shirt).unwrap();
    assert_eq!(info.sku, "TEE-RED-M");
    assert_eq!(info.attributes["color"], "red");
    assert!(details.variant(mug).is_none());

    let empty = h.carts.get_cart_details(user(2)).await.unwrap();
    assert!(empty.cart.is_empty());
    assert!(empty.variants.is_empty());
}
