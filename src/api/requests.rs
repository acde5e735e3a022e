//! Request bodies and query strings. Each one is checked by its `validator`
//! rules first, then converted into typed values.

use serde::Deserialize;
use validator::Validate;

use crate::domain::value_objects::{CurrencyCode, Quantity, UserId, VariantId};
use crate::services::CheckoutCommand;
use crate::Result;

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    #[validate(range(min = 1))]
    pub variant_id: i64,
    #[validate(range(min = 1, max = 99))]
    pub quantity: u32,
}

impl AddItemRequest {
    pub fn into_command(self) -> Result<(VariantId, Quantity)> { Ok((VariantId::new(self.variant_id), Quantity::new(self.quantity)?)) }
}

/// Zero is allowed and removes the line.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(range(max = 99))]
    pub quantity: u32,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(range(min = 1))]
    pub shipping_address_id: Option<i64>,
    #[validate(range(min = 1))]
    pub billing_address_id: Option<i64>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
}

impl CheckoutRequest {
    pub fn into_command(self, user_id: UserId) -> Result<CheckoutCommand> {
        Ok(CheckoutCommand {
            user_id,
            currency: self.currency.map(CurrencyCode::new).transpose()?,
            shipping_address_id: self.shipping_address_id,
            billing_address_id: self.billing_address_id,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuantityRequest {
    #[validate(range(min = 1, max = 99))]
    pub quantity: u32,
}

impl QuantityRequest {
    pub fn quantity(&self) -> Result<Quantity> { Ok(Quantity::new(self.quantity)?) }
}

/// `reserved <= available` is enforced by the inventory service.
#[derive(Debug, Deserialize, Validate)]
pub struct ResyncRequest {
    #[validate(range(min = 0, max = 10000))]
    pub available: i32,
    #[validate(range(min = 0))]
    pub reserved: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AvailabilityQuery {
    #[validate(range(min = 1, max = 99))]
    pub quantity: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub after: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_item_rules() {
        assert!(AddItemRequest { variant_id: 1, quantity: 100 }.validate().is_err());
        assert!(AddItemRequest { variant_id: 0, quantity: 1 }.validate().is_err());
        let (variant, qty) = AddItemRequest { variant_id: 7, quantity: 3 }.into_command().unwrap();
        assert_eq!((variant.value(), qty.value()), (7, 3));
    }

    #[test]
    fn test_checkout_currency_normalized() {
        let req: CheckoutRequest = serde_json::from_str(r#"{"currency":"eur","shipping_address_id":4}"#).unwrap();
        req.validate().unwrap();
        let cmd = req.into_command(UserId::new(2).unwrap()).unwrap();
        assert_eq!(cmd.currency.unwrap().as_str(), "EUR");
        assert_eq!(cmd.shipping_address_id, Some(4));
    }

    #[test]
    fn test_checkout_rejects_bad_currency() {
        let req = CheckoutRequest { currency: Some("E1R".into()), ..Default::default() };
        assert!(req.into_command(UserId::new(2).unwrap()).is_err());
        assert!(CheckoutRequest { currency: Some("EURO".into()), ..Default::default() }.validate().is_err());
    }

    #[test]
    fn test_resync_limits() {
        assert!(ResyncRequest { available: 10_001, reserved: 0 }.validate().is_err());
        assert!(ResyncRequest { available: 5, reserved: -1 }.validate().is_err());
        assert!(ResyncRequest { available: 5, reserved: 5 }.validate().is_ok());
    }
}
