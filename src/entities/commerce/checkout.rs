use super::line_item::{subtotal, LineItem};
use super::order::PaymentMethod;
use crate::errors::ServiceError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

const MIN_PHONE_DIGITS: usize = 8;
const MAX_PHONE_DIGITS: usize = 15;

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

fn validate_phone(value: &str) -> Result<(), ValidationError> {
    validate_not_blank(value)?;

    let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '.' | '(' | ')');
    let digits = value.chars().filter(char::is_ascii_digit).count();
    if !value.trim().chars().all(allowed) || !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits)
    {
        let mut err = ValidationError::new("phone");
        err.message = Some("must be a phone number of 8 to 15 digits".into());
        return Err(err);
    }
    Ok(())
}

/// Who receives the parcel and where.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Receiver {
    #[validate(custom = "validate_not_blank")]
    pub name: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
    #[validate(custom = "validate_not_blank")]
    pub address: String,
}

impl Receiver {
    pub fn new(name: &str, phone: &str, address: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            phone: phone.trim().to_string(),
            address: address.trim().to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Entry of the flat shipping fee table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingOption {
    pub id: String,
    pub label: String,
    pub fee: Decimal,
}

/// Checkout states, in the only order they can be completed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckoutStep {
    AddressEntry,
    ShippingSelect,
    CouponOptional,
    PaymentSelect,
    ReadyToSubmit,
}

/// A finalized, not yet submitted order.
///
/// Holds `total_amount = subtotal + shipping_fee - discount` with
/// `0 <= discount <= subtotal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDraft {
    pub items: Vec<LineItem>,
    pub receiver: Receiver,
    pub shipping_fee: Decimal,
    pub coupon_code: Option<String>,
    pub discount: Decimal,
    pub payment_method: PaymentMethod,
    pub note: String,
    pub total_amount: Decimal,
    /// Reused when the same draft is resubmitted so the server can
    /// deduplicate order creation.
    pub idempotency_key: Uuid,
}

impl CheckoutDraft {
    pub fn new(
        items: Vec<LineItem>,
        receiver: Receiver,
        shipping_fee: Decimal,
        coupon_code: Option<String>,
        discount: Decimal,
        payment_method: PaymentMethod,
        note: String,
    ) -> Result<Self, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }
        receiver.validate()?;
        if shipping_fee <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "A shipping method must be selected".to_string(),
            ));
        }

        let subtotal = subtotal(&items);
        if discount.is_sign_negative() || discount > subtotal {
            return Err(ServiceError::ValidationError(format!(
                "Discount {} must be between 0 and the order subtotal {}",
                discount, subtotal
            )));
        }

        Ok(Self {
            total_amount: subtotal + shipping_fee - discount,
            items,
            receiver,
            shipping_fee,
            coupon_code,
            discount,
            payment_method,
            note,
            idempotency_key: Uuid::new_v4(),
        })
    }

    pub fn subtotal(&self) -> Decimal {
        subtotal(&self.items)
    }

    pub fn expected_total(&self) -> Decimal {
        self.subtotal() + self.shipping_fee - self.discount
    }

    /// Guards against drafts whose fields were edited after construction.
    pub fn verify_totals(&self) -> Result<(), ServiceError> {
        if self.discount.is_sign_negative() || self.discount > self.subtotal() {
            return Err(ServiceError::ValidationError(
                "Discount exceeds the order subtotal".to_string(),
            ));
        }
        if self.total_amount != self.expected_total() {
            return Err(ServiceError::ValidationError(format!(
                "Draft total {} does not match computed total {}",
                self.total_amount,
                self.expected_total()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::commerce::{LineData, VariantKey};
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn items() -> Vec<LineItem> {
        vec![LineItem::new(
            "p1",
            VariantKey::new("M", None),
            LineData {
                name: "Tee".into(),
                unit_price: dec!(100000),
                image_ref: None,
            },
            2,
        )]
    }

    fn receiver() -> Receiver {
        Receiver::new("Lan Nguyen", "0901 234 567", "12 Hang Bai, Hanoi")
    }

    #[rstest]
    #[case("", "0901234567", "Hanoi")]
    #[case("Lan", "   ", "Hanoi")]
    #[case("Lan", "0901234567", "")]
    #[case("Lan", "call me", "Hanoi")]
    #[case("Lan", "123", "Hanoi")]
    fn incomplete_receivers_are_rejected(
        #[case] name: &str,
        #[case] phone: &str,
        #[case] address: &str,
    ) {
        assert!(!Receiver::new(name, phone, address).is_complete());
    }

    #[test]
    fn complete_receiver_passes() {
        assert!(receiver().is_complete());
        assert!(Receiver::new("Lan", "+84 (90) 123-4567", "Hanoi").is_complete());
    }

    #[test]
    fn draft_computes_total() {
        let draft = CheckoutDraft::new(
            items(),
            receiver(),
            dec!(20000),
            Some("SUMMER10".into()),
            dec!(15000),
            PaymentMethod::Cash,
            String::new(),
        )
        .expect("valid draft");

        assert_eq!(draft.subtotal(), dec!(200000));
        assert_eq!(draft.total_amount, dec!(205000));
        assert!(draft.verify_totals().is_ok());
    }

    #[test]
    fn draft_rejects_discount_above_subtotal() {
        let result = CheckoutDraft::new(
            items(),
            receiver(),
            dec!(20000),
            None,
            dec!(200001),
            PaymentMethod::Cash,
            String::new(),
        );
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn draft_rejects_zero_shipping_fee() {
        let result = CheckoutDraft::new(
            items(),
            receiver(),
            Decimal::ZERO,
            None,
            Decimal::ZERO,
            PaymentMethod::Cash,
            String::new(),
        );
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn tampered_total_fails_verification() {
        let mut draft = CheckoutDraft::new(
            items(),
            receiver(),
            dec!(20000),
            None,
            Decimal::ZERO,
            PaymentMethod::Momo,
            String::new(),
        )
        .expect("valid draft");
        draft.total_amount = dec!(1);
        assert!(draft.verify_totals().is_err());
    }

    #[test]
    fn steps_are_ordered() {
        assert!(CheckoutStep::AddressEntry < CheckoutStep::ShippingSelect);
        assert!(CheckoutStep::PaymentSelect < CheckoutStep::ReadyToSubmit);
        assert_eq!(CheckoutStep::CouponOptional.to_string(), "coupon_optional");
    }
}
