use crate::{
    client::CouponApi,
    entities::commerce::{Coupon, CouponType},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A coupon that passed evaluation, with the client-side discount estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount: Decimal,
    pub coupon: Coupon,
}

/// Evaluates discount codes against an order.
///
/// Evaluation is read-only: usage counters are owned by the server and are
/// consumed when the order is created, so the discount computed here is an
/// estimate the server recomputes.
#[derive(Clone)]
pub struct CouponEngine {
    coupons: Arc<dyn CouponApi>,
}

impl CouponEngine {
    pub fn new(coupons: Arc<dyn CouponApi>) -> Self {
        Self { coupons }
    }

    /// Find a coupon by code among candidates, ignoring case and padding.
    pub fn find_by_code<'a>(candidates: &'a [Coupon], code: &str) -> Option<&'a Coupon> {
        candidates.iter().find(|c| c.matches_code(code))
    }

    /// Calculate the discount a coupon grants on an order of `order_total`.
    pub fn evaluate(
        &self,
        coupon: Option<&Coupon>,
        order_total: Decimal,
        product_ids: &[String],
    ) -> Result<Decimal, ServiceError> {
        Self::evaluate_at(coupon, order_total, product_ids, Utc::now())
    }

    pub fn evaluate_at(
        coupon: Option<&Coupon>,
        order_total: Decimal,
        product_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<Decimal, ServiceError> {
        let coupon = coupon
            .ok_or_else(|| ServiceError::CouponInvalid("Coupon code not found".to_string()))?;

        if !coupon.is_active {
            return Err(ServiceError::CouponInvalid(format!(
                "Coupon {} is not active",
                coupon.code
            )));
        }

        if !coupon.is_within_window(now) {
            return Err(ServiceError::CouponInvalid(format!(
                "Coupon {} is expired or not yet valid",
                coupon.code
            )));
        }

        let value_in_range = match coupon.coupon_type {
            CouponType::Percentage => {
                coupon.value >= Decimal::ZERO && coupon.value <= Decimal::ONE_HUNDRED
            }
            CouponType::Fixed => coupon.value >= Decimal::ZERO,
        };
        if !value_in_range {
            return Err(ServiceError::CouponInvalid(format!(
                "Coupon {} has an invalid value",
                coupon.code
            )));
        }

        // Check minimum order amount
        if order_total < coupon.min_order_value {
            debug!(
                "Order total {} is below minimum order value {}",
                order_total, coupon.min_order_value
            );
            return Err(ServiceError::CouponMinOrderNotMet {
                order_total,
                min_order_value: coupon.min_order_value,
            });
        }

        if !coupon.applies_to(product_ids) {
            return Err(ServiceError::CouponInvalid(format!(
                "Coupon {} is not applicable to the items in your cart",
                coupon.code
            )));
        }

        let discount = match coupon.coupon_type {
            CouponType::Percentage => {
                let discount = order_total * coupon.value / Decimal::ONE_HUNDRED;
                // Apply maximum discount cap if set
                match coupon.max_discount_value {
                    Some(max_discount) => discount.min(max_discount),
                    None => discount,
                }
            }
            CouponType::Fixed => coupon.value.min(order_total),
        };

        Ok(discount.max(Decimal::ZERO))
    }

    /// Fetch candidate coupons for the order and evaluate the one matching `code`.
    #[instrument(skip(self))]
    pub async fn lookup_and_evaluate(
        &self,
        code: &str,
        order_total: Decimal,
        product_ids: &[String],
    ) -> Result<AppliedCoupon, ServiceError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::CouponInvalid(
                "Enter a coupon code".to_string(),
            ));
        }

        let candidates = self
            .coupons
            .candidate_coupons(order_total, product_ids)
            .await?;
        let coupon = Self::find_by_code(&candidates, code)
            .cloned()
            .ok_or_else(|| ServiceError::CouponInvalid(format!("Coupon {} not found", code)))?;
        let discount = self.evaluate(Some(&coupon), order_total, product_ids)?;

        info!(code = %coupon.code, %discount, "Coupon applied");
        Ok(AppliedCoupon {
            code: coupon.code.clone(),
            discount,
            coupon,
        })
    }
}
