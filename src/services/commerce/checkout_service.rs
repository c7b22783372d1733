use crate::{
    entities::commerce::{
        subtotal, CheckoutDraft, CheckoutStep, LineItem, PaymentMethod, Receiver, ShippingOption,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::promotions::{AppliedCoupon, CouponEngine},
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// Online payment channels offered once "pay online" is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum OnlineMethod {
    Card,
    Momo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentChoice {
    Unselected,
    Cash,
    /// Online was chosen; the channel is picked separately.
    Online(Option<OnlineMethod>),
}

impl PaymentChoice {
    fn method(&self) -> Option<PaymentMethod> {
        match self {
            PaymentChoice::Cash => Some(PaymentMethod::Cash),
            PaymentChoice::Online(Some(OnlineMethod::Card)) => Some(PaymentMethod::CreditCard),
            PaymentChoice::Online(Some(OnlineMethod::Momo)) => Some(PaymentMethod::Momo),
            PaymentChoice::Unselected | PaymentChoice::Online(None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CouponStage {
    Pending,
    Skipped,
    Applied(AppliedCoupon),
}

/// Amounts shown on the checkout screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSummary {
    pub step: CheckoutStep,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub discount: Decimal,
    pub coupon_code: Option<String>,
    pub total_amount: Decimal,
}

/// Drives one checkout session from address entry to a submittable draft.
///
/// The current step is never stored: it is the first step whose requirement
/// is unmet, so editing an earlier field re-validates everything after it.
pub struct CheckoutOrchestrator {
    items: Vec<LineItem>,
    receiver: Receiver,
    shipping_options: Vec<ShippingOption>,
    shipping: Option<ShippingOption>,
    coupon: CouponStage,
    payment: PaymentChoice,
    note: String,
    coupons: CouponEngine,
    event_sender: EventSender,
    last_step: CheckoutStep,
}

impl CheckoutOrchestrator {
    /// Starts a session over a snapshot of the cart, pre-filling the receiver
    /// from the saved profile when there is one.
    pub fn new(
        items: Vec<LineItem>,
        profile: Option<Receiver>,
        shipping_options: Vec<ShippingOption>,
        coupons: CouponEngine,
        event_sender: EventSender,
    ) -> Self {
        let mut session = Self {
            items,
            receiver: profile.unwrap_or_default(),
            shipping_options,
            shipping: None,
            coupon: CouponStage::Pending,
            payment: PaymentChoice::Unselected,
            note: String::new(),
            coupons,
            event_sender,
            last_step: CheckoutStep::AddressEntry,
        };
        session.last_step = session.step();
        session
    }

    pub fn step(&self) -> CheckoutStep {
        if !self.receiver.is_complete() {
            CheckoutStep::AddressEntry
        } else if self.shipping.is_none() {
            CheckoutStep::ShippingSelect
        } else if self.coupon == CouponStage::Pending && self.payment == PaymentChoice::Unselected
        {
            CheckoutStep::CouponOptional
        } else if self.payment.method().is_none() {
            CheckoutStep::PaymentSelect
        } else {
            CheckoutStep::ReadyToSubmit
        }
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    pub fn shipping_options(&self) -> &[ShippingOption] {
        &self.shipping_options
    }

    pub fn payment(&self) -> PaymentChoice {
        self.payment
    }

    pub fn coupon(&self) -> &CouponStage {
        &self.coupon
    }

    pub fn subtotal(&self) -> Decimal {
        subtotal(&self.items)
    }

    pub fn shipping_fee(&self) -> Decimal {
        self.shipping.as_ref().map_or(Decimal::ZERO, |s| s.fee)
    }

    pub fn discount(&self) -> Decimal {
        match &self.coupon {
            CouponStage::Applied(applied) => applied.discount,
            CouponStage::Pending | CouponStage::Skipped => Decimal::ZERO,
        }
    }

    pub fn total_amount(&self) -> Decimal {
        self.subtotal() + self.shipping_fee() - self.discount()
    }

    pub fn summary(&self) -> CheckoutSummary {
        CheckoutSummary {
            step: self.step(),
            subtotal: self.subtotal(),
            shipping_fee: self.shipping_fee(),
            discount: self.discount(),
            coupon_code: self.applied_code(),
            total_amount: self.total_amount(),
        }
    }

    /// Stores the receiver even when incomplete so partial input survives;
    /// the error tells the caller what is still missing.
    pub fn set_receiver(&mut self, receiver: Receiver) -> Result<(), ServiceError> {
        let result = receiver.validate().map_err(ServiceError::from);
        self.receiver = receiver;
        self.refresh_step();
        result
    }

    /// Selects a shipping option from the fee table. An unknown id, or an
    /// option without a positive fee, clears the selection.
    #[instrument(skip(self))]
    pub fn select_shipping(&mut self, option_id: &str) -> Result<Decimal, ServiceError> {
        let selected = self
            .shipping_options
            .iter()
            .find(|o| o.id.eq_ignore_ascii_case(option_id.trim()))
            .filter(|o| o.fee > Decimal::ZERO)
            .cloned();

        let result = match &selected {
            Some(option) => Ok(option.fee),
            None => Err(ServiceError::ValidationError(format!(
                "Unknown shipping option '{}'",
                option_id
            ))),
        };
        self.shipping = selected;
        self.refresh_step();
        result
    }

    /// Looks up `code` and applies its discount to the current subtotal.
    ///
    /// On any failure the discount returns to zero and the coupon step is
    /// offered again.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&mut self, code: &str) -> Result<Decimal, ServiceError> {
        let result = self
            .coupons
            .lookup_and_evaluate(code, self.subtotal(), &self.product_ids())
            .await;

        let outcome = match result {
            Ok(applied) => {
                let discount = applied.discount;
                self.event_sender.send_or_log(Event::CouponApplied {
                    code: applied.code.clone(),
                    discount,
                });
                self.coupon = CouponStage::Applied(applied);
                Ok(discount)
            }
            Err(e) => {
                info!(code = %code, error = %e, "Coupon rejected");
                self.event_sender.send_or_log(Event::CouponRejected {
                    code: code.trim().to_string(),
                    reason: e.user_message(),
                });
                self.coupon = CouponStage::Pending;
                Err(e)
            }
        };
        self.refresh_step();
        outcome
    }

    pub fn skip_coupon(&mut self) {
        self.coupon = CouponStage::Skipped;
        self.refresh_step();
    }

    pub fn remove_coupon(&mut self) {
        if let Some(code) = self.applied_code() {
            debug!(code = %code, "Coupon removed");
        }
        self.skip_coupon();
    }

    pub fn select_cash(&mut self) {
        self.payment = PaymentChoice::Cash;
        self.refresh_step();
    }

    /// Chooses online payment. Coming from another top-level method resets
    /// the online channel; re-selecting online keeps it.
    pub fn select_online(&mut self) {
        if !matches!(self.payment, PaymentChoice::Online(_)) {
            self.payment = PaymentChoice::Online(None);
        }
        self.refresh_step();
    }

    pub fn select_online_method(&mut self, method: OnlineMethod) -> Result<(), ServiceError> {
        match self.payment {
            PaymentChoice::Online(_) => {
                self.payment = PaymentChoice::Online(Some(method));
                self.refresh_step();
                Ok(())
            }
            _ => Err(ServiceError::ValidationError(
                "Choose online payment before picking a channel".to_string(),
            )),
        }
    }

    pub fn set_note(&mut self, note: &str) {
        self.note = note.trim().to_string();
    }

    /// Replaces the cart snapshot. An applied coupon is re-evaluated against
    /// the new subtotal and dropped if it no longer qualifies.
    pub fn set_items(&mut self, items: Vec<LineItem>) {
        self.items = items;

        if let CouponStage::Applied(applied) = &self.coupon {
            let code = applied.code.clone();
            match self
                .coupons
                .evaluate(Some(&applied.coupon), self.subtotal(), &self.product_ids())
            {
                Ok(discount) => {
                    if let CouponStage::Applied(applied) = &mut self.coupon {
                        applied.discount = discount;
                    }
                }
                Err(e) => {
                    warn!(code = %code, error = %e, "Applied coupon no longer qualifies");
                    self.event_sender.send_or_log(Event::CouponRejected {
                        code,
                        reason: e.user_message(),
                    });
                    self.coupon = CouponStage::Pending;
                }
            }
        }
        self.refresh_step();
    }

    /// Builds the draft handed to order submission, or names the first
    /// requirement still missing. A coupon step left pending counts as skipped.
    #[instrument(skip(self), fields(step = %self.step()))]
    pub fn finalize(&self) -> Result<CheckoutDraft, ServiceError> {
        if self.items.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }
        self.receiver.validate()?;

        let shipping = self.shipping.as_ref().ok_or_else(|| {
            ServiceError::ValidationError("Select a shipping method".to_string())
        })?;

        let payment_method = match self.payment {
            PaymentChoice::Unselected => {
                return Err(ServiceError::ValidationError(
                    "Select a payment method".to_string(),
                ))
            }
            PaymentChoice::Online(None) => {
                return Err(ServiceError::ValidationError(
                    "Select an online payment channel".to_string(),
                ))
            }
            choice => choice.method().ok_or_else(|| {
                ServiceError::ValidationError("Select a payment method".to_string())
            })?,
        };

        let draft = CheckoutDraft::new(
            self.items.clone(),
            self.receiver.clone(),
            shipping.fee,
            self.applied_code(),
            self.discount(),
            payment_method,
            self.note.clone(),
        )?;

        info!(
            total = %draft.total_amount,
            payment_method = %draft.payment_method,
            "Checkout finalized"
        );
        Ok(draft)
    }

    fn applied_code(&self) -> Option<String> {
        match &self.coupon {
            CouponStage::Applied(applied) => Some(applied.code.clone()),
            CouponStage::Pending | CouponStage::Skipped => None,
        }
    }

    fn product_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for item in &self.items {
            if !ids.contains(&item.product_id) {
                ids.push(item.product_id.clone());
            }
        }
        ids
    }

    fn refresh_step(&mut self) {
        let step = self.step();
        if step != self.last_step {
            debug!(from = %self.last_step, to = %step, "Checkout step changed");
            self.last_step = step;
            self.event_sender
                .send_or_log(Event::CheckoutStepChanged { step });
        }
    }
}
