use crate::{
    client::{GatewayPaymentState, PaymentGatewayApi},
    errors::ServiceError,
    events::{Event, EventSender},
};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PARAM: &str = "signature";
const ORDER_ID_PARAM: &str = "orderId";
const RESULT_CODE_PARAM: &str = "resultCode";
const TRANSACTION_ID_PARAM: &str = "transId";
const MESSAGE_PARAM: &str = "message";
const AMOUNT_PARAM: &str = "amount";

/// Gateway result codes meaning the payment is still being processed.
const PENDING_RESULT_CODES: [i64; 2] = [1000, 7000];

/// Hands control to an external page. The storefront UI opens a browser tab;
/// the CLI prints the URL.
pub trait Navigator: Send + Sync {
    fn redirect(&self, url: &Url);
}

/// Where the customer was sent to pay for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRedirect {
    pub order_id: String,
    pub pay_url: Url,
}

/// Result of checking a gateway return against the gateway itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentVerification {
    Verified {
        order_id: String,
        transaction_id: Option<String>,
    },
    Pending {
        order_id: String,
    },
    Failed {
        order_id: Option<String>,
        reason: String,
    },
}

impl PaymentVerification {
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::Verified { order_id, .. } | Self::Pending { order_id } => Some(order_id),
            Self::Failed { order_id, .. } => order_id.as_deref(),
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Verified { .. } => "verified",
            Self::Pending { .. } => "pending",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub verification: PaymentVerification,
    /// How long the result screen stays up before returning home.
    pub redirect_after: Duration,
}

/// Initiates gateway payments and verifies the customer's return from them.
pub struct PaymentGatewayBridge {
    api: Arc<dyn PaymentGatewayApi>,
    navigator: Arc<dyn Navigator>,
    secret: Option<String>,
    redirect_delay: Duration,
    event_sender: EventSender,
}

impl PaymentGatewayBridge {
    pub fn new(
        api: Arc<dyn PaymentGatewayApi>,
        navigator: Arc<dyn Navigator>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            api,
            navigator,
            secret: None,
            redirect_delay: Duration::from_secs(3),
            event_sender,
        }
    }

    /// Verify return signatures locally with this shared secret instead of
    /// polling the status endpoint.
    pub fn with_secret(mut self, secret: Option<String>) -> Self {
        self.secret = secret.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_redirect_delay(mut self, delay: Duration) -> Self {
        self.redirect_delay = delay;
        self
    }

    /// Requests a pay URL for an existing order and navigates to it.
    ///
    /// On failure the order stays on the server, unpaid.
    #[instrument(skip(self))]
    pub async fn initiate(
        &self,
        order_id: &str,
        amount: Decimal,
    ) -> Result<PaymentRedirect, ServiceError> {
        let unavailable = |message: String| ServiceError::GatewayUnavailable {
            order_id: order_id.to_string(),
            message,
        };

        let raw = self
            .api
            .request_pay_url(order_id, amount)
            .await
            .map_err(|e| match e {
                ServiceError::GatewayUnavailable { .. } => e,
                other => unavailable(other.to_string()),
            })?;

        let pay_url = Url::parse(raw.trim())
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| {
                warn!(pay_url = %raw, "Gateway returned an unusable pay URL");
                unavailable(format!("invalid pay URL '{}'", raw))
            })?;

        info!(pay_url = %pay_url, "Redirecting to payment gateway");
        self.navigator.redirect(&pay_url);
        self.event_sender.send_or_log(Event::PaymentRedirected {
            order_id: order_id.to_string(),
            pay_url: pay_url.to_string(),
        });

        Ok(PaymentRedirect {
            order_id: order_id.to_string(),
            pay_url,
        })
    }

    /// Interprets the query string the gateway appended to the return URL.
    ///
    /// Nothing in the query is trusted on its own: it is either checked
    /// against the shared-secret signature or confirmed through the status
    /// endpoint.
    pub async fn reconcile(&self, query: &str) -> ReconcileOutcome {
        self.reconcile_expecting(query, None).await
    }

    /// Like [`PaymentGatewayBridge::reconcile`], additionally requiring a
    /// signed `amount` to equal `expected_amount` before a payment counts as
    /// verified.
    #[instrument(skip(self, query))]
    pub async fn reconcile_expecting(
        &self,
        query: &str,
        expected_amount: Option<Decimal>,
    ) -> ReconcileOutcome {
        let params = parse_query(query);

        let verification = match params
            .get(ORDER_ID_PARAM)
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
        {
            None => PaymentVerification::Failed {
                order_id: None,
                reason: "Return URL has no order id".to_string(),
            },
            Some(order_id) if !is_plain_order_id(order_id) => {
                warn!(order_id, "Gateway return carries a malformed order id");
                PaymentVerification::Failed {
                    order_id: None,
                    reason: "Return URL has a malformed order id".to_string(),
                }
            }
            Some(order_id) => match &self.secret {
                Some(secret) => verify_signed_return(&params, secret, order_id, expected_amount),
                None => self.poll_status(order_id).await,
            },
        };

        info!(
            order_id = verification.order_id().unwrap_or("-"),
            status = verification.status_label(),
            "Payment return reconciled"
        );
        self.event_sender.send_or_log(Event::PaymentReconciled {
            order_id: verification.order_id().map(str::to_string),
            status: verification.status_label().to_string(),
        });

        ReconcileOutcome {
            verification,
            redirect_after: self.redirect_delay,
        }
    }

    async fn poll_status(&self, order_id: &str) -> PaymentVerification {
        match self.api.payment_status(order_id).await {
            Ok(GatewayPaymentState::Paid) => PaymentVerification::Verified {
                order_id: order_id.to_string(),
                transaction_id: None,
            },
            Ok(GatewayPaymentState::Pending) => PaymentVerification::Pending {
                order_id: order_id.to_string(),
            },
            Ok(state) => PaymentVerification::Failed {
                order_id: Some(order_id.to_string()),
                reason: format!("Gateway reported payment {}", state),
            },
            Err(e) => {
                // The customer may have paid; only the status check failed.
                warn!(order_id, error = %e, "Payment status check failed");
                PaymentVerification::Pending {
                    order_id: order_id.to_string(),
                }
            }
        }
    }
}

/// Order ids are opaque tokens; anything that could change the meaning of a
/// URL it is placed in is refused.
fn is_plain_order_id(order_id: &str) -> bool {
    !order_id
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    let query = query.trim();
    let query = query
        .split_once('?')
        .map_or(query, |(_, tail)| tail);
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Hex HMAC-SHA256 over `key=value` pairs in key order, joined by `&`,
/// excluding the signature itself.
pub fn sign(params: &BTreeMap<String, String>, secret: &str) -> Option<String> {
    let canonical = params
        .iter()
        .filter(|(key, _)| key.as_str() != SIGNATURE_PARAM)
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(canonical.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

fn verify_signed_return(
    params: &BTreeMap<String, String>,
    secret: &str,
    order_id: &str,
    expected_amount: Option<Decimal>,
) -> PaymentVerification {
    let failed = |reason: &str| PaymentVerification::Failed {
        order_id: Some(order_id.to_string()),
        reason: reason.to_string(),
    };

    let Some(provided) = params.get(SIGNATURE_PARAM) else {
        return failed("Return is not signed");
    };
    let signature_ok = sign(params, secret)
        .map_or(false, |expected| {
            constant_time_eq(&expected, &provided.trim().to_ascii_lowercase())
        });
    if !signature_ok {
        warn!(order_id, "Gateway return signature mismatch");
        return failed("Return signature is invalid");
    }

    if let (Some(expected), Some(raw)) = (expected_amount, params.get(AMOUNT_PARAM)) {
        match raw.trim().parse::<Decimal>() {
            Ok(paid) if paid == expected => {}
            Ok(paid) => {
                warn!(order_id, %paid, %expected, "Gateway amount differs from order total");
                return failed("Paid amount does not match the order total");
            }
            Err(_) => return failed("Return carries an unreadable amount"),
        }
    }

    let result_code = params
        .get(RESULT_CODE_PARAM)
        .and_then(|code| code.trim().parse::<i64>().ok());
    match result_code {
        Some(0) => PaymentVerification::Verified {
            order_id: order_id.to_string(),
            transaction_id: params
                .get(TRANSACTION_ID_PARAM)
                .filter(|id| !id.is_empty())
                .cloned(),
        },
        Some(code) if PENDING_RESULT_CODES.contains(&code) => PaymentVerification::Pending {
            order_id: order_id.to_string(),
        },
        _ => failed(
            params
                .get(MESSAGE_PARAM)
                .map(String::as_str)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or("Payment was not completed"),
        ),
    }
}
