use http::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Errors surfaced by the checkout pipeline.
///
/// None of these are fatal to the process: every variant maps to a message the
/// storefront shows to the customer, and recovery is always a manual retry.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Coupon invalid: {0}")]
    CouponInvalid(String),

    #[error("Order total {order_total} is below the coupon minimum of {min_order_value}")]
    CouponMinOrderNotMet {
        order_total: Decimal,
        min_order_value: Decimal,
    },

    #[error("Missing variant for line item {0}")]
    MissingVariant(String),

    #[error("Order submission failed: {0}")]
    OrderSubmissionFailed(String),

    #[error("An order submission is already in progress")]
    SubmissionInProgress,

    #[error("Payment gateway unavailable for order {order_id}: {message}")]
    GatewayUnavailable { order_id: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::StorageError(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::ExternalServiceError(err.to_string())
    }
}

/// Error body returned by the storefront API on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorResponse {
    /// Picks the most human-readable message, falling back to the status reason.
    pub fn into_message(self, status: StatusCode) -> String {
        self.message
            .or(self.error)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            })
    }
}

impl ServiceError {
    /// Maps a rejected order-creation response onto the error taxonomy.
    ///
    /// A conflict means the server's authoritative stock check lost a race
    /// with another buyer.
    pub fn order_rejected(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::CONFLICT => ServiceError::InsufficientStock(message),
            _ => ServiceError::OrderSubmissionFailed(message),
        }
    }

    /// Maps a failed catalog or coupon lookup.
    pub fn lookup_failed(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::NOT_FOUND => ServiceError::NotFound(message),
            _ => ServiceError::ExternalServiceError(message),
        }
    }

    /// Machine-readable code, stable across message wording changes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "validation_error",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::CouponInvalid(_) => "coupon_invalid",
            Self::CouponMinOrderNotMet { .. } => "coupon_min_order_not_met",
            Self::MissingVariant(_) => "missing_variant",
            Self::OrderSubmissionFailed(_) => "order_submission_failed",
            Self::SubmissionInProgress => "submission_in_progress",
            Self::GatewayUnavailable { .. } => "gateway_unavailable",
            Self::NotFound(_) => "not_found",
            Self::StorageError(_) => "storage_error",
            Self::ExternalServiceError(_) => "external_service_error",
            Self::SerializationError(_) => "serialization_error",
        }
    }

    /// Whether the error came out of coupon evaluation, in which case any
    /// previously applied discount must be reset to zero.
    pub fn is_coupon_error(&self) -> bool {
        matches!(
            self,
            Self::CouponInvalid(_) | Self::CouponMinOrderNotMet { .. }
        )
    }

    /// Returns the message suitable for showing to the customer.
    /// Internal failures get generic wording to avoid leaking details.
    pub fn user_message(&self) -> String {
        match self {
            Self::StorageError(_) => "Your cart could not be saved, please try again".to_string(),
            Self::SerializationError(_) | Self::ExternalServiceError(_) => {
                "The store is temporarily unreachable, please try again".to_string()
            }
            Self::GatewayUnavailable { order_id, .. } => format!(
                "Order {} was created but the payment page could not be opened. \
                 Retry the payment or contact us to pay on delivery.",
                order_id
            ),
            Self::OrderSubmissionFailed(msg) | Self::InsufficientStock(msg) => msg.clone(),
            _ => self.to_string(),
        }
    }
}
