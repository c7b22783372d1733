//! HTTP access to the storefront REST API.
//!
//! Each collaborator the checkout pipeline talks to is a narrow async trait so
//! services can be exercised against doubles; [`StorefrontApiClient`] is the
//! single production implementation of all of them.

use crate::config::AppConfig;
use crate::entities::commerce::{Coupon, Order, OrderRequest, Product};
use crate::errors::{ErrorResponse, ServiceError};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn product_variants(&self, product_id: &str) -> Result<Product, ServiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CouponApi: Send + Sync {
    /// Coupons the server considers candidates for an order of this size.
    async fn candidate_coupons(
        &self,
        order_total: Decimal,
        product_ids: &[String],
    ) -> Result<Vec<Coupon>, ServiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn create_order(
        &self,
        request: &OrderRequest,
        idempotency_key: &str,
    ) -> Result<Order, ServiceError>;
}

/// Payment state as reported by the gateway status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GatewayPaymentState {
    Paid,
    Pending,
    Failed,
    #[serde(other)]
    Unknown,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGatewayApi: Send + Sync {
    /// Asks the server to open a gateway session and returns the raw pay URL.
    async fn request_pay_url(&self, order_id: &str, amount: Decimal)
        -> Result<String, ServiceError>;

    async fn payment_status(&self, order_id: &str) -> Result<GatewayPaymentState, ServiceError>;
}

#[derive(Debug, Serialize)]
struct PayUrlRequest {
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayUrlResponse {
    pay_url: String,
}

#[derive(Debug, Deserialize)]
struct PaymentStatusResponse {
    status: GatewayPaymentState,
}

#[derive(Debug, Clone)]
pub struct StorefrontApiClient {
    client: Client,
    base_url: Url,
}

impl StorefrontApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        // Relative joins drop the last path segment unless it ends in '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| {
            ServiceError::ValidationError(format!("Invalid API base URL '{}': {}", base_url, e))
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(&config.api_base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url.join(path).map_err(|e| {
            ServiceError::ValidationError(format!("Invalid endpoint path '{}': {}", path, e))
        })
    }

    /// Appends `segments` to the base path, percent-encoding each one so an
    /// id can never add path segments or a query of its own.
    fn endpoint_segments(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ServiceError::ValidationError(format!(
                    "API base URL '{}' cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Reads the body, mapping non-2xx responses through `on_error`.
    async fn read_json<T: DeserializeOwned>(
        response: Response,
        on_error: impl FnOnce(StatusCode, String) -> ServiceError,
    ) -> Result<T, ServiceError> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&body)
                .unwrap_or_default()
                .into_message(status);
            warn!(status = %status, message = %message, "Storefront API returned an error");
            return Err(on_error(status, message));
        }

        serde_json::from_slice(&body).map_err(|e| {
            ServiceError::ExternalServiceError(format!("unexpected response body: {}", e))
        })
    }
}

#[async_trait]
impl CatalogApi for StorefrontApiClient {
    #[instrument(skip(self))]
    async fn product_variants(&self, product_id: &str) -> Result<Product, ServiceError> {
        let mut url = self.endpoint("catalog/variants")?;
        url.query_pairs_mut().append_pair("product", product_id);

        let response = self.client.get(url).send().await?;
        Self::read_json(response, ServiceError::lookup_failed).await
    }
}

#[async_trait]
impl CouponApi for StorefrontApiClient {
    #[instrument(skip(self))]
    async fn candidate_coupons(
        &self,
        order_total: Decimal,
        product_ids: &[String],
    ) -> Result<Vec<Coupon>, ServiceError> {
        let mut url = self.endpoint("coupons")?;
        url.query_pairs_mut()
            .append_pair("orderTotal", &order_total.to_string())
            .append_pair("productIds", &product_ids.join(","));

        let response = self.client.get(url).send().await?;
        let coupons: Vec<Coupon> = Self::read_json(response, ServiceError::lookup_failed).await?;
        debug!(count = coupons.len(), "Fetched candidate coupons");
        Ok(coupons)
    }
}

#[async_trait]
impl OrderApi for StorefrontApiClient {
    #[instrument(skip(self, request), fields(items = request.items.len(), payment_method = %request.payment_method))]
    async fn create_order(
        &self,
        request: &OrderRequest,
        idempotency_key: &str,
    ) -> Result<Order, ServiceError> {
        let url = self.endpoint("orders")?;
        let response = self
            .client
            .post(url)
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceError::OrderSubmissionFailed(format!("could not reach the store: {}", e)))?;

        Self::read_json(response, ServiceError::order_rejected).await
    }
}

#[async_trait]
impl PaymentGatewayApi for StorefrontApiClient {
    #[instrument(skip(self))]
    async fn request_pay_url(
        &self,
        order_id: &str,
        amount: Decimal,
    ) -> Result<String, ServiceError> {
        let unavailable = |message: String| ServiceError::GatewayUnavailable {
            order_id: order_id.to_string(),
            message,
        };

        let url = self.endpoint_segments(&["payments", "gateway", order_id])?;
        let response = self
            .client
            .post(url)
            .json(&PayUrlRequest { amount })
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let body: PayUrlResponse =
            Self::read_json(response, |_, message| unavailable(message)).await?;
        Ok(body.pay_url)
    }

    #[instrument(skip(self))]
    async fn payment_status(&self, order_id: &str) -> Result<GatewayPaymentState, ServiceError> {
        let url = self.endpoint_segments(&["payments", "gateway", order_id, "status"])?;
        let response = self.client.get(url).send().await?;
        let body: PaymentStatusResponse =
            Self::read_json(response, ServiceError::lookup_failed).await?;
        Ok(body.status)
    }
}
