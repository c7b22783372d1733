use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    client::StorefrontApiClient,
    config::AppConfig,
    entities::commerce::{LineItem, Receiver},
    errors::ServiceError,
    events::EventSender,
    services::{
        commerce::{
            CartStore, CheckoutOrchestrator, Navigator, OrderSubmissionService,
            PaymentGatewayBridge, StockGuard,
        },
        promotions::CouponEngine,
    },
    storage::{CartStorage, FileCartStorage},
};

/// Factory for creating service instances with shared dependencies
pub struct ServiceFactory {
    config: Arc<AppConfig>,
    api: Arc<StorefrontApiClient>,
    storage: Arc<dyn CartStorage>,
    navigator: Arc<dyn Navigator>,
    event_sender: EventSender,
    /// Held while an order request is in flight, across every submission
    /// service this factory hands out.
    submission_lock: Arc<Mutex<()>>,
}

impl ServiceFactory {
    /// Creates a new service factory with the given dependencies
    pub fn new(
        config: Arc<AppConfig>,
        api: Arc<StorefrontApiClient>,
        storage: Arc<dyn CartStorage>,
        navigator: Arc<dyn Navigator>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            config,
            api,
            storage,
            navigator,
            event_sender,
            submission_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Wires the HTTP client and file-backed cart described by `config`
    pub fn from_config(
        config: AppConfig,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ServiceError> {
        let api = Arc::new(StorefrontApiClient::from_config(&config)?);
        let storage = Arc::new(FileCartStorage::new(config.cart_storage_path.clone()));
        let event_sender = EventSender::new(config.event_channel_capacity);
        Ok(Self::new(
            Arc::new(config),
            api,
            storage,
            navigator,
            event_sender,
        ))
    }

    /// Restores the persisted cart
    pub async fn cart_store(&self) -> Result<Arc<CartStore>, ServiceError> {
        let cart = CartStore::load(self.storage.clone(), self.event_sender.clone()).await?;
        Ok(Arc::new(cart))
    }

    pub fn stock_guard(&self) -> StockGuard {
        StockGuard::new(self.api.clone())
    }

    pub fn coupon_engine(&self) -> CouponEngine {
        CouponEngine::new(self.api.clone())
    }

    pub fn payment_gateway(&self) -> Arc<PaymentGatewayBridge> {
        Arc::new(
            PaymentGatewayBridge::new(
                self.api.clone(),
                self.navigator.clone(),
                self.event_sender.clone(),
            )
            .with_secret(self.config.payment_gateway_secret.clone())
            .with_redirect_delay(self.config.redirect_delay()),
        )
    }

    /// Starts a checkout session over a cart snapshot
    pub fn checkout(&self, items: Vec<LineItem>, profile: Option<Receiver>) -> CheckoutOrchestrator {
        CheckoutOrchestrator::new(
            items,
            profile,
            self.config.shipping_options.clone(),
            self.coupon_engine(),
            self.event_sender.clone(),
        )
    }

    pub fn order_submission(&self, cart: Arc<CartStore>) -> OrderSubmissionService {
        OrderSubmissionService::new(
            self.api.clone(),
            cart,
            self.payment_gateway(),
            self.event_sender.clone(),
        )
        .with_submission_lock(self.submission_lock.clone())
    }

    /// Gets a reference to the configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Gets a reference to the event sender
    pub fn event_sender(&self) -> &EventSender {
        &self.event_sender
    }
}
