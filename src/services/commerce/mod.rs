/// Commerce services module - cart, checkout and order submission
pub mod cart_store;
pub mod checkout_service;
pub mod order_submission;
pub mod payment_gateway;
pub mod stock_guard;

// Re-export services for convenience
pub use cart_store::CartStore;
pub use checkout_service::{
    CheckoutOrchestrator, CheckoutSummary, CouponStage, OnlineMethod, PaymentChoice,
};
pub use order_submission::{OrderSubmissionService, SubmissionOutcome, TotalReconciliation};
pub use payment_gateway::{
    Navigator, PaymentGatewayBridge, PaymentRedirect, PaymentVerification, ReconcileOutcome,
};
pub use stock_guard::StockGuard;
