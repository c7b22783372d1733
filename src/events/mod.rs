use crate::entities::commerce::{CheckoutStep, PaymentMethod};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Notifications emitted by the cart and checkout services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartUpdated {
        item_count: u32,
        total: Decimal,
    },
    CartCleared,

    // Checkout events
    CheckoutStepChanged {
        step: CheckoutStep,
    },
    CouponApplied {
        code: String,
        discount: Decimal,
    },
    CouponRejected {
        code: String,
        reason: String,
    },

    // Order and payment events
    OrderCreated {
        order_id: String,
        payment_method: PaymentMethod,
    },
    OrderSubmissionFailed {
        reason: String,
    },
    PaymentRedirected {
        order_id: String,
        pay_url: String,
    },
    PaymentReconciled {
        order_id: Option<String>,
        status: String,
    },
}

/// Fan-out publisher. Every subscriber sees every event sent after it
/// subscribed; a sender with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: broadcast::Sender<Event>,
}

impl EventSender {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Sends an event, returning how many subscribers received it.
    pub fn send(&self, event: Event) -> Result<usize, String> {
        self.sender
            .send(event)
            .map_err(|e| format!("Failed to send event: {:?}", e.0))
    }

    pub fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event) {
            debug!("No event subscribers: {}", e);
        }
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Logs every event until all senders are dropped.
pub async fn process_events(mut rx: broadcast::Receiver<Event>) {
    info!("Starting event processing loop");

    loop {
        match rx.recv().await {
            Ok(event) => match &event {
                Event::OrderSubmissionFailed { reason } => {
                    warn!(reason = %reason, "Order submission failed");
                }
                Event::CouponRejected { code, reason } => {
                    info!(code = %code, reason = %reason, "Coupon rejected");
                }
                other => info!("Received event: {:?}", other),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event processor lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    info!("Event processing loop finished");
}
