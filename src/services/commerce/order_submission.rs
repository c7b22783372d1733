use crate::{
    client::OrderApi,
    entities::commerce::{CheckoutDraft, Order, OrderItem, OrderRequest, PaymentMethod},
    errors::ServiceError,
    events::{Event, EventSender},
    services::commerce::{
        cart_store::CartStore,
        payment_gateway::{PaymentGatewayBridge, PaymentRedirect},
    },
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

/// How the server's order total compares with the client's estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalReconciliation {
    Ok {
        total: Decimal,
    },
    /// The server recomputed a different total, e.g. a changed price or a
    /// coupon that was exhausted in the meantime. The server figure wins.
    Mismatch {
        estimated: Decimal,
        server_total: Decimal,
    },
    /// The server created the order without reporting its total.
    Unconfirmed {
        estimated: Decimal,
    },
}

impl TotalReconciliation {
    pub fn compare(estimated: Decimal, server_total: Option<Decimal>) -> Self {
        match server_total {
            None => TotalReconciliation::Unconfirmed { estimated },
            Some(total) if total == estimated => TotalReconciliation::Ok { total },
            Some(server_total) => TotalReconciliation::Mismatch {
                estimated,
                server_total,
            },
        }
    }

    /// The amount the customer is actually charged.
    pub fn charged_total(&self) -> Decimal {
        match self {
            TotalReconciliation::Ok { total } => *total,
            TotalReconciliation::Mismatch { server_total, .. } => *server_total,
            TotalReconciliation::Unconfirmed { estimated } => *estimated,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Cash or card: nothing more to do on the client.
    Completed {
        order: Order,
        reconciliation: TotalReconciliation,
    },
    /// The customer was sent to the payment gateway.
    AwaitingPayment {
        order: Order,
        redirect: PaymentRedirect,
        reconciliation: TotalReconciliation,
    },
}

impl SubmissionOutcome {
    pub fn order(&self) -> &Order {
        match self {
            SubmissionOutcome::Completed { order, .. }
            | SubmissionOutcome::AwaitingPayment { order, .. } => order,
        }
    }

    pub fn reconciliation(&self) -> TotalReconciliation {
        match self {
            SubmissionOutcome::Completed { reconciliation, .. }
            | SubmissionOutcome::AwaitingPayment { reconciliation, .. } => *reconciliation,
        }
    }
}

/// Turns a finalized checkout draft into a server-side order.
pub struct OrderSubmissionService {
    orders: Arc<dyn OrderApi>,
    cart: Arc<CartStore>,
    gateway: Arc<PaymentGatewayBridge>,
    event_sender: EventSender,
    in_flight: Arc<Mutex<()>>,
}

impl OrderSubmissionService {
    pub fn new(
        orders: Arc<dyn OrderApi>,
        cart: Arc<CartStore>,
        gateway: Arc<PaymentGatewayBridge>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            orders,
            cart,
            gateway,
            event_sender,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Shares the single-submission lock with other services built over the
    /// same cart, so at most one of them has an order request in flight.
    pub fn with_submission_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.in_flight = lock;
        self
    }

    /// Builds the order-creation body. Every line must name a variant.
    pub fn build_request(draft: &CheckoutDraft) -> Result<OrderRequest, ServiceError> {
        if draft.payment_method == PaymentMethod::Unknown {
            return Err(ServiceError::ValidationError(
                "Choose a payment method before placing the order".into(),
            ));
        }

        let items = draft
            .items
            .iter()
            .map(|item| {
                if item.variant_key.is_empty() {
                    return Err(ServiceError::MissingVariant(format!(
                        "{} ({})",
                        item.name, item.product_id
                    )));
                }
                Ok(OrderItem {
                    product_id: item.product_id.clone(),
                    name: item.name.clone(),
                    variant: item.variant_key.to_string(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    image: item.image_ref.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OrderRequest {
            customer: draft.receiver.clone(),
            items,
            shipping_fee: draft.shipping_fee,
            payment_method: draft.payment_method,
            notes: draft.note.clone(),
            coupon_code: draft.coupon_code.clone(),
            discount: draft.discount,
            total_amount: draft.total_amount,
        })
    }

    /// Submits the draft.
    ///
    /// Only one submission runs at a time per submission lock; a second call
    /// while one is in flight fails with `SubmissionInProgress`. On rejection the cart is
    /// kept so the customer can retry. Once the order exists the cart is
    /// cleared, and for gateway payments that happens before the redirect.
    #[instrument(skip(self, draft), fields(payment_method = %draft.payment_method, idempotency_key = %draft.idempotency_key))]
    pub async fn submit(&self, draft: &CheckoutDraft) -> Result<SubmissionOutcome, ServiceError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| ServiceError::SubmissionInProgress)?;

        draft.verify_totals()?;
        let request = Self::build_request(draft)?;

        let order = match self
            .orders
            .create_order(&request, &draft.idempotency_key.to_string())
            .await
        {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "Order creation rejected, cart kept");
                self.event_sender.send_or_log(Event::OrderSubmissionFailed {
                    reason: e.user_message(),
                });
                return Err(e);
            }
        };

        info!(order_id = %order.id, total = ?order.total_amount, "Order created");
        self.event_sender.send_or_log(Event::OrderCreated {
            order_id: order.id.clone(),
            payment_method: draft.payment_method,
        });

        let reconciliation = TotalReconciliation::compare(draft.total_amount, order.total_amount);
        match reconciliation {
            TotalReconciliation::Mismatch {
                estimated,
                server_total,
            } => warn!(
                order_id = %order.id,
                %estimated,
                %server_total,
                "Server total differs from checkout estimate"
            ),
            TotalReconciliation::Unconfirmed { estimated } => warn!(
                order_id = %order.id,
                %estimated,
                "Server did not report an order total, using checkout estimate"
            ),
            TotalReconciliation::Ok { .. } => {}
        }

        // The order exists at this point; a failed clear only leaves stale local rows.
        if let Err(e) = self.cart.clear().await {
            error!(order_id = %order.id, error = %e, "Failed to clear cart after order creation");
        }

        if !draft.payment_method.requires_gateway() {
            return Ok(SubmissionOutcome::Completed {
                order,
                reconciliation,
            });
        }

        let redirect = self
            .gateway
            .initiate(&order.id, reconciliation.charged_total())
            .await?;

        Ok(SubmissionOutcome::AwaitingPayment {
            order,
            redirect,
            reconciliation,
        })
    }
}
