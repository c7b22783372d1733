use crate::{
    entities::commerce::{subtotal, LineData, LineItem, VariantKey},
    errors::ServiceError,
    events::{Event, EventSender},
    storage::CartStorage,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

/// The shopping cart: an ordered list of line items, unique per
/// (product, variant), persisted on every change.
///
/// The `CartStore` provides:
/// - Merge-or-append adds keyed on product and variant
/// - Quantity updates and removals by row index
/// - Totals computed from the current rows
/// - A change notification on the event channel after every persisted mutation
///
/// Each mutation holds the cart lock across read, modify, persist and notify,
/// so observers never see a state that was not saved. A failed save rolls the
/// in-memory rows back and nothing is broadcast.
///
/// # Examples
///
/// ```ignore
/// use storefront_checkout::services::commerce::CartStore;
///
/// let cart = CartStore::load(storage, events).await?;
/// cart.add("p1", VariantKey::new("M", Some("Red")), product.line_data(), 2).await?;
/// println!("{} items, total {}", cart.item_count().await, cart.total().await);
/// ```
pub struct CartStore {
    items: Mutex<Vec<LineItem>>,
    storage: Arc<dyn CartStorage>,
    event_sender: EventSender,
}

impl CartStore {
    /// Creates an empty cart that persists to `storage`.
    pub fn empty(storage: Arc<dyn CartStorage>, event_sender: EventSender) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            storage,
            event_sender,
        }
    }

    /// Restores the cart saved in `storage`.
    ///
    /// Rows with a zero quantity are dropped and rows sharing a
    /// (product, variant) pair are merged, so the loaded cart always satisfies
    /// the same invariants as one built through [`CartStore::add`].
    ///
    /// # Returns
    ///
    /// * `Ok(CartStore)` - The restored cart
    /// * `Err(ServiceError)` - Storage error if the slot exists but cannot be read
    #[instrument(skip(storage, event_sender))]
    pub async fn load(
        storage: Arc<dyn CartStorage>,
        event_sender: EventSender,
    ) -> Result<Self, ServiceError> {
        let stored = storage.load().await?;
        let stored_rows = stored.len();

        let mut items: Vec<LineItem> = Vec::with_capacity(stored.len());
        for row in stored.into_iter().filter(|row| row.quantity > 0) {
            match items
                .iter_mut()
                .find(|existing| existing.matches(&row.product_id, &row.variant_key))
            {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(row.quantity),
                None => items.push(row),
            }
        }

        if items.len() != stored_rows {
            debug!(
                stored_rows,
                kept_rows = items.len(),
                "Normalized saved cart"
            );
        }

        Ok(Self {
            items: Mutex::new(items),
            storage,
            event_sender,
        })
    }

    /// Snapshot of the current rows, in insertion order.
    pub async fn items(&self) -> Vec<LineItem> {
        self.items.lock().await.clone()
    }

    /// Σ(unit price × quantity) over all rows.
    pub async fn total(&self) -> Decimal {
        subtotal(&self.items.lock().await)
    }

    /// Sum of quantities, as shown on the cart badge.
    pub async fn item_count(&self) -> u32 {
        self.items
            .lock()
            .await
            .iter()
            .fold(0u32, |acc, item| acc.saturating_add(item.quantity))
    }

    /// Quantity of `(product_id, variant_key)` already in the cart.
    pub async fn quantity_of(&self, product_id: &str, variant_key: &VariantKey) -> u32 {
        self.items
            .lock()
            .await
            .iter()
            .find(|item| item.matches(product_id, variant_key))
            .map_or(0, |item| item.quantity)
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Adds `quantity` units of a variant, merging into an existing row when
    /// the (product, variant) pair is already present.
    ///
    /// A quantity below 1 is ignored.
    ///
    /// # Arguments
    ///
    /// * `product_id` - Catalog id of the product
    /// * `variant_key` - Size/color key of the variant
    /// * `line` - Name, unit price and image captured at add time
    /// * `quantity` - Units to add
    #[instrument(skip(self, line))]
    pub async fn add(
        &self,
        product_id: &str,
        variant_key: VariantKey,
        line: LineData,
        quantity: u32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            debug!("Ignoring add with zero quantity");
            return Ok(());
        }

        self.commit(|items| {
            match items
                .iter_mut()
                .find(|item| item.matches(product_id, &variant_key))
            {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(quantity);
                }
                None => items.push(LineItem::new(product_id, variant_key.clone(), line, quantity)),
            }
            true
        })
        .await?;

        info!(quantity, "Added item to cart");
        Ok(())
    }

    /// Sets the quantity of the row at `index`.
    ///
    /// A quantity below 1 or an out-of-range index leaves the cart unchanged;
    /// use [`CartStore::remove`] to delete a row.
    #[instrument(skip(self))]
    pub async fn set_quantity(&self, index: usize, quantity: u32) -> Result<(), ServiceError> {
        if quantity < 1 {
            debug!("Ignoring quantity update below 1");
            return Ok(());
        }

        self.commit(|items| match items.get_mut(index) {
            Some(item) if item.quantity != quantity => {
                item.quantity = quantity;
                true
            }
            _ => false,
        })
        .await
    }

    /// Removes the row at `index`. Indices of later rows shift down by one.
    #[instrument(skip(self))]
    pub async fn remove(&self, index: usize) -> Result<Option<LineItem>, ServiceError> {
        let mut removed = None;
        self.commit(|items| {
            if index < items.len() {
                removed = Some(items.remove(index));
                true
            } else {
                false
            }
        })
        .await?;

        if let Some(item) = &removed {
            info!(product_id = %item.product_id, variant = %item.variant_key, "Removed item from cart");
        }
        Ok(removed)
    }

    /// Empties the cart.
    ///
    /// Called only once an order exists on the server: after creation for cash
    /// and card orders, or right before handing off to a payment gateway.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), ServiceError> {
        let mut items = self.items.lock().await;
        let previous = std::mem::take(&mut *items);

        if let Err(e) = self.storage.save(&items).await {
            error!("Failed to persist cleared cart: {}", e);
            *items = previous;
            return Err(e);
        }

        self.event_sender.send_or_log(Event::CartCleared);
        info!(rows = previous.len(), "Cart cleared");
        Ok(())
    }

    /// Applies `mutate` under the cart lock; when it reports a change, the new
    /// rows are persisted and broadcast, or rolled back if the save fails.
    async fn commit<F>(&self, mutate: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&mut Vec<LineItem>) -> bool,
    {
        let mut items = self.items.lock().await;
        let snapshot = items.clone();

        if !mutate(&mut items) {
            return Ok(());
        }

        if let Err(e) = self.storage.save(&items).await {
            error!("Failed to persist cart, rolling back: {}", e);
            *items = snapshot;
            return Err(e);
        }

        self.event_sender.send_or_log(Event::CartUpdated {
            item_count: items
                .iter()
                .fold(0u32, |acc, item| acc.saturating_add(item.quantity)),
            total: subtotal(&items),
        });
        Ok(())
    }
}
