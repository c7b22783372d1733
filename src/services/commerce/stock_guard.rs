use crate::{
    client::CatalogApi,
    entities::commerce::{LineItem, Product, VariantKey},
    errors::ServiceError,
};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Advisory stock checks made before a line is added or checkout starts.
///
/// The figures come from the last catalog read and can be stale; the
/// authoritative check happens server-side when the order is created.
#[derive(Clone)]
pub struct StockGuard {
    catalog: Arc<dyn CatalogApi>,
}

impl StockGuard {
    pub fn new(catalog: Arc<dyn CatalogApi>) -> Self {
        Self { catalog }
    }

    #[instrument(skip(self))]
    pub async fn fetch_product(&self, product_id: &str) -> Result<Product, ServiceError> {
        self.catalog.product_variants(product_id).await
    }

    /// Units of the variant still addable: stock minus what the cart already
    /// holds, floored at zero. Unknown variants have nothing available.
    pub fn available_stock(product: &Product, variant_key: &VariantKey, cart: &[LineItem]) -> u32 {
        let Some(variant) = product.find_variant(variant_key) else {
            return 0;
        };

        let in_cart = cart
            .iter()
            .find(|item| item.matches(&product.id, variant_key))
            .map_or(0, |item| item.quantity);

        variant.stock.saturating_sub(in_cart)
    }

    pub fn can_add(
        product: &Product,
        variant_key: &VariantKey,
        cart: &[LineItem],
        requested: u32,
    ) -> bool {
        requested <= Self::available_stock(product, variant_key, cart)
    }

    /// Like [`StockGuard::can_add`], with a customer-facing error.
    pub fn check_add(
        product: &Product,
        variant_key: &VariantKey,
        cart: &[LineItem],
        requested: u32,
    ) -> Result<(), ServiceError> {
        if variant_key.is_empty() {
            return Err(ServiceError::MissingVariant(product.name.clone()));
        }
        if product.find_variant(variant_key).is_none() {
            return Err(ServiceError::NotFound(format!(
                "{} is not available in {}",
                product.name, variant_key
            )));
        }

        let available = Self::available_stock(product, variant_key, cart);
        if requested > available {
            warn!(
                product_id = %product.id,
                variant = %variant_key,
                requested,
                available,
                "Requested quantity exceeds stock"
            );
            return Err(ServiceError::InsufficientStock(format!(
                "Only {} more of {} ({}) can be added, {} requested",
                available, product.name, variant_key, requested
            )));
        }
        Ok(())
    }

    /// Re-checks every cart line against fresh product data and reports the
    /// first line whose quantity exceeds stock.
    pub fn validate_cart(cart: &[LineItem], products: &[Product]) -> Result<(), ServiceError> {
        for item in cart {
            let product = products
                .iter()
                .find(|p| p.id == item.product_id)
                .ok_or_else(|| ServiceError::NotFound(format!("Product {}", item.product_id)))?;

            let stock = product
                .find_variant(&item.variant_key)
                .map_or(0, |variant| variant.stock);
            if item.quantity > stock {
                return Err(ServiceError::InsufficientStock(format!(
                    "Only {} of {} ({}) left, {} in cart",
                    stock, item.name, item.variant_key, item.quantity
                )));
            }
        }
        Ok(())
    }

    /// Fetches every product in the cart and runs [`StockGuard::validate_cart`].
    #[instrument(skip(self, cart), fields(rows = cart.len()))]
    pub async fn revalidate_cart(&self, cart: &[LineItem]) -> Result<(), ServiceError> {
        let mut products: Vec<Product> = Vec::new();
        for item in cart {
            if products.iter().all(|p| p.id != item.product_id) {
                products.push(self.fetch_product(&item.product_id).await?);
            }
        }
        Self::validate_cart(cart, &products)
    }
}
