/// Commerce records consumed and produced by the checkout pipeline
pub mod checkout;
pub mod coupon;
pub mod line_item;
pub mod order;
pub mod product;

// Re-export records
pub use checkout::{CheckoutDraft, CheckoutStep, Receiver, ShippingOption};
pub use coupon::{Coupon, CouponType};
pub use line_item::{subtotal, LineData, LineItem, VariantKey};
pub use order::{Order, OrderItem, OrderRequest, PaymentMethod};
pub use product::{Product, Variant};
