// Commerce services
pub mod commerce;

// Discount codes
pub mod promotions;

// Service factory for dependency injection
pub mod factory;

pub use factory::ServiceFactory;
pub use promotions::{AppliedCoupon, CouponEngine};
