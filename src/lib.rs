//! Storefront checkout
//!
//! Client-side checkout pipeline for an online clothing storefront: a
//! persisted cart, advisory stock checks, coupon evaluation, a linear
//! checkout flow, order submission against the storefront API and the
//! payment gateway redirect with verified return handling.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod client;
pub mod config;
pub mod entities;
pub mod errors;
pub mod events;
pub mod services;
pub mod storage;

pub mod prelude {
    pub use crate::client::*;
    pub use crate::config::{AppConfig, AppConfigError};
    pub use crate::entities::commerce::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::services::commerce::*;
    pub use crate::services::*;
    pub use crate::storage::*;
}
