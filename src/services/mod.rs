//! Business services for the checkout and fulfillment core.
//!
//! Services own the domain rules; handlers stay thin. Anything that must be
//! atomic takes a `ConnectionTrait` so the caller decides the transaction
//! boundary.

pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod coupons;
pub mod inventory;
pub mod order_status;
pub mod orders;
pub mod payment_confirmation;
pub mod pricing;
pub mod shipping_queue;
