//! storefront: order, payment and inventory service for a seafood shop
//!
//! - Reserves stock and creates orders inside one store transaction
//! - Creates Razorpay payment intents and verifies signed confirmations
//! - Cancels abandoned orders and restocks daily on scheduler calls
//! - Sends email / WhatsApp notifications from a transactional outbox

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod inventory;
pub mod invoice;
pub mod logger;
pub mod notify;
pub mod orders;
pub mod payment;
pub mod state;
pub mod store;
pub mod util;

pub use config::Config;
pub use state::AppState;
