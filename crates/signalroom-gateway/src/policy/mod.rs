//! Policy layer (browser origin allow-list and CORS).

pub mod origin;

pub use origin::{cors_guard, OriginPolicy};
