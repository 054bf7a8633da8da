//! API route definitions.
//!
//! This module organizes all HTTP routes for the Paylog API server.

mod health;
mod metrics;
mod payment;

pub use health::health_routes;
pub use metrics::metrics_routes;
pub use payment::payment_routes;
