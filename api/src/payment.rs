//! Payment log payload and its generators.

use crate::config::ShopSettings;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const PAYMENT_METHODS: [&str; 4] = ["CreditCard", "DebitCard", "BankTransfer", "Cash"];
const STATUSES: [&str; 3] = ["Approved", "Pending", "Declined"];

/// A synthetic payment log, serialized with PascalCase field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentLog {
    /// Unique per generated payload.
    pub tracking_id: Uuid,
    /// Configured legacy shop id.
    pub shop_legacy_id: String,
    /// Configured shop name.
    pub shop_name: String,
    /// Configured country code.
    pub country: String,
    /// Configured currency code.
    pub currency: String,
    /// Amount in `currency`, rounded to cents.
    pub amount: f64,
    /// Payment method.
    pub payment_method: String,
    /// Payment status.
    pub status: String,
    /// When the payload was generated.
    pub created_at: DateTime<Utc>,
}

/// Errors raised while generating a payload.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The generator refused to produce a payload.
    #[error("Payment generation rejected: {0}")]
    Rejected(String),
}

/// Produces payment log payloads.
pub trait PaymentGenerator: Send + Sync {
    /// Generates one payload.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`] if no payload could be produced.
    fn generate(&self) -> Result<PaymentLog, GenerationError>;
}

/// Generates random payments for a fixed shop.
#[derive(Debug, Clone)]
pub struct SyntheticPayments {
    shop: ShopSettings,
}

impl SyntheticPayments {
    /// Creates a generator for `shop`.
    #[must_use]
    pub fn new(shop: ShopSettings) -> Self {
        Self { shop }
    }
}

impl PaymentGenerator for SyntheticPayments {
    fn generate(&self) -> Result<PaymentLog, GenerationError> {
        let mut rng = rand::thread_rng();
        let cents: u32 = rng.gen_range(1_000..=500_000);
        let pick = |options: &[&str], rng: &mut rand::rngs::ThreadRng| {
            options.choose(rng).copied().unwrap_or_default().to_string()
        };

        Ok(PaymentLog {
            tracking_id: Uuid::new_v4(),
            shop_legacy_id: self.shop.legacy_id.clone(),
            shop_name: self.shop.name.clone(),
            country: self.shop.country.clone(),
            currency: self.shop.currency.clone(),
            amount: f64::from(cents) / 100.0,
            payment_method: pick(&PAYMENT_METHODS, &mut rng),
            status: pick(&STATUSES, &mut rng),
            created_at: Utc::now(),
        })
    }
}

/// A generator that always fails. Backs the demo error route.
#[derive(Debug, Clone)]
pub struct RejectingGenerator {
    reason: String,
}

impl RejectingGenerator {
    /// Creates a generator failing with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PaymentGenerator for RejectingGenerator {
    fn generate(&self) -> Result<PaymentLog, GenerationError> {
        Err(GenerationError::Rejected(self.reason.clone()))
    }
}
