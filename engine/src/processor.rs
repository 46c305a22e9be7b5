//! Payment-processor boundary.
//!
//! The engine never talks to the hosted processor directly; it goes
//! through [`PaymentProcessor`], which the service layer implements over
//! HTTP. Amounts cross this boundary in minor units only; the `money`
//! module does the conversion.

use crate::error::Result;
use async_trait::async_trait;

/// What the processor hands back for a freshly created hold.
#[derive(Clone, Debug)]
pub struct HoldAuthorization {
    /// Processor-assigned intent id; opaque to the engine.
    pub intent_id: String,
    /// Token the payer's client uses to complete the authorization.
    pub client_secret: String,
}

/// Remote payment-processor calls. All fallible; the engine never
/// silently retries — a failure aborts the invoking transition and the
/// caller may retry the whole operation.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Place a hold for `amount_minor_units` against the payer described
    /// in `metadata`. Does not settle funds.
    async fn create_hold(
        &self,
        amount_minor_units: i64,
        currency: &str,
        metadata: serde_json::Value,
    ) -> Result<HoldAuthorization>;

    /// Settle a previously created hold.
    async fn confirm(&self, intent_id: &str) -> Result<()>;

    /// Release a previously created hold without charging.
    async fn release(&self, intent_id: &str) -> Result<()>;
}
