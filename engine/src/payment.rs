//! The payment-intent workflow.
//!
//! Orchestrates the external processor around a tiny per-intent state
//! machine: `requires_payment_method → succeeded | failed`, nothing
//! else. An intent is immutable once it leaves
//! `requires_payment_method`; a failed intent is retained for audit and
//! never revived — retries create a fresh intent.

use std::sync::Arc;

use chrono::Utc;
use tracing::error;

use crate::error::{EngineError, Result};
use crate::money::Money;
use crate::processor::PaymentProcessor;
use crate::types::{IntentStatus, PaymentIntent, QuestId};

pub struct PaymentWorkflow {
    processor: Arc<dyn PaymentProcessor>,
    currency: String,
}

impl PaymentWorkflow {
    pub fn new(processor: Arc<dyn PaymentProcessor>, currency: String) -> Self {
        PaymentWorkflow {
            processor,
            currency,
        }
    }

    /// Place a hold for `amount + tip + fee` against `payer_id`.
    ///
    /// The three amounts are captured on the returned intent once, here,
    /// and never recomputed — later settlement reads them back from the
    /// intent, not from the quest. A processor failure surfaces as
    /// [`EngineError::Processor`] and creates nothing.
    pub async fn create_hold(
        &self,
        quest_id: QuestId,
        amount: Money,
        tip: Money,
        fee: Money,
        payer_id: &str,
    ) -> Result<PaymentIntent> {
        if payer_id.trim().is_empty() {
            return Err(EngineError::Unauthenticated);
        }

        let total = amount + tip + fee;
        let metadata = serde_json::json!({
            "quest_id": quest_id,
            "payer_id": payer_id,
        });
        let auth = self
            .processor
            .create_hold(total.as_minor_units(), &self.currency, metadata)
            .await?;

        Ok(PaymentIntent {
            id: auth.intent_id,
            quest_id,
            amount,
            tip_amount: tip,
            platform_fee: fee,
            status: IntentStatus::RequiresPaymentMethod,
            created_at: Utc::now().timestamp(),
            client_secret: auth.client_secret,
        })
    }

    /// Settle a hold. Idempotent: confirming an already-succeeded intent
    /// is a no-op so a retried approve cannot double-charge. Confirming
    /// a failed intent is a programming error.
    pub async fn confirm(&self, intent: &mut PaymentIntent) -> Result<()> {
        match intent.status {
            IntentStatus::Succeeded => Ok(()),
            IntentStatus::Failed => Err(self.misuse(intent, "confirm")),
            IntentStatus::RequiresPaymentMethod => {
                self.processor.confirm(&intent.id).await?;
                intent.status = IntentStatus::Succeeded;
                Ok(())
            }
        }
    }

    /// Release a hold without charging. Releasing an already-failed
    /// intent is a no-op; releasing a settled one is a programming
    /// error.
    pub async fn release(&self, intent: &mut PaymentIntent) -> Result<()> {
        match intent.status {
            IntentStatus::Failed => Ok(()),
            IntentStatus::Succeeded => Err(self.misuse(intent, "release")),
            IntentStatus::RequiresPaymentMethod => {
                self.processor.release(&intent.id).await?;
                intent.status = IntentStatus::Failed;
                Ok(())
            }
        }
    }

    fn misuse(&self, intent: &PaymentIntent, action: &'static str) -> EngineError {
        error!(
            intent_id = %intent.id,
            status = %intent.status,
            action,
            "intent state misuse"
        );
        EngineError::InvalidIntentState {
            intent_id: intent.id.clone(),
            status: intent.status,
            action,
        }
    }
}
