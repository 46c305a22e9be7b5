//! HTTP client for the hosted payment processor.
//!
//! Implements the engine's [`PaymentProcessor`] trait over a small JSON
//! REST surface:
//!
//! * `POST {base}/v1/holds`               — create an authorization hold
//! * `POST {base}/v1/holds/{id}/confirm`  — settle a hold
//! * `POST {base}/v1/holds/{id}/release`  — release a hold uncharged
//!
//! Failures are surfaced as [`EngineError::Processor`] and never retried
//! here — the engine aborts the invoking transition and the caller may
//! retry the whole operation. Amounts cross this boundary in minor units
//! only.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use questboard_engine::{EngineError, HoldAuthorization, PaymentProcessor};

type Result<T> = std::result::Result<T, EngineError>;

pub struct HttpProcessor {
    client: Client,
    base_url: String,
}

impl HttpProcessor {
    pub fn new(client: Client, base_url: String) -> Self {
        HttpProcessor {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct HoldResponse {
    #[serde(rename = "intentId")]
    intent_id: String,
    #[serde(rename = "clientSecret")]
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct AckResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

fn processor_err(e: reqwest::Error) -> EngineError {
    EngineError::Processor(e.to_string())
}

#[async_trait]
impl PaymentProcessor for HttpProcessor {
    async fn create_hold(
        &self,
        amount_minor_units: i64,
        currency: &str,
        metadata: Value,
    ) -> Result<HoldAuthorization> {
        let url = format!("{}/v1/holds", self.base_url);
        debug!(amount_minor_units, currency, "creating processor hold");

        let resp = self
            .client
            .post(&url)
            .json(&json!({
                "amount": amount_minor_units,
                "currency": currency,
                "capture_method": "manual",
                "metadata": metadata,
            }))
            .send()
            .await
            .map_err(processor_err)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Processor(format!(
                "hold creation returned {status}: {body}"
            )));
        }

        let hold: HoldResponse = resp.json().await.map_err(processor_err)?;
        Ok(HoldAuthorization {
            intent_id: hold.intent_id,
            client_secret: hold.client_secret,
        })
    }

    async fn confirm(&self, intent_id: &str) -> Result<()> {
        self.post_ack(intent_id, "confirm").await
    }

    async fn release(&self, intent_id: &str) -> Result<()> {
        self.post_ack(intent_id, "release").await
    }
}

impl HttpProcessor {
    async fn post_ack(&self, intent_id: &str, action: &str) -> Result<()> {
        let url = format!("{}/v1/holds/{intent_id}/{action}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(processor_err)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Processor(format!(
                "{action} returned {status}: {body}"
            )));
        }

        let ack: AckResponse = resp.json().await.map_err(processor_err)?;
        if !ack.ok {
            return Err(EngineError::Processor(
                ack.error.unwrap_or_else(|| format!("{action} rejected")),
            ));
        }
        Ok(())
    }
}
