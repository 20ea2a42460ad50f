//! Metered data gateway — the paid boundary of the system
//!
//! Every call to [`MeteredGateway::purchase`] costs real money, so the
//! orchestrator treats the trait as a budget line, not a free lookup. The
//! production implementation speaks HTTP to a Fluora-style monetized MCP
//! endpoint; tests script the trait directly.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use engine::{PricePoint, PriceSource};
use persistence::repository::ParameterTemplate;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Payment rejected or wallet exhausted. Never retried.
    #[error("payment failed: {0}")]
    Payment(String),

    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway transport error: {0}")]
    Transport(String),

    /// The purchase was charged but the payload is unusable.
    #[error("malformed gateway payload: {0}")]
    Payload(String),
}

impl GatewayError {
    /// Payment problems stop the loop; everything else is a cycle-level
    /// failure at worst.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Payment(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }
}

/// What a completed purchase handed back
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub payload: Value,
    /// The amount actually charged, as reported by the gateway. This is
    /// authoritative for spend accounting; the quoted price is not.
    pub cost_charged: Decimal,
}

impl PurchaseReceipt {
    /// Extract the price observation from the payload. The observation
    /// timestamp must come from the feed itself, never from local time.
    pub fn price_point(&self) -> Result<PricePoint, GatewayError> {
        let timestamp = self
            .payload
            .get("timestamp")
            .and_then(Value::as_i64)
            .ok_or_else(|| GatewayError::Payload("missing or non-integer timestamp".into()))?;

        let price = self
            .payload
            .get("price")
            .ok_or_else(|| GatewayError::Payload("missing price".into()))?;
        let value = match price {
            Value::String(s) => s.parse::<Decimal>().ok(),
            Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
            _ => None,
        }
        .ok_or_else(|| GatewayError::Payload(format!("unparseable price: {price}")))?;

        Ok(PricePoint {
            timestamp,
            value,
            source: PriceSource::Purchased,
        })
    }
}

#[async_trait]
pub trait MeteredGateway: Send + Sync {
    async fn purchase(
        &self,
        item_id: &str,
        params: &ParameterTemplate,
        price: Decimal,
        payment_method: &str,
    ) -> Result<PurchaseReceipt, GatewayError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseResponse {
    payload: Value,
    cost_charged: Decimal,
}

/// HTTP client for a Fluora-style monetized data endpoint
pub struct FluoraGateway {
    client: reqwest::Client,
    base_url: String,
}

impl FluoraGateway {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn classify(e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl MeteredGateway for FluoraGateway {
    async fn purchase(
        &self,
        item_id: &str,
        params: &ParameterTemplate,
        price: Decimal,
        payment_method: &str,
    ) -> Result<PurchaseReceipt, GatewayError> {
        let url = format!("{}/make-purchase", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "itemId": item_id,
            "params": params,
            "itemPrice": price.to_string(),
            "paymentMethod": payment_method,
        });

        debug!(item_id, %price, "Purchasing from gateway");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if status == reqwest::StatusCode::PAYMENT_REQUIRED {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Payment(detail));
        }
        if !status.is_success() {
            return Err(GatewayError::Transport(format!("gateway returned {status}")));
        }

        let parsed: PurchaseResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Payload(e.to_string()))?;

        info!(item_id, cost = %parsed.cost_charged, "Purchase completed");
        Ok(PurchaseReceipt {
            payload: parsed.payload,
            cost_charged: parsed.cost_charged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn price_point_extraction_accepts_string_and_number() {
        let from_string = PurchaseReceipt {
            payload: json!({"timestamp": 1_700_000_000_000i64, "price": "151.25"}),
            cost_charged: dec!(0.001),
        };
        let point = from_string.price_point().unwrap();
        assert_eq!(point.timestamp, 1_700_000_000_000);
        assert_eq!(point.value, dec!(151.25));
        assert_eq!(point.source, PriceSource::Purchased);

        let from_number = PurchaseReceipt {
            payload: json!({"timestamp": 5, "price": 150.5}),
            cost_charged: dec!(0.001),
        };
        assert_eq!(from_number.price_point().unwrap().value, dec!(150.5));
    }

    #[test]
    fn malformed_payload_is_a_payload_error() {
        let missing_price = PurchaseReceipt {
            payload: json!({"timestamp": 5}),
            cost_charged: dec!(0.001),
        };
        let err = missing_price.price_point().unwrap_err();
        assert!(matches!(err, GatewayError::Payload(_)));
        assert!(!err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn error_classification() {
        assert!(GatewayError::Payment("wallet empty".into()).is_fatal());
        assert!(!GatewayError::Payment("wallet empty".into()).is_retryable());
        assert!(GatewayError::Timeout.is_retryable());
        assert!(GatewayError::Transport("connection reset".into()).is_retryable());
    }

    #[test]
    fn purchase_response_parses_camel_case() {
        let parsed: PurchaseResponse = serde_json::from_value(json!({
            "payload": {"timestamp": 1, "price": "2.5"},
            "costCharged": "0.001"
        }))
        .unwrap();
        assert_eq!(parsed.cost_charged, dec!(0.001));
    }
}
