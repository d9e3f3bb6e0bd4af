//! Clock skew against the provider's time endpoint

use async_trait::async_trait;
use lessor_gateway_api::{ClockSkewSource, GatewayError, GatewayResult};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Asks the provider for its current time and compares it with ours.
///
/// The endpoint answers a POST with JSON carrying `server_time`, either at
/// the top level or inside a `response` object, as a number or a string.
pub struct HttpSkewSource {
    client: Client,
    url: String,
}

impl HttpSkewSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ClockSkewSource for HttpSkewSource {
    async fn skew_seconds(&self) -> GatewayResult<i64> {
        debug!(url = %self.url, "Querying provider time");

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Network(format!("time endpoint returned {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        let server_time = parse_server_time(&body)?;
        let skew = skew_against(server_time, lessor_util::now().timestamp())?;
        debug!(server_time, skew, "Provider time received");
        Ok(skew)
    }
}

/// Offset of the provider's clock from `local_time`, both in unix seconds
pub fn skew_against(server_time: i64, local_time: i64) -> GatewayResult<i64> {
    server_time
        .checked_sub(local_time)
        .ok_or_else(|| GatewayError::Parse(format!("server_time out of range: {}", server_time)))
}

/// Extract `server_time` from a time endpoint response
pub fn parse_server_time(body: &Value) -> GatewayResult<i64> {
    let field = body
        .get("response")
        .and_then(|inner| inner.get("server_time"))
        .or_else(|| body.get("server_time"))
        .ok_or_else(|| GatewayError::Parse("missing server_time".into()))?;

    match field {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| GatewayError::Parse(format!("server_time out of range: {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| GatewayError::Parse(format!("server_time is not a number: {}", s))),
        other => Err(GatewayError::Parse(format!("unexpected server_time: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_time_as_string_inside_response() {
        let body = json!({"response": {"server_time": "1700000000", "skew_tolerance_seconds": "60"}});
        assert_eq!(parse_server_time(&body).unwrap(), 1_700_000_000);
    }

    #[test]
    fn server_time_as_top_level_number() {
        let body = json!({"server_time": 1700000123});
        assert_eq!(parse_server_time(&body).unwrap(), 1_700_000_123);
    }

    #[test]
    fn malformed_server_time() {
        assert!(matches!(
            parse_server_time(&json!({"response": {}})),
            Err(GatewayError::Parse(_))
        ));
        assert!(matches!(
            parse_server_time(&json!({"server_time": "soon"})),
            Err(GatewayError::Parse(_))
        ));
        assert!(matches!(
            parse_server_time(&json!({"server_time": [1]})),
            Err(GatewayError::Parse(_))
        ));
    }

    #[test]
    fn skew_overflow_is_a_parse_error() {
        assert_eq!(skew_against(1_700_000_030, 1_700_000_000).unwrap(), 30);
        assert!(matches!(
            skew_against(i64::MIN, 1_700_000_000),
            Err(GatewayError::Parse(_))
        ));
        assert!(!GatewayError::Parse(String::new()).is_transient());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        // Nothing listens on the discard port
        let source =
            HttpSkewSource::new("http://127.0.0.1:9/time", Duration::from_millis(500)).unwrap();
        let err = source.skew_seconds().await.unwrap_err();
        assert!(err.is_transient());
    }
}
