// =============================================================================
// Signed REST exchange client — HMAC-SHA256 request signing
// =============================================================================
//
// SECURITY: the secret never appears in logs or serialized output.  The API
// key travels as a header, the signature as a query parameter, and every
// signed request carries a recvWindow to tolerate minor clock drift.
//
// Request signing works over a canonical query: parameters are collected in
// a `QueryParams` list, stamped with timestamp + recvWindow, encoded in
// insertion order, and the HMAC of that exact byte string rides along as the
// final `signature` parameter.
// =============================================================================

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::credentials::ApiCredentials;
use crate::types::{Direction, OrderStatus};

use super::{ExchangeClient, ExchangeError, ExchangeOrderResult, OrderRequest, Position};

type HmacSha256 = Hmac<Sha256>;

/// recv-window sent with every signed request (milliseconds).
const RECV_WINDOW: u64 = 5_000;
/// Transport-level request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Query assembly
// ---------------------------------------------------------------------------

/// Ordered query parameter list.  The encoded form is the canonical string
/// the signature covers, so insertion order is part of the contract.
#[derive(Debug, Default)]
struct QueryParams {
    pairs: Vec<(&'static str, String)>,
}

impl QueryParams {
    fn new() -> Self {
        Self::default()
    }

    fn push(mut self, key: &'static str, value: impl ToString) -> Self {
        self.pairs.push((key, value.to_string()));
        self
    }

    fn encode(&self) -> String {
        let encoded: Vec<String> = self
            .pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        encoded.join("&")
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Spot-style REST client with HMAC-SHA256 request signing.
pub struct SignedRestClient {
    credentials: ApiCredentials,
    base_url: String,
    client: reqwest::Client,
}

impl SignedRestClient {
    /// Build a client for `base_url` signing with `credentials`.
    pub fn new(base_url: impl Into<String>, credentials: ApiCredentials) -> Self {
        let mut default_headers = HeaderMap::new();
        if let Ok(val) = HeaderValue::from_str(&credentials.api_key) {
            default_headers.insert("X-MBX-APIKEY", val);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            credentials,
            base_url: base_url.into(),
            client,
        }
    }

    /// HMAC-SHA256 hex digest of a canonical query string.
    fn sign(&self, canonical: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.credentials.api_secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Full request URL for a signed endpoint: the stamped canonical query
    /// plus its signature.
    fn signed_url(&self, path: &str, params: QueryParams) -> String {
        let canonical = params
            .push("timestamp", unix_millis())
            .push("recvWindow", RECV_WINDOW)
            .encode();
        let signature = self.sign(&canonical);
        format!("{}{path}?{canonical}&signature={signature}", self.base_url)
    }

    fn map_send_error(e: reqwest::Error) -> ExchangeError {
        if e.is_timeout() {
            ExchangeError::Timeout
        } else {
            ExchangeError::Transport(e.to_string())
        }
    }

    async fn read_body(
        resp: reqwest::Response,
    ) -> Result<(reqwest::StatusCode, serde_json::Value), ExchangeError> {
        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;
        Ok((status, body))
    }

    fn rejection(status: reqwest::StatusCode, body: &serde_json::Value) -> ExchangeError {
        let code = body.get("code").and_then(|v| v.as_i64()).unwrap_or(-1);
        let message = body
            .get("msg")
            .and_then(|v| v.as_str())
            .unwrap_or("no message")
            .to_string();
        warn!(%status, code, message, "exchange rejected request");
        ExchangeError::Rejected { code, message }
    }
}

// ---------------------------------------------------------------------------
// Response interpretation
// ---------------------------------------------------------------------------

/// Numeric field that the exchange serialises as a string.
fn numeric_field(value: Option<&serde_json::Value>) -> f64 {
    value
        .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_f64()))
        .unwrap_or(0.0)
}

/// Interpret an HTTP-200 order response.
///
/// Only actual executions count: a resting limit order (`NEW`) comes back
/// `Pending` with zero executed quantity, and an order the exchange closed
/// without executing maps to `Canceled`/`Rejected`.  Nothing here ever
/// reports more quantity than the exchange did.
fn parse_order_response(order: &OrderRequest, body: &serde_json::Value) -> ExchangeOrderResult {
    let executed_quantity = numeric_field(body.get("executedQty"));

    let fills = body
        .get("fills")
        .and_then(|v| v.as_array())
        .map(|fills| fills.as_slice())
        .unwrap_or(&[]);
    let (fill_notional, fill_quantity, commission) =
        fills.iter().fold((0.0, 0.0, 0.0), |(n, q, c), fill| {
            let price = numeric_field(fill.get("price"));
            let qty = numeric_field(fill.get("qty"));
            (n + price * qty, q + qty, c + numeric_field(fill.get("commission")))
        });

    let executed_price = if fill_quantity > 0.0 {
        fill_notional / fill_quantity
    } else if executed_quantity > 0.0 {
        // Executed but no fill breakdown returned; the limit price is the
        // best available estimate.
        order.price.unwrap_or(0.0)
    } else {
        0.0
    };

    let status = match body.get("status").and_then(|v| v.as_str()) {
        Some("FILLED") => OrderStatus::Filled,
        Some("PARTIALLY_FILLED") => OrderStatus::PartiallyFilled,
        Some("CANCELED") | Some("EXPIRED") | Some("PENDING_CANCEL") => OrderStatus::Canceled,
        Some("REJECTED") => OrderStatus::Rejected,
        _ => {
            if executed_quantity > 0.0 && executed_quantity >= order.quantity {
                OrderStatus::Filled
            } else if executed_quantity > 0.0 {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Pending
            }
        }
    };

    ExchangeOrderResult {
        order_id: order.order_id.clone(),
        status,
        executed_quantity,
        executed_price,
        commission,
    }
}

#[async_trait]
impl ExchangeClient for SignedRestClient {
    async fn place_order(&self, order: &OrderRequest) -> Result<ExchangeOrderResult, ExchangeError> {
        let side = match order.direction {
            Direction::Long => "BUY",
            Direction::Short => "SELL",
            Direction::Neutral => {
                return Err(ExchangeError::Rejected {
                    code: -1,
                    message: "order without direction".to_string(),
                })
            }
        };

        let mut params = QueryParams::new()
            .push("symbol", &order.symbol)
            .push("side", side)
            .push("quantity", order.quantity)
            .push("newClientOrderId", &order.order_id);
        params = match order.price {
            Some(price) => params
                .push("type", "LIMIT")
                .push("timeInForce", "GTC")
                .push("price", price),
            None => params.push("type", "MARKET"),
        };

        let url = self.signed_url("/api/v3/order", params);

        debug!(symbol = %order.symbol, side, quantity = order.quantity, "placing order");

        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let (status, body) = Self::read_body(resp).await?;

        if !status.is_success() {
            return Err(Self::rejection(status, &body));
        }

        Ok(parse_order_response(order, &body))
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<bool, ExchangeError> {
        let params = QueryParams::new()
            .push("symbol", symbol)
            .push("origClientOrderId", order_id);
        let url = self.signed_url("/api/v3/order", params);

        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let (status, body) = Self::read_body(resp).await?;

        if !status.is_success() {
            return Err(Self::rejection(status, &body));
        }
        Ok(true)
    }

    async fn get_position(&self, symbol: &str) -> Result<Position, ExchangeError> {
        // Spot-style accounts express exposure as the base-asset balance.
        let url = self.signed_url("/api/v3/account", QueryParams::new());

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let (status, body) = Self::read_body(resp).await?;

        if !status.is_success() {
            return Err(Self::rejection(status, &body));
        }

        let base_asset = symbol.strip_suffix("USDT").unwrap_or(symbol);
        let quantity = body
            .get("balances")
            .and_then(|v| v.as_array())
            .and_then(|balances| {
                balances
                    .iter()
                    .find(|b| b.get("asset").and_then(|a| a.as_str()) == Some(base_asset))
            })
            .map(|b| numeric_field(b.get("free")))
            .unwrap_or(0.0);

        Ok(Position {
            symbol: symbol.to_string(),
            direction: if quantity > 0.0 {
                Direction::Long
            } else {
                Direction::Neutral
            },
            quantity,
            entry_price: 0.0,
        })
    }
}

impl std::fmt::Debug for SignedRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedRestClient")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .finish()
    }
}
