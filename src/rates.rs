//! Exchange rates for invoicing quotes priced in another currency.
//!
//! Time is injected through [`Clock`] so expiry is testable without sleeping.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;

use crate::config::RatesConfig;
use crate::error::{InvoiceError, Result};

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[async_trait]
pub trait RateSource: Send + Sync {
    /// Units of `symbol` per one unit of `base`.
    async fn fetch(&self, base: &str, symbol: &str) -> Result<f64>;
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    rates: HashMap<String, f64>,
}

pub struct HttpRateSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRateSource {
    /// `timeout` bounds each request so a stalled endpoint surfaces as
    /// `RateUnavailable` instead of hanging the caller.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InvoiceError::Config(format!("failed to build rate client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fetch(&self, base: &str, symbol: &str) -> Result<f64> {
        let unavailable = |e: reqwest::Error| InvoiceError::RateUnavailable(e.to_string());
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("base", base), ("symbols", symbol)])
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(InvoiceError::RateUnavailable(format!(
                "rate endpoint answered {}",
                response.status()
            )));
        }

        let body: RatesResponse = response.json().await.map_err(unavailable)?;
        body.rates
            .get(symbol)
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or_else(|| InvoiceError::RateUnavailable(format!("no {base}/{symbol} rate in response")))
    }
}

type Pair = (String, String);
type Slot = Arc<tokio::sync::Mutex<Option<(f64, OffsetDateTime)>>>;

pub struct RateCache {
    source: Arc<dyn RateSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    // One async lock per pair: concurrent misses for a pair refresh once,
    // and a slow pair never blocks the others.
    entries: Mutex<HashMap<Pair, Slot>>,
}

impl RateCache {
    pub fn new(source: Arc<dyn RateSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(cfg: &RatesConfig) -> Result<Self> {
        let source = HttpRateSource::new(cfg.endpoint.clone(), Duration::from_secs(cfg.timeout_secs))?;
        Ok(Self::new(
            Arc::new(source),
            Arc::new(SystemClock),
            Duration::from_secs(cfg.ttl_secs),
        ))
    }

    fn slot(&self, key: &Pair) -> Slot {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.entry(key.clone()).or_default().clone()
    }

    pub async fn rate(&self, from: &str, to: &str) -> Result<f64> {
        let from = from.trim().to_ascii_uppercase();
        let to = to.trim().to_ascii_uppercase();
        if from == to {
            return Ok(1.0);
        }

        let key = (from, to);
        let slot = self.slot(&key);
        let mut entry = slot.lock().await;
        let now = self.clock.now();
        if let Some((rate, expires_at)) = *entry {
            if now < expires_at {
                return Ok(rate);
            }
        }

        match self.source.fetch(&key.0, &key.1).await {
            Ok(rate) => {
                tracing::debug!(from = %key.0, to = %key.1, rate, "exchange rate refreshed");
                *entry = Some((rate, now + self.ttl));
                Ok(rate)
            }
            Err(e) => {
                tracing::warn!(from = %key.0, to = %key.1, error = %e, "exchange rate refresh failed");
                *entry = None;
                Err(match e {
                    InvoiceError::RateUnavailable(_) => e,
                    other => InvoiceError::RateUnavailable(other.to_string()),
                })
            }
        }
    }

    pub async fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64> {
        Ok(amount * self.rate(from, to).await?)
    }
}
