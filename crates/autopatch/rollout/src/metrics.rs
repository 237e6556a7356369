//! Health metrics seam and the built-in samplers

use crate::error::{Result, RolloutError};
use async_trait::async_trait;
use autopatch_types::HealthMetrics;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use serde::Deserialize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, instrument};

/// Source of health samples for a version receiving traffic
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn sample(&self, component: &str, version: &str, percentage: u8) -> Result<HealthMetrics>;
}

/// Returns the same sample every time, optionally switching to a second
/// sample once traffic reaches a given percentage.
#[derive(Debug, Clone)]
pub struct StaticMetricsProvider {
    sample: HealthMetrics,
    degraded: Option<(u8, HealthMetrics)>,
}

impl StaticMetricsProvider {
    pub fn new(sample: HealthMetrics) -> Self {
        Self {
            sample,
            degraded: None,
        }
    }

    /// 0.1% errors at 80ms
    pub fn healthy() -> Self {
        Self::new(HealthMetrics::new(0.001, 80.0))
    }

    /// Report `sample` at `percentage` and above
    pub fn degrading_at(mut self, percentage: u8, sample: HealthMetrics) -> Self {
        self.degraded = Some((percentage, sample));
        self
    }
}

#[async_trait]
impl MetricsProvider for StaticMetricsProvider {
    async fn sample(&self, _component: &str, _version: &str, percentage: u8) -> Result<HealthMetrics> {
        let sample = match &self.degraded {
            Some((threshold, degraded)) if percentage >= *threshold => degraded,
            _ => &self.sample,
        };
        Ok(HealthMetrics {
            sampled_at: Utc::now(),
            ..sample.clone()
        })
    }
}

/// Jittered, plausible samples for dry runs
#[derive(Debug)]
pub struct SyntheticMetricsProvider {
    rng: Mutex<StdRng>,
    base_error_rate: f64,
    base_response_ms: f64,
}

impl SyntheticMetricsProvider {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible sequence of samples
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            base_error_rate: 0.002,
            base_response_ms: 120.0,
        }
    }

    pub fn with_baseline(mut self, error_rate: f64, response_ms: f64) -> Self {
        self.base_error_rate = error_rate;
        self.base_response_ms = response_ms;
        self
    }
}

impl Default for SyntheticMetricsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsProvider for SyntheticMetricsProvider {
    async fn sample(&self, _component: &str, _version: &str, percentage: u8) -> Result<HealthMetrics> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let load = f64::from(percentage) / 100.0;
        Ok(HealthMetrics {
            error_rate: (self.base_error_rate * rng.gen_range(0.5..1.5)).clamp(0.0, 1.0),
            response_time_ms: self.base_response_ms * rng.gen_range(0.8..1.25),
            cpu_percent: 20.0 + 40.0 * load + rng.gen_range(0.0..10.0),
            memory_percent: 35.0 + 25.0 * load + rng.gen_range(0.0..5.0),
            request_rate: 1000.0 * load * rng.gen_range(0.9..1.1),
            sampled_at: Utc::now(),
        })
    }
}

// ── HTTP ───────────────────────────────────────────────────────────────

/// Samples health from a metrics endpoint.
///
/// `GET {endpoint}?component=..&version=..&percentage=..` must answer with
/// a JSON object carrying at least `error_rate` and `response_time_ms`.
#[derive(Debug, Clone)]
pub struct HttpMetricsProvider {
    endpoint: String,
    client: Client,
    bearer_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetricsDocument {
    error_rate: f64,
    response_time_ms: f64,
    #[serde(default)]
    cpu_percent: f64,
    #[serde(default)]
    memory_percent: f64,
    #[serde(default)]
    request_rate: f64,
    #[serde(default)]
    sampled_at: Option<DateTime<Utc>>,
}

impl HttpMetricsProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MetricsProvider for HttpMetricsProvider {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn sample(&self, component: &str, version: &str, percentage: u8) -> Result<HealthMetrics> {
        let failed = |reason: String| RolloutError::Metrics {
            component: component.to_string(),
            reason,
        };

        let mut request = self.client.get(&self.endpoint).query(&[
            ("component", component.to_string()),
            ("version", version.to_string()),
            ("percentage", percentage.to_string()),
        ]);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("GET {} returned {status}", self.endpoint)));
        }
        let document: MetricsDocument = response
            .json()
            .await
            .map_err(|e| failed(format!("malformed metrics document: {e}")))?;
        if !(0.0..=1.0).contains(&document.error_rate) {
            return Err(failed(format!(
                "error rate {} is outside 0.0-1.0",
                document.error_rate
            )));
        }

        debug!(
            error_rate = document.error_rate,
            response_time_ms = document.response_time_ms,
            "Sampled health"
        );
        Ok(HealthMetrics {
            error_rate: document.error_rate,
            response_time_ms: document.response_time_ms,
            cpu_percent: document.cpu_percent,
            memory_percent: document.memory_percent,
            request_rate: document.request_rate,
            sampled_at: document.sampled_at.unwrap_or_else(Utc::now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_degrades_from_threshold() {
        let provider =
            StaticMetricsProvider::healthy().degrading_at(50, HealthMetrics::new(0.2, 90.0));
        assert!(provider.sample("svc", "1.0.0", 25).await.unwrap().error_rate < 0.01);
        assert!((provider.sample("svc", "1.0.0", 50).await.unwrap().error_rate - 0.2).abs() < 1e-9);
        assert!((provider.sample("svc", "1.0.0", 100).await.unwrap().error_rate - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn synthetic_samples_stay_within_default_limits() {
        let provider = SyntheticMetricsProvider::seeded(7);
        for percentage in [10u8, 50, 100] {
            let sample = provider.sample("svc", "1.0.0", percentage).await.unwrap();
            assert!(sample.breach(0.05, 500.0).is_none(), "{sample:?}");
            assert!(sample.request_rate > 0.0);
        }
    }
}
