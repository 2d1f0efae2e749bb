use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeoConfig;

/// Location and provider facts for one gossip IP. Everything is optional;
/// the provider answers with whatever it knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub city: Option<String>,
    pub country: Option<String>,
    pub isp: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Wire shape of the ip-api style lookup endpoint.
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    city: Option<String>,
    country: Option<String>,
    isp: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// IP → location resolver with an unbounded in-process cache.
///
/// Scoring never touches this service; the engine enriches already-scored
/// nodes with whatever it returns. A failed lookup yields `None` and is not
/// cached, so the next cycle retries. Disabling via config drops the HTTP
/// client entirely and every resolve becomes a cache-only probe.
pub struct GeoService {
    config: GeoConfig,
    http: Option<reqwest::Client>,
    cache: DashMap<String, GeoInfo>,
    lookups: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
}

impl GeoService {
    pub fn new(config: &GeoConfig) -> anyhow::Result<Self> {
        let http = if config.enabled {
            Some(
                reqwest::Client::builder()
                    .timeout(Duration::from_millis(config.timeout_ms))
                    .build()
                    .context("Failed to build geo lookup client")?,
            )
        } else {
            None
        };

        Ok(Self {
            config: config.clone(),
            http,
            cache: DashMap::new(),
            lookups: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    /// Whether `resolve` would answer from cache without network traffic.
    pub fn is_cached(&self, ip: &str) -> bool {
        self.cache.contains_key(ip)
    }

    /// Resolve one IP, cache first. Network or provider failure is silent:
    /// the node simply stays unlocated this cycle.
    pub async fn resolve(&self, ip: &str) -> Option<GeoInfo> {
        if let Some(hit) = self.cache.get(ip) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Some(hit.clone());
        }

        let info = self.fetch(ip).await?;
        self.cache.insert(ip.to_string(), info.clone());
        Some(info)
    }

    async fn fetch(&self, ip: &str) -> Option<GeoInfo> {
        let http = self.http.as_ref()?;
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let url = format!("{}/{}", self.config.endpoint.trim_end_matches('/'), ip);
        match fetch_inner(http, &url).await {
            Ok(info) => {
                debug!("🌍 Located {}: {:?} / {:?}", ip, info.country, info.isp);
                Some(info)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                debug!("🌍 Geo lookup failed for {}: {}", ip, e);
                None
            }
        }
    }

    pub fn get_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "enabled": self.http.is_some(),
            "cached_ips": self.cache.len(),
            "lookups": self.lookups.load(Ordering::Relaxed),
            "cache_hits": self.cache_hits.load(Ordering::Relaxed),
            "failures": self.failures.load(Ordering::Relaxed),
        })
    }
}

async fn fetch_inner(http: &reqwest::Client, url: &str) -> anyhow::Result<GeoInfo> {
    let response: IpApiResponse = http
        .get(url)
        .send()
        .await
        .context("Geo lookup request failed")?
        .json()
        .await
        .context("Geo lookup returned unparseable body")?;

    if response.status != "success" {
        anyhow::bail!("provider answered with status {:?}", response.status);
    }

    Ok(GeoInfo {
        city: response.city,
        country: response.country,
        isp: response.isp,
        lat: response.lat,
        lon: response.lon,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(enabled: bool) -> GeoConfig {
        GeoConfig {
            enabled,
            endpoint: "http://ip-api.invalid/json".to_string(),
            timeout_ms: 100,
            max_lookups_per_cycle: 40,
        }
    }

    fn info(isp: &str) -> GeoInfo {
        GeoInfo {
            city: Some("Falkenstein".to_string()),
            country: Some("Germany".to_string()),
            isp: Some(isp.to_string()),
            lat: Some(50.4779),
            lon: Some(12.3713),
        }
    }

    #[tokio::test]
    async fn test_disabled_service_resolves_nothing() {
        let service = GeoService::new(&test_config(false)).unwrap();
        assert!(service.resolve("1.2.3.4").await.is_none());
        assert_eq!(service.get_stats()["lookups"], 0);
    }

    #[tokio::test]
    async fn test_cache_answers_before_network() {
        // Seed the cache directly; a hit must not touch the client at all,
        // which is why this passes even with no HTTP client built
        let service = GeoService::new(&test_config(false)).unwrap();
        service.cache.insert("1.2.3.4".to_string(), info("Hetzner"));

        let resolved = service.resolve("1.2.3.4").await;
        assert_eq!(resolved, Some(info("Hetzner")));
        assert!(service.is_cached("1.2.3.4"));
        assert_eq!(service.get_stats()["cache_hits"], 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_not_cached() {
        // .invalid never resolves, so the fetch fails fast
        let service = GeoService::new(&test_config(true)).unwrap();

        assert!(service.resolve("9.9.9.9").await.is_none());
        assert!(!service.is_cached("9.9.9.9"), "failures must not poison the cache");
        assert_eq!(service.get_stats()["failures"], 1);
    }

    #[test]
    fn test_provider_error_status_is_a_failure() {
        let body = r#"{"status":"fail","message":"private range"}"#;
        let parsed: IpApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.status, "fail");
        assert!(parsed.isp.is_none());
    }
}
