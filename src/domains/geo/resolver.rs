//! Address resolution with caching, a process-wide rate limit, bounded
//! retries, and a deterministic fallback for when the provider cannot help.

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::GeocodingConfig;
use crate::domains::geo::cache::TtlCache;
use crate::domains::geo::limiter::RateLimiter;
use crate::domains::geo::ports::GeocodeProvider;
use crate::domains::geo::types::{AccuracyTier, BatchResolution, GeoPoint, GeocodeResult};

pub struct GeoResolver {
    provider: Arc<dyn GeocodeProvider>,
    cache: TtlCache<String, GeocodeResult>,
    limiter: Arc<RateLimiter>,
    config: GeocodingConfig,
}

impl GeoResolver {
    pub fn new(
        provider: Arc<dyn GeocodeProvider>,
        limiter: Arc<RateLimiter>,
        config: GeocodingConfig,
    ) -> Self {
        let ttl = Duration::days(config.cache_ttl_days);
        Self {
            provider,
            cache: TtlCache::new(ttl),
            limiter,
            config,
        }
    }

    /// Resolves one address. Cache first, then a single rate-limited provider
    /// lookup with bounded retries on transient failures. Never errors:
    /// empty or unresolvable input yields `None`.
    pub async fn resolve(&self, address: &str) -> Option<GeocodeResult> {
        let normalized = Self::normalize(address);
        if normalized.is_empty() {
            return None;
        }
        if let Some(cached) = self.cache.get(&normalized, Utc::now()) {
            return Some(cached);
        }
        let result = self.lookup(address).await?;
        self.cache.insert(normalized, result.clone(), Utc::now());
        Some(result)
    }

    /// Resolves many addresses, rate-limiting only the uncached subset.
    /// Uncached addresses are processed in fixed-size batches with
    /// inter-item and inter-batch delays.
    pub async fn resolve_batch(&self, addresses: &[String]) -> Vec<BatchResolution> {
        let now = Utc::now();
        let mut resolutions: Vec<BatchResolution> = Vec::with_capacity(addresses.len());
        let mut uncached: Vec<usize> = Vec::new();

        for (i, address) in addresses.iter().enumerate() {
            let normalized = Self::normalize(address);
            let cached = if normalized.is_empty() {
                None
            } else {
                self.cache.get(&normalized, now)
            };
            let from_cache = cached.is_some();
            if !from_cache {
                uncached.push(i);
            }
            resolutions.push(BatchResolution {
                address: address.clone(),
                result: cached,
                from_cache,
            });
        }

        for (batch_index, batch) in uncached.chunks(self.config.batch_size.max(1)).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.config.batch_pause_ms))
                    .await;
            }
            for (item_index, &i) in batch.iter().enumerate() {
                if item_index > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(
                        self.config.batch_item_delay_ms,
                    ))
                    .await;
                }
                resolutions[i].result = self.resolve(&resolutions[i].address).await;
            }
        }

        resolutions
    }

    /// Always returns synchronously usable coordinates: cached values where
    /// available, deterministic fallback coordinates otherwise. Uncached
    /// addresses are queued for background resolution without blocking the
    /// caller.
    pub fn resolve_with_fallback(self: &Arc<Self>, addresses: &[String]) -> Vec<GeoPoint> {
        let now = Utc::now();
        let mut points = Vec::with_capacity(addresses.len());
        let mut misses: Vec<String> = Vec::new();

        for address in addresses {
            let normalized = Self::normalize(address);
            match self.cache.get(&normalized, now) {
                Some(cached) => points.push(cached.point),
                None => {
                    points.push(self.fallback_point(address));
                    if !normalized.is_empty() && !misses.contains(address) {
                        misses.push(address.clone());
                    }
                }
            }
        }

        if !misses.is_empty() {
            debug!(count = misses.len(), "queueing background geocoding for uncached addresses");
            let resolver = Arc::clone(self);
            tokio::spawn(async move {
                resolver.resolve_batch(&misses).await;
            });
        }

        points
    }

    /// Deterministic pseudo-coordinate inside a bounded region around the
    /// configured default center. Seeded from the normalized address so the
    /// same address always lands on the same point, with enough jitter that
    /// distinct addresses do not overlap exactly.
    pub fn fallback_point(&self, address: &str) -> GeoPoint {
        let normalized = Self::normalize(address);
        let mut hasher = DefaultHasher::new();
        normalized.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());

        let spread = self.config.fallback_spread_deg;
        let [lat, lon] = self.config.default_center;
        GeoPoint::new(
            lat + rng.gen_range(-spread..=spread),
            lon + rng.gen_range(-spread..=spread),
        )
    }

    pub fn cached_addresses(&self) -> usize {
        self.cache.len()
    }

    async fn lookup(&self, address: &str) -> Option<GeocodeResult> {
        let mut backoff_ms: u64 = 500;
        for attempt in 0..=self.config.max_retries {
            self.limiter.acquire().await;
            match self.provider.search(address).await {
                Ok(candidates) => {
                    let best = candidates
                        .into_iter()
                        .filter(|c| c.point.is_valid())
                        .max_by(|a, b| {
                            a.confidence
                                .partial_cmp(&b.confidence)
                                .unwrap_or(std::cmp::Ordering::Equal)
                        })?;
                    return Some(GeocodeResult {
                        point: best.point,
                        accuracy: AccuracyTier::from_confidence(best.confidence),
                        confidence: best.confidence,
                        locality: best.locality,
                        resolved_at: Utc::now(),
                    });
                }
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    warn!(address, attempt, error = %e, "transient geocoding failure, backing off");
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
                Err(e) => {
                    warn!(address, error = %e, "geocoding failed");
                    return None;
                }
            }
        }
        None
    }

    fn normalize(address: &str) -> String {
        address.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverResolves;

    #[async_trait::async_trait]
    impl GeocodeProvider for NeverResolves {
        async fn search(
            &self,
            _address: &str,
        ) -> crate::common::DomainResult<Vec<crate::domains::geo::types::GeocodeCandidate>> {
            Ok(Vec::new())
        }
    }

    fn resolver() -> Arc<GeoResolver> {
        let config = crate::config::Config::default().geocoding;
        let limiter = Arc::new(RateLimiter::new(std::time::Duration::from_millis(0)));
        Arc::new(GeoResolver::new(Arc::new(NeverResolves), limiter, config))
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let r = resolver();
        let a = r.fallback_point("123 Main St");
        let b = r.fallback_point("  123  main st ");
        assert_eq!(a, b, "normalization should collapse to the same seed");
    }

    #[test]
    fn test_fallback_distinct_addresses_differ() {
        let r = resolver();
        let a = r.fallback_point("123 Main St");
        let b = r.fallback_point("456 Queen St");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fallback_stays_in_region() {
        let r = resolver();
        let config = crate::config::Config::default().geocoding;
        let p = r.fallback_point("somewhere far away");
        assert!((p.lat - config.default_center[0]).abs() <= config.fallback_spread_deg);
        assert!((p.lon - config.default_center[1]).abs() <= config.fallback_spread_deg);
    }

    #[tokio::test]
    async fn test_empty_address_resolves_to_none() {
        let r = resolver();
        assert!(r.resolve("   ").await.is_none());
    }
}
