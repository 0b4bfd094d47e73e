//! # Routing Module
//!
//! Provider selection for a single logical request. The router receives the
//! list of providers the caller has already deemed *eligible* (not open-circuit,
//! not over its concurrency cap, health known) and picks exactly one, or `None`
//! if the list is empty.
//!
//! ## Strategies
//!
//! - **`CostOptimized`** (default): minimizes `input_cost + output_cost`. Falls
//!   back to round-robin when cost data is missing for a provider.
//! - **`Performance`**: minimizes `avg_response_time_ms / max(success_rate, 0.1)`.
//! - **`RoundRobin`**: cycles providers, keyed by `context.model` (or `"default"`
//!   when unset) — each key keeps its own counter.
//! - **`HealthBased`**: prefers healthy providers, then degraded, then anything;
//!   round-robins within the chosen health tier.
//! - **`Weighted`**: weighted-random selection where
//!   `weight = success_rate * health_multiplier` (healthy=1.0, degraded=0.5,
//!   else=0.1), floored at 0.01.
//!
//! `CostOptimized` and `Performance` are deterministic for a fixed stats
//! snapshot; `RoundRobin` is deterministic given call history; `HealthBased`
//! and `Weighted` may not be. Ties are broken by first occurrence in the
//! eligible list.
//!
//! An optional selection cache (`(strategy, model, sorted eligible names) ->
//! provider`) avoids recomputation within a short window; entries are
//! invalidated if the cached provider is no longer healthy.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Routing strategy for provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingStrategy {
    /// Cheapest provider by input+output cost; round-robin if cost unknown.
    CostOptimized,
    /// Best `avg_response_time_ms / success_rate` ratio.
    Performance,
    /// Per-key round-robin, keyed by model.
    RoundRobin,
    /// Healthiest tier first, round-robin within it.
    HealthBased,
    /// Weighted-random by success rate and health.
    Weighted,
}

impl Default for RoutingStrategy {
    fn default() -> Self {
        Self::CostOptimized
    }
}

/// Health as tracked by the provider registry, mirrored here so the router
/// doesn't need a dependency on the registry module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// `healthy=1.0, degraded=0.5, unknown/unhealthy=0.1` as used by the
    /// weighted strategy.
    fn multiplier(self) -> f64 {
        match self {
            HealthStatus::Healthy => 1.0,
            HealthStatus::Degraded => 0.5,
            HealthStatus::Unknown | HealthStatus::Unhealthy => 0.1,
        }
    }

    /// Tier ordering used by `HealthBased`: lower is preferred.
    fn tier(self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unknown | HealthStatus::Unhealthy => 2,
        }
    }
}

/// Per-1K-token cost for a model, used by `CostOptimized`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProviderCost {
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

/// A provider the caller has already admitted as eligible for this request.
#[derive(Debug, Clone)]
pub struct EligibleProvider {
    pub name: String,
    pub health_status: HealthStatus,
    pub cost: Option<ProviderCost>,
}

impl EligibleProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            health_status: HealthStatus::Unknown,
            cost: None,
        }
    }

    pub fn with_health(mut self, health_status: HealthStatus) -> Self {
        self.health_status = health_status;
        self
    }

    pub fn with_cost(mut self, cost: ProviderCost) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// Context information for routing decisions.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    pub model: Option<String>,
    pub user_region: Option<String>,
    pub request_size: u32,
    pub estimated_tokens: u32,
    pub user_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Provider selection result.
#[derive(Debug, Clone)]
pub struct ProviderSelection {
    pub provider_id: String,
    pub weight: f32,
    pub reason: String,
}

/// Rolling performance statistics for a provider, updated after every call.
#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_latency_ms: f64,
}

impl ProviderStats {
    /// Returns 1.0 (optimistic) when nothing has been observed yet.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }
}

struct CacheEntry {
    provider_id: String,
    inserted_at: Instant,
}

/// Router for provider selection under a single [`RoutingStrategy`].
///
/// All internal state uses interior mutability so `select_provider` can be
/// called while holding only a shared reference (the gateway keeps the
/// router behind an `RwLock` and selects under a read lock).
pub struct Router {
    strategy: RoutingStrategy,
    provider_stats: DashMap<String, ProviderStats>,
    round_robin_counters: DashMap<String, AtomicU64>,
    selection_cache: DashMap<String, CacheEntry>,
    cache_ttl: Duration,
}

impl Router {
    pub fn new(strategy: RoutingStrategy) -> Self {
        Self {
            strategy,
            provider_stats: DashMap::new(),
            round_robin_counters: DashMap::new(),
            selection_cache: DashMap::new(),
            cache_ttl: Duration::from_secs(60),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn strategy(&self) -> RoutingStrategy {
        self.strategy
    }

    /// Select a provider from `eligible` for this request. `eligible` must
    /// already reflect admission control (circuit state, concurrency caps);
    /// the router itself does not re-check health beyond what's in the list.
    pub fn select_provider(
        &self,
        eligible: &[EligibleProvider],
        context: &RoutingContext,
    ) -> Option<ProviderSelection> {
        if eligible.is_empty() {
            return None;
        }

        // Only the strategies that are deterministic over a fixed metrics
        // snapshot are safe to cache. Caching `RoundRobin`, `HealthBased`,
        // or `Weighted` would freeze their per-call cycling or randomness
        // onto whatever was picked first.
        let cacheable = matches!(self.strategy, RoutingStrategy::CostOptimized | RoutingStrategy::Performance);

        let cache_key = cacheable.then(|| self.cache_key(eligible, context));
        if let Some(key) = &cache_key {
            if let Some(cached) = self.lookup_cache(key, eligible) {
                return Some(cached);
            }
        }

        let selection = match self.strategy {
            RoutingStrategy::CostOptimized => self.select_cost_optimized(eligible, context),
            RoutingStrategy::Performance => self.select_performance(eligible),
            RoutingStrategy::RoundRobin => self.select_round_robin(eligible, context),
            RoutingStrategy::HealthBased => self.select_health_based(eligible, context),
            RoutingStrategy::Weighted => self.select_weighted(eligible),
        };

        if let (Some(key), Some(selection)) = (cache_key, &selection) {
            self.selection_cache.insert(
                key,
                CacheEntry {
                    provider_id: selection.provider_id.clone(),
                    inserted_at: Instant::now(),
                },
            );
        }

        selection
    }

    fn cache_key(&self, eligible: &[EligibleProvider], context: &RoutingContext) -> String {
        let mut names: Vec<&str> = eligible.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        format!(
            "{:?}:{}:{}",
            self.strategy,
            context.model.as_deref().unwrap_or("default"),
            names.join(",")
        )
    }

    fn lookup_cache(
        &self,
        cache_key: &str,
        eligible: &[EligibleProvider],
    ) -> Option<ProviderSelection> {
        let entry = self.selection_cache.get(cache_key)?;
        if entry.inserted_at.elapsed() >= self.cache_ttl {
            drop(entry);
            self.selection_cache.remove(cache_key);
            return None;
        }
        let cached = eligible.iter().find(|p| p.name == entry.provider_id)?;
        if cached.health_status == HealthStatus::Unhealthy {
            let id = entry.provider_id.clone();
            drop(entry);
            self.selection_cache.remove(cache_key);
            return None;
        }
        Some(ProviderSelection {
            provider_id: entry.provider_id.clone(),
            weight: 1.0,
            reason: "Cached selection".to_string(),
        })
    }

    fn select_cost_optimized(
        &self,
        eligible: &[EligibleProvider],
        context: &RoutingContext,
    ) -> Option<ProviderSelection> {
        let mut cheapest: Option<(&EligibleProvider, f64)> = None;
        for provider in eligible {
            let Some(cost) = provider.cost else { continue };
            let total = cost.input_cost_per_1k + cost.output_cost_per_1k;
            match cheapest {
                Some((_, best)) if total >= best => {}
                _ => cheapest = Some((provider, total)),
            }
        }

        match cheapest {
            Some((provider, total)) => Some(ProviderSelection {
                provider_id: provider.name.clone(),
                weight: 1.0,
                reason: format!("Cost-optimized selection (cost: {total:.4}/1k tokens)"),
            }),
            None => {
                // No cost data available for any eligible provider.
                self.select_round_robin(eligible, context)
            }
        }
    }

    fn select_performance(&self, eligible: &[EligibleProvider]) -> Option<ProviderSelection> {
        let mut best: Option<(&EligibleProvider, f64)> = None;
        for provider in eligible {
            let stats = self.provider_stats.get(&provider.name);
            let (avg_latency, success_rate) = stats
                .map(|s| (s.average_latency_ms, s.success_rate()))
                .unwrap_or((0.0, 1.0));
            let score = avg_latency / success_rate.max(0.1);
            match best {
                Some((_, best_score)) if score >= best_score => {}
                _ => best = Some((provider, score)),
            }
        }

        best.map(|(provider, score)| ProviderSelection {
            provider_id: provider.name.clone(),
            weight: 1.0,
            reason: format!("Performance selection (score: {score:.2})"),
        })
    }

    fn select_round_robin(
        &self,
        eligible: &[EligibleProvider],
        context: &RoutingContext,
    ) -> Option<ProviderSelection> {
        let key = context.model.clone().unwrap_or_else(|| "default".to_string());
        let counter = self
            .round_robin_counters
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0));
        let index = counter.fetch_add(1, Ordering::Relaxed) as usize % eligible.len();

        Some(ProviderSelection {
            provider_id: eligible[index].name.clone(),
            weight: 1.0 / eligible.len() as f32,
            reason: "Round-robin selection".to_string(),
        })
    }

    fn select_health_based(
        &self,
        eligible: &[EligibleProvider],
        context: &RoutingContext,
    ) -> Option<ProviderSelection> {
        let best_tier = eligible.iter().map(|p| p.health_status.tier()).min()?;
        let subset: Vec<EligibleProvider> = eligible
            .iter()
            .filter(|p| p.health_status.tier() == best_tier)
            .cloned()
            .collect();

        self.select_round_robin(&subset, context)
    }

    fn select_weighted(&self, eligible: &[EligibleProvider]) -> Option<ProviderSelection> {
        let weights: Vec<f64> = eligible
            .iter()
            .map(|p| {
                let success_rate = self
                    .provider_stats
                    .get(&p.name)
                    .map(|s| s.success_rate())
                    .unwrap_or(1.0);
                (success_rate * p.health_status.multiplier()).max(0.01)
            })
            .collect();

        let total_weight: f64 = weights.iter().sum();
        if total_weight <= 0.0 {
            return None;
        }

        let mut rng = rand::thread_rng();
        let mut roll = rand::Rng::gen_range(&mut rng, 0.0..total_weight);

        for (provider, weight) in eligible.iter().zip(weights.iter()) {
            if roll < *weight {
                return Some(ProviderSelection {
                    provider_id: provider.name.clone(),
                    weight: (*weight / total_weight) as f32,
                    reason: format!("Weighted selection (weight: {:.3})", weight / total_weight),
                });
            }
            roll -= weight;
        }

        eligible.last().map(|provider| ProviderSelection {
            provider_id: provider.name.clone(),
            weight: (weights.last().copied().unwrap_or(0.0) / total_weight) as f32,
            reason: "Weighted selection fallback".to_string(),
        })
    }

    /// Record the outcome of a completed call for performance/weighted scoring.
    pub fn update_stats(&self, provider_id: &str, success: bool, latency_ms: u64) {
        let mut stats = self.provider_stats.entry(provider_id.to_string()).or_default();
        stats.total_requests += 1;
        if success {
            stats.successful_requests += 1;
        } else {
            stats.failed_requests += 1;
        }

        // Exponential moving average, matching how latency is tracked elsewhere
        // in the stack.
        let alpha = 0.1;
        stats.average_latency_ms =
            alpha * latency_ms as f64 + (1.0 - alpha) * stats.average_latency_ms;
    }

    pub fn get_stats(&self, provider_id: &str) -> Option<ProviderStats> {
        self.provider_stats.get(provider_id).map(|s| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eligible(names: &[&str]) -> Vec<EligibleProvider> {
        names.iter().map(|n| EligibleProvider::new(*n)).collect()
    }

    #[test]
    fn cost_optimized_picks_cheapest() {
        let router = Router::new(RoutingStrategy::CostOptimized);
        let providers = vec![
            EligibleProvider::new("a").with_cost(ProviderCost {
                input_cost_per_1k: 1.0,
                output_cost_per_1k: 2.0,
            }),
            EligibleProvider::new("b").with_cost(ProviderCost {
                input_cost_per_1k: 0.5,
                output_cost_per_1k: 1.0,
            }),
        ];
        let context = RoutingContext::default();
        let selection = router.select_provider(&providers, &context).unwrap();
        assert_eq!(selection.provider_id, "b");
    }

    #[test]
    fn cost_optimized_falls_back_to_round_robin_without_cost_data() {
        let router = Router::new(RoutingStrategy::CostOptimized);
        let providers = eligible(&["a", "b"]);
        let context = RoutingContext::default();
        let first = router.select_provider(&providers, &context).unwrap();
        assert!(["a", "b"].contains(&first.provider_id.as_str()));
    }

    #[test]
    fn round_robin_cycles_through_providers_by_key() {
        let router = Router::new(RoutingStrategy::RoundRobin);
        let providers = eligible(&["a", "b", "c"]);
        let context = RoutingContext {
            model: Some("gpt-4".to_string()),
            ..Default::default()
        };

        let picks: Vec<String> = (0..6)
            .map(|_| {
                router
                    .select_provider(&providers, &context)
                    .unwrap()
                    .provider_id
            })
            .collect();

        assert_eq!(picks, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn round_robin_keeps_separate_counters_per_model() {
        let router = Router::new(RoutingStrategy::RoundRobin);
        let providers = eligible(&["a", "b"]);
        let ctx_x = RoutingContext {
            model: Some("x".to_string()),
            ..Default::default()
        };
        let ctx_y = RoutingContext {
            model: Some("y".to_string()),
            ..Default::default()
        };

        assert_eq!(
            router.select_provider(&providers, &ctx_x).unwrap().provider_id,
            "a"
        );
        assert_eq!(
            router.select_provider(&providers, &ctx_y).unwrap().provider_id,
            "a"
        );
        assert_eq!(
            router.select_provider(&providers, &ctx_x).unwrap().provider_id,
            "b"
        );
    }

    #[test]
    fn health_based_prefers_healthy_tier() {
        let router = Router::new(RoutingStrategy::HealthBased);
        let providers = vec![
            EligibleProvider::new("degraded-one").with_health(HealthStatus::Degraded),
            EligibleProvider::new("healthy-one").with_health(HealthStatus::Healthy),
        ];
        let context = RoutingContext::default();
        let selection = router.select_provider(&providers, &context).unwrap();
        assert_eq!(selection.provider_id, "healthy-one");
    }

    #[test]
    fn performance_prefers_lower_latency_and_higher_success() {
        let router = Router::new(RoutingStrategy::Performance);
        router.update_stats("slow", true, 900);
        router.update_stats("fast", true, 100);
        let providers = eligible(&["slow", "fast"]);
        let context = RoutingContext::default();
        let selection = router.select_provider(&providers, &context).unwrap();
        assert_eq!(selection.provider_id, "fast");
    }

    #[test]
    fn empty_eligible_list_yields_none() {
        let router = Router::new(RoutingStrategy::CostOptimized);
        assert!(router
            .select_provider(&[], &RoutingContext::default())
            .is_none());
    }
}
