//! Prometheus counters for settlement, identity linking and badges

use crate::games::types::GameType;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct ArcadeMetrics {
    registry: Registry,
    rewards_settled: IntCounterVec,
    settlement_failures: IntCounterVec,
    miles_awarded: IntCounter,
    identity_links: IntCounterVec,
    badge_claims: IntCounter,
}

impl ArcadeMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let rewards_settled = IntCounterVec::new(
            Opts::new("meowmiles_rewards_settled_total", "Rewards written to the profile store"),
            &["game"],
        )?;
        let settlement_failures = IntCounterVec::new(
            Opts::new("meowmiles_settlement_failures_total", "Rewards the profile store rejected"),
            &["game"],
        )?;
        let miles_awarded = IntCounter::new("meowmiles_miles_awarded_total", "Miles credited by settlement")?;
        let identity_links = IntCounterVec::new(
            Opts::new("meowmiles_identity_links_total", "Completed OAuth identity links"),
            &["provider"],
        )?;
        let badge_claims = IntCounter::new("meowmiles_badge_claims_total", "Badges claimed")?;

        registry.register(Box::new(rewards_settled.clone()))?;
        registry.register(Box::new(settlement_failures.clone()))?;
        registry.register(Box::new(miles_awarded.clone()))?;
        registry.register(Box::new(identity_links.clone()))?;
        registry.register(Box::new(badge_claims.clone()))?;

        Ok(Self {
            registry,
            rewards_settled,
            settlement_failures,
            miles_awarded,
            identity_links,
            badge_claims,
        })
    }

    pub fn record_settlement(&self, game: GameType, points: u64) {
        self.rewards_settled.with_label_values(&[game.as_str()]).inc();
        self.miles_awarded.inc_by(points);
    }

    pub fn record_settlement_failure(&self, game: GameType) {
        self.settlement_failures.with_label_values(&[game.as_str()]).inc();
    }

    pub fn record_identity_link(&self, provider: &str) {
        self.identity_links.with_label_values(&[provider]).inc();
    }

    pub fn record_badge_claim(&self) {
        self.badge_claims.inc();
    }

    pub fn settled_count(&self, game: GameType) -> u64 {
        self.rewards_settled.with_label_values(&[game.as_str()]).get()
    }

    pub fn failure_count(&self, game: GameType) -> u64 {
        self.settlement_failures.with_label_values(&[game.as_str()]).get()
    }

    /// Prometheus text exposition format
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
