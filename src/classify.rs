use serde::{Deserialize, Serialize};

/// Operational risk tier derived from the reliability index.
///
/// The three tiers partition [0, 100]: below 50 a node needs attention now,
/// 50 to 79 it is limping, at 80 and above it is doing its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Healthy,
    Degraded,
    Critical,
}

/// Recognition badge derived from the reliability index.
///
/// Distinct from the risk tier on purpose: risk answers "does this need
/// attention", the badge answers "how good is this". A node can be healthy
/// (80) without earning gold (90).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeTier {
    Gold,
    Silver,
    Bronze,
    None,
}

pub fn risk_tier(index: u8) -> RiskTier {
    match index {
        0..=49 => RiskTier::Critical,
        50..=79 => RiskTier::Degraded,
        _ => RiskTier::Healthy,
    }
}

pub fn badge_tier(index: u8) -> BadgeTier {
    match index {
        90..=u8::MAX => BadgeTier::Gold,
        75..=89 => BadgeTier::Silver,
        50..=74 => BadgeTier::Bronze,
        _ => BadgeTier::None,
    }
}
