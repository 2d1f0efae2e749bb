use serde::Serialize;

use crate::aggregate::NetworkAggregate;
use crate::config::InsightConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Optimization,
}

/// One operator-facing observation about the cluster, paired with what to
/// do about it.
#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub severity: Severity,
    pub message: String,
    pub suggested_action: String,
}

/// Derive the cycle's insight list from the aggregate view.
///
/// Rules run in a fixed order (throughput, stake concentration, critical
/// nodes) so the list reads the same way every cycle. The throughput rule
/// always emits one entry, either the warning or the all-clear, so the
/// panel is never empty. The caller replaces the previous list wholesale;
/// insights describe the current cycle only and are never accumulated.
pub fn derive_insights(aggregate: &NetworkAggregate, config: &InsightConfig) -> Vec<Insight> {
    let mut insights = Vec::new();

    if aggregate.transactions_per_second < config.tps_warning_threshold {
        insights.push(Insight {
            severity: Severity::Warning,
            message: format!(
                "Cluster throughput is {:.0} TPS, under the {:.0} TPS floor",
                aggregate.transactions_per_second, config.tps_warning_threshold
            ),
            suggested_action: "Check recent performance samples for stalled or overloaded leaders"
                .to_string(),
        });
    } else {
        insights.push(Insight {
            severity: Severity::Optimization,
            message: format!(
                "Cluster throughput is healthy at {:.0} TPS",
                aggregate.transactions_per_second
            ),
            suggested_action: "No action needed, keep watching the trend".to_string(),
        });
    }

    if aggregate.nakamoto_coefficient <= config.min_nakamoto_coefficient as u64 {
        insights.push(Insight {
            severity: Severity::Warning,
            message: format!(
                "Stake is concentrated: {} holder(s) control a third of all activated stake",
                aggregate.nakamoto_coefficient
            ),
            suggested_action: "Encourage delegation away from the largest stake holders".to_string(),
        });
    }

    if aggregate.risk.critical > 0 {
        insights.push(Insight {
            severity: Severity::Critical,
            message: format!("{} node(s) scored in the critical tier", aggregate.risk.critical),
            suggested_action: "Inspect the affected nodes for skipped slots and vote lag"
                .to_string(),
        });
    }

    insights
}
