//! Solver-side evaluation results and their summary statistics.

use crate::env::EnvStepInfo;
use crate::log::{create_stats, Stats};
use crate::training::RewardType;
use serde::{Deserialize, Serialize};

/// Metrics of one evaluation rollout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub neg_solving_time: f64,
    pub neg_total_nodes: f64,
    pub primal_dual_integral: f64,
    /// LP bound per separation round, when the environment tracks it
    pub lp_solution_values: Option<Vec<f64>>,
    pub primal_dual_gap: f64,
}

impl EvaluationResult {
    /// Read the metrics out of a finished episode. Missing extras count as 0.
    pub fn from_step_info(info: &EnvStepInfo) -> Self {
        Self {
            neg_solving_time: info.solving_time,
            neg_total_nodes: info.ntotal_nodes,
            primal_dual_integral: info.get("primal_dual_integral").unwrap_or(0.0),
            lp_solution_values: info.get("lp_solution_value").map(|v| vec![v]),
            primal_dual_gap: info.get("primal_dual_gap").unwrap_or(0.0),
        }
    }
}

/// Summary statistics over evaluation rollouts.
///
/// LP solution values are only reported for the `lp_solution_value` reward.
pub fn evaluation_stats(results: &[EvaluationResult], reward_type: RewardType) -> Stats {
    let column = |f: fn(&EvaluationResult) -> f64| results.iter().map(f).collect::<Vec<_>>();

    let mut stats = Stats::new();
    stats.extend(create_stats(
        "evaluating/Neg Solving time",
        &column(|r| r.neg_solving_time),
    ));
    stats.extend(create_stats(
        "evaluating/Neg Total Nodes",
        &column(|r| r.neg_total_nodes),
    ));
    stats.extend(create_stats(
        "evaluating/PrimalDualIntegral",
        &column(|r| r.primal_dual_integral),
    ));
    stats.extend(create_stats(
        "evaluating/primal_dual_gap",
        &column(|r| r.primal_dual_gap),
    ));

    if reward_type == RewardType::LpSolutionValue {
        let lp_values: Vec<f64> = results
            .iter()
            .filter_map(|r| r.lp_solution_values.as_deref())
            .flatten()
            .copied()
            .collect();
        stats.extend(create_stats("evaluating/lp_solution_value", &lp_values));
    }
    stats
}
