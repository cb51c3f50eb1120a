//! End-to-end checks of the host-side pipeline: rollout aggregation,
//! normalization, checkpoints and evaluation statistics.

use cutsel::prelude::*;
use cutsel::training::minibatch_ranges;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use tempfile::tempdir;

const DIM: usize = 4;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn rollouts(rng: &mut StdRng, episodes: usize) -> Vec<EpisodeResult> {
    (0..episodes)
        .map(|_| {
            let mut low = LowLevelDataset::default();
            let neg_reward = -rng.gen_range(1.0..50.0);
            for _ in 0..rng.gen_range(1..6) {
                let n_cuts = rng.gen_range(2..12);
                let state = Array2::from_shape_fn((n_cuts, DIM), |_| rng.gen_range(-5.0f32..5.0));
                let sel = (n_cuts / 3).max(1);
                let action = (0..sel as i64).collect();
                low.push(state, action, sel, neg_reward);
            }
            let mut info = EpisodeInfo::new();
            info.insert("solving_time".to_string(), vec![-neg_reward]);
            EpisodeResult::new(info, low)
        })
        .collect()
}

#[test]
fn test_aggregated_batch_resumes_from_checkpoint() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(11);
    let results = rollouts(&mut rng, 8);
    let expected_len: usize = results.iter().map(|r| r.low_level.len()).sum();

    let aggregator = TrajectoryAggregator::new(0.1, true);
    let mut normalizer = RunningMeanStd::new(DIM);
    let logger = MemoryLogger::new();
    let batch = aggregator
        .aggregate(&results, Some(&mut normalizer), &logger, 1)
        .unwrap();

    assert_eq!(batch.len(), expected_len);
    assert_eq!(batch.actions.len(), expected_len);
    assert_eq!(batch.sel_cuts_nums.len(), expected_len);
    assert_eq!(batch.episode_info["solving_time"].len(), 8);
    let covered: usize = minibatch_ranges(batch.len(), 3).iter().map(|r| r.len()).sum();
    assert_eq!(covered, expected_len);

    let dir = tempdir().unwrap();
    let mut manager = CheckpointManager::new(CheckpointConfig::new(dir.path()).keep_last(2));
    for epoch in 1..=3 {
        let state = CheckpointState::new(epoch, vec![epoch as u8; 16])
            .with_normalizer(normalizer.snapshot());
        manager.save(epoch, &state).unwrap();
    }
    assert_eq!(manager.list_checkpoints().unwrap().len(), 2);

    let restored = manager.load_latest().unwrap().unwrap();
    assert_eq!(restored.epoch, 3);
    assert_eq!(restored.pointer_net, vec![3u8; 16]);

    let resumed = RunningMeanStd::from_snapshot(restored.normalizer.as_ref().unwrap()).unwrap();
    let probe = &results[0].low_level.states[0];
    assert_eq!(
        resumed.normalize(probe.view()).unwrap(),
        normalizer.normalize(probe.view()).unwrap()
    );
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trainer.json");
    fs::write(
        &path,
        r#"{
            "optimizer": "adamw",
            "baseline_type": "net",
            "reward_type": "lp_solution_value",
            "lr_decay": {"enabled": true, "step": 10, "rate": 0.5},
            "normalize": true
        }"#,
    )
    .unwrap();

    let config: TrainerConfig = serde_json::from_reader(fs::File::open(&path).unwrap()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.optimizer, OptimizerKind::AdamW);
    assert_eq!(config.baseline_type, BaselineType::Net);
    assert_eq!(config.reward_type, RewardType::LpSolutionValue);
    assert!(config.lr_decay.enabled);
    assert_eq!(config.batch_size, 32);

    let hierarchy: HierarchyConfig =
        serde_json::from_str(r#"{"train_highlevel_policy_freq": 3}"#).unwrap();
    assert_eq!(hierarchy.train_highlevel_policy_freq, 3);
    assert_eq!(hierarchy.train_highlevel_batch_size, 32);
}

#[test]
fn test_evaluation_stats_follow_reward_type() {
    let results: Vec<EvaluationResult> = (1..=4)
        .map(|i| {
            let info = EnvStepInfo::new(-(i as f64), -10.0 * i as f64)
                .with_extra("primal_dual_integral", i as f64)
                .with_extra("primal_dual_gap", 0.0)
                .with_extra("lp_solution_value", 100.0 + i as f64);
            EvaluationResult::from_step_info(&info)
        })
        .collect();

    let stats = evaluation_stats(&results, RewardType::SolvingTime);
    assert_eq!(stats["evaluating/Neg Solving time Median"], -2.5);
    assert!(!stats.contains_key("evaluating/lp_solution_value Mean"));

    let stats = evaluation_stats(&results, RewardType::LpSolutionValue);
    assert_eq!(stats["evaluating/lp_solution_value Max"], 104.0);
}
