use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use patchmatch_mvs::lowlevel::{evaluation_offsets, NeighborOffset};
use patchmatch_mvs::{NeighborRole, PatchMatchConfig, PatchMatchError, PatchMatchNet, StageConfig};

fn build(config: PatchMatchConfig) -> Result<PatchMatchNet, PatchMatchError> {
    PatchMatchNet::new(config, VarBuilder::zeros(DType::F32, &Device::Cpu))
}

#[test]
fn default_config_matches_reference_network() {
    let config = PatchMatchConfig::default();
    config.validate().unwrap();
    let iterations: Vec<usize> = config.stages.iter().map(|s| s.iterations).collect();
    let samples: Vec<usize> = config.stages.iter().map(|s| s.num_samples).collect();
    let neighbors: Vec<usize> = config.stages.iter().map(|s| s.propagation_neighbors).collect();
    assert_eq!(iterations, vec![2, 2, 1]);
    assert_eq!(samples, vec![16, 8, 8]);
    assert_eq!(neighbors, vec![16, 8, 0]);
    assert_eq!(config.final_hypotheses(), 8);
    assert!(!config.parallel);
}

#[test]
fn unsupported_propagation_count_is_fatal() {
    let mut config = PatchMatchConfig::default();
    config.stages[1].propagation_neighbors = 6;
    match build(config) {
        Err(PatchMatchError::UnsupportedNeighbors { role, count }) => {
            assert_eq!(role, NeighborRole::Propagation);
            assert_eq!(count, 6);
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
}

#[test]
fn unsupported_evaluation_count_is_fatal() {
    let mut config = PatchMatchConfig::default();
    config.stages[2].evaluation_neighbors = 8;
    let err = build(config).map(|_| ()).unwrap_err();
    assert_eq!(err.to_string(), "unsupported evaluation neighbor count: 8");
}

#[test]
fn stage_values_are_checked() {
    let cases: Vec<(fn(&mut StageConfig), &str)> = vec![
        (|s| s.iterations = 0, "iterations"),
        (|s| s.num_samples = 0, "num_samples"),
        (|s| s.interval_scale = 0.0, "interval_scale"),
        (|s| s.group_correlations = 5, "group_correlations"),
    ];
    for (mutate, field) in cases {
        let mut config = PatchMatchConfig::default();
        mutate(&mut config.stages[0]);
        match config.validate() {
            Err(PatchMatchError::InvalidStageConfig { stage, reason }) => {
                assert_eq!(stage, 0);
                assert!(reason.contains(field), "{reason}");
            }
            other => panic!("{field}: unexpected {other:?}"),
        }
    }
}

#[test]
fn single_iteration_final_stage_skips_propagation() {
    let fine = StageConfig {
        propagation_neighbors: 8,
        ..StageConfig::fine()
    };
    assert!(!fine.needs_propagation(true));
    assert!(fine.needs_propagation(false));
    assert_eq!(fine.evaluation_dilation(), 5);

    let mut config = PatchMatchConfig::default();
    config.stages[2] = fine;
    assert_eq!(config.final_hypotheses(), 8);
    build(config).unwrap();
}

#[test]
fn evaluation_pattern_follows_stage_dilation() {
    let fine = StageConfig::fine();
    assert_eq!(fine.evaluation_dilation(), 5);
    let pattern = evaluation_offsets(9, fine.evaluation_dilation()).unwrap();
    assert_eq!(pattern[0], NeighborOffset { dy: -5, dx: -5 });
    let wide = evaluation_offsets(17, fine.evaluation_dilation()).unwrap();
    assert_eq!(wide[16], NeighborOffset { dy: 10, dx: 10 });

    let unit = StageConfig {
        propagation_range: 1,
        ..StageConfig::fine()
    };
    assert_eq!(unit.evaluation_dilation(), 0);
    unit.validate(2).unwrap();
}
