use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use patchmatch_mvs::{load_into, save_safetensors, PatchMatchConfig, PatchMatchNet};
use std::collections::HashMap;

fn build_varmap() -> (PatchMatchNet, VarMap) {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = PatchMatchNet::new(PatchMatchConfig::default(), vb).unwrap();
    (model, varmap)
}

#[test]
fn parameters_follow_reference_names() {
    let (_, varmap) = build_varmap();
    let data = varmap.data().lock().unwrap();
    for name in [
        "feature.stage1.0.conv.weight",
        "feature.output3.weight",
        "patch_match_3.propagation_conv.weight",
        "patch_match_3.evaluation.pixelwise_net.conv.0.conv.weight",
        "patch_match_1.evaluation_conv.bias",
        "patch_match_1.feature_weight_net.feature_weight.2.bias",
        "refinement.deconv.2.weight",
        "refinement.residual.1.weight",
    ] {
        assert!(data.contains_key(name), "missing {name}");
    }
    assert!(!data.contains_key("patch_match_1.propagation_conv.weight"));
    assert!(!data.contains_key("patch_match_2.evaluation.pixelwise_net.conv.0.conv.weight"));
}

#[test]
fn saved_checkpoint_loads_completely() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    let (_, source) = build_varmap();
    save_safetensors(&source, &path).unwrap();

    let (model, _, report) = PatchMatchNet::from_checkpoint(
        PatchMatchConfig::default(),
        &path,
        &HashMap::new(),
        &Device::Cpu,
    )
    .unwrap();
    assert!(report.is_complete(), "{:?}", report.missing);
    assert!(!report.loaded.is_empty());
    assert_eq!(model.config(), &PatchMatchConfig::default());
}

#[test]
fn missing_entries_are_reported_not_fatal() {
    let (_, varmap) = build_varmap();
    let mut tensors = HashMap::new();
    tensors.insert(
        "exported.refinement.residual.1.weight".to_string(),
        Tensor::zeros((1, 8, 3, 3), DType::F32, &Device::Cpu).unwrap(),
    );
    let mut name_map = HashMap::new();
    name_map.insert(
        "refinement.residual.1.weight".to_string(),
        "exported.refinement.residual.1.weight".to_string(),
    );

    let report = load_into(&varmap, &tensors, &name_map).unwrap();
    assert_eq!(report.loaded, vec!["refinement.residual.1.weight".to_string()]);
    assert!(report.missing.contains(&"feature.stage1.0.conv.weight".to_string()));
    assert!(!report.is_complete());
}

#[test]
fn unreadable_checkpoint_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.safetensors");
    let result = PatchMatchNet::from_checkpoint(
        PatchMatchConfig::default(),
        &path,
        &HashMap::new(),
        &Device::Cpu,
    );
    assert!(result.is_err());
}
