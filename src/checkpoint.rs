//! Parameter loading and saving.
//!
//! Checkpoints are flat name → tensor tables. Every model parameter is
//! looked up under its mapped name first (for checkpoints exported with a
//! different naming scheme) and under its own name second. Parameters that
//! are not found keep their initial value and are reported; loading never
//! stops early because of them.

use crate::trace::trace_warn;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use std::collections::HashMap;
use std::path::Path;

/// Outcome of a load: which parameters were filled and which were not.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Model parameter names that received a value, sorted.
    pub loaded: Vec<String>,
    /// Model parameter names without a checkpoint entry, sorted.
    pub missing: Vec<String>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Copies matching entries of `tensors` into `varmap`.
///
/// `name_map` maps a model parameter name to the name used in the
/// checkpoint. A shape mismatch between a found entry and its parameter is
/// fatal.
pub fn load_into(
    varmap: &VarMap,
    tensors: &HashMap<String, Tensor>,
    name_map: &HashMap<String, String>,
) -> PatchMatchResult<LoadReport> {
    let data = varmap.data().lock().map_err(|_| PatchMatchError::Checkpoint {
        reason: "parameter table lock poisoned".to_string(),
    })?;
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();

    let mut report = LoadReport::default();
    for name in names {
        let found = name_map
            .get(name)
            .and_then(|mapped| tensors.get(mapped))
            .or_else(|| tensors.get(name));
        let Some(value) = found else {
            trace_warn!("no checkpoint entry for parameter {name}");
            report.missing.push(name.clone());
            continue;
        };
        let Some(var) = data.get(name) else {
            continue;
        };
        if value.dims() != var.dims() {
            return Err(PatchMatchError::Checkpoint {
                reason: format!(
                    "parameter {name}: expected shape {:?}, checkpoint has {:?}",
                    var.dims(),
                    value.dims()
                ),
            });
        }
        let value = value.to_dtype(var.dtype())?.to_device(var.device())?;
        var.set(&value)?;
        report.loaded.push(name.clone());
    }
    Ok(report)
}

/// Reads a safetensors file and loads it with [`load_into`].
pub fn load_safetensors<P: AsRef<Path>>(
    varmap: &VarMap,
    path: P,
    name_map: &HashMap<String, String>,
    device: &Device,
) -> PatchMatchResult<LoadReport> {
    let path = path.as_ref();
    let tensors =
        candle_core::safetensors::load(path, device).map_err(|err| PatchMatchError::Checkpoint {
            reason: format!("failed to read {}: {err}", path.display()),
        })?;
    load_into(varmap, &tensors, name_map)
}

/// Writes every parameter of `varmap` to a safetensors file.
pub fn save_safetensors<P: AsRef<Path>>(varmap: &VarMap, path: P) -> PatchMatchResult<()> {
    let path = path.as_ref();
    varmap.save(path).map_err(|err| PatchMatchError::Checkpoint {
        reason: format!("failed to write {}: {err}", path.display()),
    })
}
