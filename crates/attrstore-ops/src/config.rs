//! Pipeline configuration.

use attrstore_error::{AttrError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Knobs for [`run_operation`](crate::pipeline::run_operation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output attribute name used when a request leaves a pin unnamed.
    /// Multi-output operations append `.<label>`.
    pub default_output_name: String,
    /// Let single-row inputs broadcast across every row of input 0.
    pub allow_broadcast: bool,
    /// Let inputs without entries contribute their default value.
    pub allow_constant_inputs: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_output_name: "$Output".to_owned(),
            allow_broadcast: true,
            allow_constant_inputs: true,
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| AttrError::internal(format!("invalid pipeline config: {e}")))?;
        debug!(?config, "pipeline config loaded");
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AttrError::internal(format!("pipeline config not serializable: {e}")))
    }

    /// Name of output `pin` with the given label when the request did not
    /// name it.
    #[must_use]
    pub fn output_name(&self, num_outputs: usize, label: &str) -> String {
        if num_outputs <= 1 {
            self.default_output_name.clone()
        } else {
            format!("{}.{label}", self.default_output_name)
        }
    }
}
