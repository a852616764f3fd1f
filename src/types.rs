// src/types.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a worker produces its artifacts.
///
/// The orchestrator never interprets the mode itself; it only forwards it to
/// the worker (`--mode <mode>`) and validates mode-specific parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Deterministic, template-based generation.
    #[default]
    Template,
    /// Generation backed by a hosted language model.
    Llm,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Template => "template",
            GenerationMode::Llm => "llm",
        }
    }

    /// Mode parameters that must be present (and non-empty) for this mode.
    pub fn required_parameters(&self) -> &'static [&'static str] {
        match self {
            GenerationMode::Template => &[],
            GenerationMode::Llm => &["provider", "model"],
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
