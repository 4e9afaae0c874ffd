//! Catalogue of local GGUF models and RAM-based selection

use super::hardware::HardwareCapabilities;
use tracing::{debug, info, warn};

/// A quantized instruct model the embedded backend can run
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedModel {
    /// Short identifier accepted by `CADRADS_LOCAL_MODEL`
    pub id: &'static str,
    /// GGUF repository on the Hugging Face Hub
    pub repo_id: &'static str,
    /// GGUF filename inside `repo_id`
    pub filename: &'static str,
    /// Repository holding the matching `tokenizer.json`
    pub tokenizer_repo: &'static str,
    /// Approximate RAM required in GB
    pub ram_required_gb: f64,
    /// Human-readable name
    pub display_name: &'static str,
    /// Model parameter count (for display)
    pub params: &'static str,
}

impl EmbeddedModel {
    /// Llama 3.1 8B Instruct, Q6_K (~6.6GB file)
    pub const LLAMA_3_1_8B_Q6_K: EmbeddedModel = EmbeddedModel {
        id: "llama-3.1-8b-q6",
        repo_id: "bartowski/Meta-Llama-3.1-8B-Instruct-GGUF",
        filename: "Meta-Llama-3.1-8B-Instruct-Q6_K.gguf",
        tokenizer_repo: "unsloth/Meta-Llama-3.1-8B-Instruct",
        ram_required_gb: 8.0,
        display_name: "Llama 3.1 8B Instruct Q6_K",
        params: "8B",
    };

    /// Llama 3.1 8B Instruct, Q4_K_M (~4.9GB file)
    pub const LLAMA_3_1_8B_Q4_K_M: EmbeddedModel = EmbeddedModel {
        id: "llama-3.1-8b-q4",
        repo_id: "bartowski/Meta-Llama-3.1-8B-Instruct-GGUF",
        filename: "Meta-Llama-3.1-8B-Instruct-Q4_K_M.gguf",
        tokenizer_repo: "unsloth/Meta-Llama-3.1-8B-Instruct",
        ram_required_gb: 6.0,
        display_name: "Llama 3.1 8B Instruct Q4_K_M",
        params: "8B",
    };

    /// Llama 3.2 3B Instruct, Q4_K_M (~2GB file)
    pub const LLAMA_3_2_3B_Q4_K_M: EmbeddedModel = EmbeddedModel {
        id: "llama-3.2-3b-q4",
        repo_id: "bartowski/Llama-3.2-3B-Instruct-GGUF",
        filename: "Llama-3.2-3B-Instruct-Q4_K_M.gguf",
        tokenizer_repo: "unsloth/Llama-3.2-3B-Instruct",
        ram_required_gb: 3.0,
        display_name: "Llama 3.2 3B Instruct Q4_K_M",
        params: "3B",
    };

    /// All available models in order of preference (largest first)
    pub const ALL_MODELS: &'static [EmbeddedModel] = &[
        Self::LLAMA_3_1_8B_Q6_K,
        Self::LLAMA_3_1_8B_Q4_K_M,
        Self::LLAMA_3_2_3B_Q4_K_M,
    ];
}

/// Picks a catalogue model for the current machine
pub struct ModelSelector;

impl ModelSelector {
    /// Select the requested model, or the largest one that fits in RAM.
    ///
    /// An unknown `requested` id falls back to automatic selection.
    pub fn select(
        capabilities: &HardwareCapabilities,
        requested: Option<&str>,
    ) -> Option<&'static EmbeddedModel> {
        let usable_gb = Self::usable_ram_gb(capabilities);

        if let Some(id) = requested {
            if let Some(model) = Self::get_model(id) {
                info!(
                    "Using requested model {} (requires {:.1}GB RAM)",
                    model.display_name, model.ram_required_gb
                );
                if model.ram_required_gb > usable_gb {
                    warn!(
                        "Model requires {:.1}GB but only {:.1}GB usable after reserves. May cause OOM!",
                        model.ram_required_gb, usable_gb
                    );
                }
                return Some(model);
            }
            warn!(
                "Local model '{}' not found. Available: {}. Falling back to auto-selection.",
                id,
                EmbeddedModel::ALL_MODELS
                    .iter()
                    .map(|m| m.id)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        debug!(
            "Model selection: {:.1}GB available, {:.1}GB usable for model",
            capabilities.available_ram_gb(),
            usable_gb
        );

        let selected = EmbeddedModel::ALL_MODELS
            .iter()
            .find(|model| model.ram_required_gb <= usable_gb);

        match selected {
            Some(model) => info!(
                "Selected model: {} ({} params, requires {:.1}GB RAM)",
                model.display_name, model.params, model.ram_required_gb
            ),
            None => info!("No local model fits in {:.1}GB usable RAM", usable_gb),
        }

        selected
    }

    /// Look up a catalogue model by id
    pub fn get_model(id: &str) -> Option<&'static EmbeddedModel> {
        EmbeddedModel::ALL_MODELS.iter().find(|m| m.id == id)
    }

    /// Available RAM minus a system reserve (2GB or 25%, whichever is larger)
    fn usable_ram_gb(capabilities: &HardwareCapabilities) -> f64 {
        let available_gb = capabilities.available_ram_gb();
        let reserve_gb = (available_gb * 0.25).max(2.0);
        (available_gb - reserve_gb).max(0.0)
    }
}
