//! Local-model backend: quantized Llama inference with Candle

use super::download::{ModelDownloader, ModelFiles};
use super::hardware::{ComputeDevice, HardwareCapabilities, HardwareDetector};
use super::models::ModelSelector;
use crate::llm::client::LLMClient;
use crate::llm::error::BackendError;
use crate::llm::types::{LLMRequest, LLMResponse, MessageRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use candle_core::{quantized::gguf_file, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights as QuantizedLlama;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Context window the model is run with
pub const CONTEXT_WINDOW: usize = 4096;

const DEFAULT_MAX_NEW_TOKENS: usize = 512;
const SAMPLING_SEED: u64 = 299_792_458;
const STOP_TOKENS: [&str; 2] = ["<|eot_id|>", "<|end_of_text|>"];

static SHARED: OnceCell<Arc<EmbeddedClient>> = OnceCell::const_new();

/// Where the local model comes from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedOptions {
    /// Catalogue id to use instead of RAM-based selection
    pub model: Option<String>,
    /// Pre-downloaded GGUF weights; requires `tokenizer_path`
    pub model_path: Option<PathBuf>,
    /// `tokenizer.json` matching `model_path`
    pub tokenizer_path: Option<PathBuf>,
}

/// Process-wide local model.
///
/// Weights are loaded once by [`EmbeddedClient::initialize`] and stay
/// resident until the process exits. Generation is serialized through
/// an async mutex because the KV cache lives inside the weights, and runs on
/// the blocking pool so that dropping a request stops it between tokens.
pub struct EmbeddedClient {
    model: Arc<Mutex<QuantizedLlama>>,
    tokenizer: Tokenizer,
    device: Device,
    stop_tokens: Vec<u32>,
    display_name: String,
}

impl EmbeddedClient {
    /// Load the model on first call; later calls return the same handle.
    ///
    /// Options passed after the first successful load are ignored.
    pub async fn initialize(options: &EmbeddedOptions) -> Result<Arc<Self>> {
        if let Some(existing) = SHARED.get() {
            debug!("Embedded model already initialized, reusing {}", existing.display_name);
            return Ok(existing.clone());
        }

        let client = SHARED
            .get_or_try_init(|| async { Self::load(options).map(Arc::new) })
            .await?;
        Ok(client.clone())
    }

    /// The loaded model, if [`EmbeddedClient::initialize`] has succeeded
    pub fn shared() -> Option<Arc<Self>> {
        SHARED.get().cloned()
    }

    fn load(options: &EmbeddedOptions) -> Result<Self> {
        let capabilities = HardwareDetector::detect();

        let (files, display_name) = match (&options.model_path, &options.tokenizer_path) {
            (Some(weights), Some(tokenizer)) => {
                let files = ModelFiles::from_paths(weights, tokenizer)?;
                let name = weights
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "local GGUF".to_string());
                (files, name)
            }
            (Some(_), None) | (None, Some(_)) => {
                anyhow::bail!("CADRADS_MODEL_PATH and CADRADS_TOKENIZER_PATH must be set together")
            }
            (None, None) => {
                let model = ModelSelector::select(&capabilities, options.model.as_deref())
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "Insufficient RAM for a local model (have {:.1}GB available)",
                            capabilities.available_ram_gb()
                        )
                    })?;
                let files = ModelDownloader::new()?.download(model)?;
                (files, model.display_name.to_string())
            }
        };

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        let stop_tokens: Vec<u32> = STOP_TOKENS
            .iter()
            .filter_map(|t| tokenizer.token_to_id(t))
            .collect();
        if stop_tokens.is_empty() {
            warn!("Tokenizer defines no Llama 3 stop tokens; generation stops at the token limit");
        }

        let device = Self::create_device(&capabilities)?;

        info!(
            "Loading {} on {} device...",
            display_name,
            capabilities.best_device()
        );

        let (model, device) = match Self::load_gguf_model(&files.weights, &device) {
            Ok(model) => (model, device),
            Err(e) if !device.is_cpu() => {
                warn!(
                    "Failed to load GGUF model on {}: {}. Falling back to CPU",
                    capabilities.best_device(),
                    e
                );
                let model = Self::load_gguf_model(&files.weights, &Device::Cpu)
                    .context("Failed to load GGUF model on CPU fallback")?;
                (model, Device::Cpu)
            }
            Err(e) => return Err(e),
        };

        info!("Model loaded successfully");

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            tokenizer,
            device,
            stop_tokens,
            display_name,
        })
    }

    fn create_device(capabilities: &HardwareCapabilities) -> Result<Device> {
        match capabilities.best_device() {
            ComputeDevice::Cuda => {
                #[cfg(feature = "cuda")]
                {
                    Device::new_cuda(0).context("Failed to create CUDA device")
                }
                #[cfg(not(feature = "cuda"))]
                {
                    Ok(Device::Cpu)
                }
            }
            ComputeDevice::Metal => {
                #[cfg(feature = "metal")]
                {
                    Device::new_metal(0).context("Failed to create Metal device")
                }
                #[cfg(not(feature = "metal"))]
                {
                    Ok(Device::Cpu)
                }
            }
            ComputeDevice::Cpu => Ok(Device::Cpu),
        }
    }

    fn load_gguf_model(model_path: &std::path::Path, device: &Device) -> Result<QuantizedLlama> {
        debug!("Loading GGUF model from: {}", model_path.display());

        let mut file = std::fs::File::open(model_path).context("Failed to open GGUF model file")?;

        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| anyhow::anyhow!("Failed to read GGUF file: {}", e))?;

        QuantizedLlama::from_gguf(content, &mut file, device)
            .context("Failed to load model weights from GGUF")
    }

    /// Llama 3 chat template
    fn format_prompt(request: &LLMRequest) -> String {
        let mut prompt = String::from("<|begin_of_text|>");

        for msg in &request.messages {
            let role = match msg.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            };
            prompt.push_str("<|start_header_id|>");
            prompt.push_str(role);
            prompt.push_str("<|end_header_id|>\n\n");
            prompt.push_str(msg.content.trim());
            prompt.push_str("<|eot_id|>");
        }

        prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
        prompt
    }

    async fn generate(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        temperature: Option<f64>,
    ) -> Result<String> {
        let start = Instant::now();

        let encoding = self
            .tokenizer
            .encode(prompt, false)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        let input_ids: Vec<u32> = encoding.get_ids().to_vec();
        let input_len = input_ids.len();

        if input_len >= CONTEXT_WINDOW {
            anyhow::bail!(
                "Prompt is {} tokens, exceeding the {}-token context window",
                input_len,
                CONTEXT_WINDOW
            );
        }
        let budget = max_new_tokens.min(CONTEXT_WINDOW - input_len);
        debug!(input_tokens = input_len, budget, "Starting generation");

        // Zero (or absent) temperature selects greedy decoding.
        let temperature = temperature.filter(|t| *t > 0.0);

        let mut model = self.model.clone().lock_owned().await;
        let device = self.device.clone();
        let stop_tokens = self.stop_tokens.clone();
        let abandoned = AbandonOnDrop::new();
        let stop = abandoned.flag();

        let generated = tokio::task::spawn_blocking(move || -> Result<Vec<u32>> {
            let mut logits_processor = LogitsProcessor::new(SAMPLING_SEED, temperature, None);
            let mut generated: Vec<u32> = Vec::new();
            let mut input = Tensor::new(input_ids.as_slice(), &device)?.unsqueeze(0)?;
            let mut position = 0;

            for _ in 0..budget {
                if stop.load(Ordering::SeqCst) {
                    debug!(tokens = generated.len(), "Generation abandoned");
                    break;
                }

                let logits = model.forward(&input, position)?;
                let logits = logits.squeeze(0)?;
                let next_token = logits_processor.sample(&logits)?;

                if stop_tokens.contains(&next_token) {
                    break;
                }

                generated.push(next_token);
                position += input.dim(1)?;
                input = Tensor::new(&[next_token], &device)?.unsqueeze(0)?;
            }
            Ok(generated)
        })
        .await
        .context("Generation task failed")??;
        drop(abandoned);

        let output = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| anyhow::anyhow!("Decoding failed: {}", e))?;

        debug!(
            "Generated {} tokens in {:.2}s",
            generated.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(output)
    }
}

/// Raises its flag when dropped, i.e. when the request future is cancelled
struct AbandonOnDrop(Arc<AtomicBool>);

impl AbandonOnDrop {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    fn flag(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LLMClient for EmbeddedClient {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        let start = Instant::now();
        let prompt = Self::format_prompt(&request);
        let max_tokens = request
            .max_tokens
            .map(|t| t as usize)
            .unwrap_or(DEFAULT_MAX_NEW_TOKENS);

        let output = self
            .generate(&prompt, max_tokens, request.temperature.map(f64::from))
            .await
            .map_err(|e| BackendError::InvalidResponse {
                message: format!("Embedded LLM generation failed: {}", e),
                raw_response: None,
            })?;

        debug!(chars = output.len(), "Embedded response received");

        Ok(LLMResponse::text(output, start.elapsed()))
    }

    fn name(&self) -> &str {
        "EmbeddedLLM"
    }

    fn model_info(&self) -> Option<String> {
        Some(self.display_name.clone())
    }
}

impl std::fmt::Debug for EmbeddedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedClient")
            .field("model", &self.display_name)
            .field("device", &format!("{:?}", self.device))
            .finish()
    }
}
