//! Local-model backend
//!
//! Runs a quantized Llama instruct model in-process with Candle so reports
//! never leave the machine. Hardware (CPU, CUDA, Metal) is detected at load
//! time and a catalogue model is chosen from available RAM unless explicit
//! weight and tokenizer paths are configured.

mod client;
mod download;
mod hardware;
mod models;

pub use client::{EmbeddedClient, EmbeddedOptions, CONTEXT_WINDOW};
pub use download::{ModelDownloader, ModelFiles};
pub use hardware::{ComputeDevice, HardwareCapabilities, HardwareDetector};
pub use models::{EmbeddedModel, ModelSelector};
