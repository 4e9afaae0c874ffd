//! Resolving model weights and tokenizer files on disk

use super::models::EmbeddedModel;
use anyhow::{Context, Result};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Local paths of a model ready to be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub weights: PathBuf,
    pub tokenizer: PathBuf,
}

impl ModelFiles {
    /// Use files the operator already has on disk
    pub fn from_paths(weights: impl Into<PathBuf>, tokenizer: impl Into<PathBuf>) -> Result<Self> {
        let files = Self {
            weights: weights.into(),
            tokenizer: tokenizer.into(),
        };
        ensure_exists(&files.weights, "model weights")?;
        ensure_exists(&files.tokenizer, "tokenizer")?;
        Ok(files)
    }
}

fn ensure_exists(path: &Path, what: &str) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("{} file not found: {}", what, path.display());
    }
    Ok(())
}

/// Downloads catalogue models from the Hugging Face Hub into its cache
pub struct ModelDownloader {
    api: Api,
    cache_dir: PathBuf,
}

impl ModelDownloader {
    /// Creates a new downloader using the default HuggingFace cache
    pub fn new() -> Result<Self> {
        let api = Api::new().context("Failed to initialize HuggingFace Hub API")?;

        let cache_dir = dirs::cache_dir()
            .map(|d| d.join("huggingface").join("hub"))
            .unwrap_or_else(|| PathBuf::from(".cache/huggingface/hub"));

        debug!("HuggingFace cache directory: {}", cache_dir.display());

        Ok(Self { api, cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Fetch (or reuse from cache) the weights and tokenizer of `model`
    pub fn download(&self, model: &EmbeddedModel) -> Result<ModelFiles> {
        info!(
            "Resolving {} ({} params) from {}",
            model.display_name, model.params, model.repo_id
        );

        let weights = self
            .api
            .repo(Repo::new(model.repo_id.to_string(), RepoType::Model))
            .get(model.filename)
            .with_context(|| format!("Failed to download model file: {}", model.filename))?;

        let tokenizer = self
            .api
            .repo(Repo::new(model.tokenizer_repo.to_string(), RepoType::Model))
            .get("tokenizer.json")
            .with_context(|| {
                format!(
                    "Failed to download tokenizer.json from {}",
                    model.tokenizer_repo
                )
            })?;

        info!(
            weights = %weights.display(),
            tokenizer = %tokenizer.display(),
            "Model files ready"
        );

        Ok(ModelFiles { weights, tokenizer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_paths_requires_existing_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let weights = dir.path().join("model.gguf");
        let tokenizer = dir.path().join("tokenizer.json");

        assert!(ModelFiles::from_paths(&weights, &tokenizer).is_err());

        std::fs::write(&weights, b"gguf").unwrap();
        std::fs::write(&tokenizer, b"{}").unwrap();

        let files = ModelFiles::from_paths(&weights, &tokenizer).unwrap();
        assert_eq!(files.weights, weights);
        assert_eq!(files.tokenizer, tokenizer);
    }

    #[test]
    fn test_cache_dir() {
        let downloader = ModelDownloader::new().unwrap();
        assert!(!downloader.cache_dir().as_os_str().is_empty());
    }
}
