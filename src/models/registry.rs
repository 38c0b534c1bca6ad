//! Model registration table
//!
//! Maps the `network.which_model` name from the config to a constructor.
//! The table is built explicitly (usually once, via
//! [`ModelRegistry::with_defaults`]) and then only queried.

use anyhow::{bail, Context, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::gpt::{GptTts, GptTtsOptions};
use crate::config::NetworkConfig;

/// Constructor taking the `kwargs` mapping and a var builder
pub type ModelFactory = fn(&Mapping, VarBuilder) -> Result<GptTts>;

/// Name -> constructor table
#[derive(Default)]
pub struct ModelRegistry {
    factories: HashMap<String, ModelFactory>,
}

impl ModelRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every model this crate provides
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .factories
            .insert("gpt_tts".to_string(), register_gpt_tts as ModelFactory);
        registry
    }

    /// Add a constructor; names must be unique
    pub fn register(&mut self, name: &str, factory: ModelFactory) -> Result<()> {
        if self.factories.contains_key(name) {
            bail!("Model type '{}' is already registered", name);
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    /// Look up a constructor
    pub fn get(&self, name: &str) -> Option<ModelFactory> {
        self.factories.get(name).copied()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct the model a network config asks for
    pub fn build(&self, network: &NetworkConfig, vb: VarBuilder) -> Result<GptTts> {
        let factory = self.get(&network.which_model).with_context(|| {
            format!(
                "Unknown model type '{}' (registered: {:?})",
                network.which_model,
                self.names()
            )
        })?;
        factory(&network.kwargs, vb)
    }

    /// Construct the configured model with weights from a safetensors checkpoint
    pub fn load<P: AsRef<Path>>(
        &self,
        network: &NetworkConfig,
        checkpoint: P,
        device: &Device,
    ) -> Result<GptTts> {
        let path = checkpoint.as_ref();
        info!("Loading {} weights from {:?}", network.which_model, path);

        // SAFETY: the checkpoint must not be modified while it is mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device) }
            .with_context(|| format!("Failed to map checkpoint {:?}", path))?;
        self.build(network, vb)
            .with_context(|| format!("Checkpoint {:?} does not match {:?}", path, network))
    }
}

/// Parse `kwargs` into [`GptTtsOptions`], filling defaults and rejecting unknown keys
pub fn options_from_kwargs(kwargs: &Mapping) -> Result<GptTtsOptions> {
    serde_yaml::from_value(Value::Mapping(kwargs.clone())).context("Invalid gpt_tts kwargs")
}

/// Factory registered as `gpt_tts`
pub fn register_gpt_tts(kwargs: &Mapping, vb: VarBuilder) -> Result<GptTts> {
    let options = options_from_kwargs(kwargs)?;
    GptTts::new(options, vb)
}
