// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{LssError, LssResult};
use serde::{Deserialize, Serialize};
use st_nn::{Activation, RecurrentKind};
use std::fs;
use std::path::Path;

/// Layer counts accepted for the contextual stage.
pub const CONTEXT_LAYERS: [usize; 2] = [1, 2];

/// Shape of one bidirectional recurrent stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiRnnConfig {
    #[serde(default)]
    pub connection: RecurrentKind,
    #[serde(default)]
    pub hidden_activation: Activation,
    #[serde(default = "default_layers")]
    pub layers: usize,
}

fn default_layers() -> usize {
    1
}

impl Default for BiRnnConfig {
    fn default() -> Self {
        Self {
            connection: RecurrentKind::Simple,
            hidden_activation: Activation::Tanh,
            layers: default_layers(),
        }
    }
}

impl BiRnnConfig {
    pub fn new(connection: RecurrentKind, hidden_activation: Activation, layers: usize) -> Self {
        Self {
            connection,
            hidden_activation,
            layers,
        }
    }
}

/// Architecture of an [`crate::LssModel`].
///
/// ```toml
/// token_encoding_size = 50
/// seed = 7
///
/// [context]
/// connection = "lstm"
/// layers = 2
///
/// [heads]
/// hidden_activation = "tanh"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LssConfig {
    pub token_encoding_size: usize,
    /// Explicit seed; falls back to `spiral_config::determinism` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub context: BiRnnConfig,
    #[serde(default)]
    pub heads: BiRnnConfig,
}

impl LssConfig {
    pub fn new(token_encoding_size: usize) -> Self {
        Self {
            token_encoding_size,
            seed: None,
            context: BiRnnConfig::default(),
            heads: BiRnnConfig::default(),
        }
    }

    pub fn with_context(mut self, context: BiRnnConfig) -> Self {
        self.context = context;
        self
    }

    pub fn with_heads(mut self, heads: BiRnnConfig) -> Self {
        self.heads = heads;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Width of context vectors, latent heads and the virtual root.
    pub fn context_vectors_size(&self) -> usize {
        2 * self.token_encoding_size
    }

    pub fn validate(&self) -> LssResult<()> {
        if self.token_encoding_size == 0 {
            return Err(LssError::Configuration(
                "token_encoding_size must be positive".into(),
            ));
        }
        if !CONTEXT_LAYERS.contains(&self.context.layers) {
            return Err(LssError::Configuration(format!(
                "context encoder supports 1 or 2 layers, got {}",
                self.context.layers
            )));
        }
        if self.heads.layers != 1 {
            return Err(LssError::Configuration(format!(
                "heads encoder must have exactly 1 layer, got {}",
                self.heads.layers
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> LssResult<Self> {
        toml::from_str(text).map_err(|err| LssError::Parse {
            what: "toml configuration".into(),
            message: err.to_string(),
        })
    }

    pub fn from_json_str(text: &str) -> LssResult<Self> {
        serde_json::from_str(text).map_err(|err| LssError::Parse {
            what: "json configuration".into(),
            message: err.to_string(),
        })
    }

    /// Reads `path` as JSON when it ends in `.json`, TOML otherwise, and
    /// validates the result.
    pub fn load(path: impl AsRef<Path>) -> LssResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| LssError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_str(&text)?
        } else {
            Self::from_toml_str(&text)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> LssResult<String> {
        toml::to_string_pretty(self).map_err(|err| LssError::Parse {
            what: "toml configuration".into(),
            message: err.to_string(),
        })
    }
}
