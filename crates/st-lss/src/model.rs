// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::config::{BiRnnConfig, LssConfig};
use crate::encoder::LssEncoder;
use crate::error::{LssError, LssResult};
use crate::tokens::{TokensEncoderModel, Vocabulary};
use st_nn::{
    load_state_dict_json, save_state_dict_json, share, Activation, BiRnn, DeepBiRnn,
    EmbeddingTable, Module, OutputMerge, Parameter, PureResult, Shared, Tensor,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Parameter name of the virtual root vector.
pub const ROOT_PARAMETER: &str = "lss::root";

/// Trainable virtual-root vector, one row of context width.
#[derive(Debug, Clone)]
pub struct RootEmbedding {
    vector: Parameter,
}

impl RootEmbedding {
    /// Glorot-uniform initialised root.
    pub fn new(size: usize, seed: Option<u64>) -> PureResult<Self> {
        Ok(Self {
            vector: Parameter::new(
                ROOT_PARAMETER,
                Tensor::glorot_uniform(1, size, seed, ROOT_PARAMETER)?,
            ),
        })
    }

    pub fn vector(&self) -> &Tensor {
        self.vector.value()
    }

    pub fn size(&self) -> usize {
        self.vector.value().cols()
    }
}

impl Module for RootEmbedding {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&self.vector)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.vector)
    }
}

/// Architecture and shared parameters of the encoding pipeline.
///
/// The context width is twice the token encoding width; latent heads and the
/// virtual root share it. Any number of [`LssEncoder`]s may be built from one
/// model.
#[derive(Debug)]
pub struct LssModel {
    config: LssConfig,
    tokens_encoder: TokensEncoderModel,
    context_encoder: Shared<DeepBiRnn>,
    heads_encoder: Shared<BiRnn>,
    root_embedding: Shared<RootEmbedding>,
    context_vectors_size: usize,
}

impl LssModel {
    pub fn new(config: LssConfig, vocabulary: Vocabulary) -> LssResult<Self> {
        config.validate()?;
        let seed = config.seed;
        let token_size = config.token_encoding_size;

        let embeddings = EmbeddingTable::new("lss::tokens", vocabulary.rows(), token_size, seed)?;
        let tokens_encoder = TokensEncoderModel::new(vocabulary, share(embeddings))?;

        let context = build_context(&config.context, token_size, seed)?;
        let context_vectors_size = context.output_dim();

        let heads = BiRnn::new(
            "lss::heads",
            config.heads.connection,
            context_vectors_size,
            context_vectors_size,
            config.heads.hidden_activation,
            OutputMerge::ConcatFeedforward {
                output_size: context_vectors_size,
                activation: Activation::Tanh,
            },
            seed,
        )?;
        if heads.output_dim() != context_vectors_size {
            return Err(LssError::Configuration(format!(
                "heads output width {} differs from context width {}",
                heads.output_dim(),
                context_vectors_size
            )));
        }

        let root = RootEmbedding::new(context_vectors_size, seed)?;
        debug!(
            token_encoding_size = token_size,
            context_vectors_size,
            context_layers = config.context.layers,
            vocabulary = tokens_encoder.vocabulary().rows(),
            "built lss model"
        );
        Ok(Self {
            config,
            tokens_encoder,
            context_encoder: share(context),
            heads_encoder: share(heads),
            root_embedding: share(root),
            context_vectors_size,
        })
    }

    pub fn config(&self) -> &LssConfig {
        &self.config
    }

    pub fn token_encoding_size(&self) -> usize {
        self.config.token_encoding_size
    }

    pub fn context_vectors_size(&self) -> usize {
        self.context_vectors_size
    }

    pub fn tokens_encoder(&self) -> &TokensEncoderModel {
        &self.tokens_encoder
    }

    pub fn context_encoder(&self) -> &Shared<DeepBiRnn> {
        &self.context_encoder
    }

    pub fn heads_encoder(&self) -> &Shared<BiRnn> {
        &self.heads_encoder
    }

    pub fn root_embedding(&self) -> &Shared<RootEmbedding> {
        &self.root_embedding
    }

    /// Current root vector. Shares storage with the model until the next update.
    pub fn root_vector(&self) -> Tensor {
        self.root_embedding.read().vector().clone()
    }

    /// Builds a pipeline over the default stages. `id` only tags tracing output.
    pub fn build_encoder(&self, id: usize) -> LssEncoder {
        LssEncoder::new(self, id)
    }

    /// Total number of trainable scalars.
    pub fn parameter_count(&self) -> LssResult<usize> {
        Ok(self.tokens_encoder.embeddings().read().parameter_count()?
            + self.context_encoder.read().parameter_count()?
            + self.heads_encoder.read().parameter_count()?
            + self.root_embedding.read().parameter_count()?)
    }

    /// Copies every parameter of the four stores, keyed by name.
    pub fn state_dict(&self) -> LssResult<HashMap<String, Tensor>> {
        let mut state = self.tokens_encoder.embeddings().read().state_dict()?;
        state.extend(self.context_encoder.read().state_dict()?);
        state.extend(self.heads_encoder.read().state_dict()?);
        state.extend(self.root_embedding.read().state_dict()?);
        Ok(state)
    }

    /// Restores every parameter. All four stores are locked and checked
    /// against `state` before the first write, so a mismatched snapshot
    /// leaves the model untouched.
    pub fn load_state_dict(&self, state: &HashMap<String, Tensor>) -> LssResult<()> {
        let mut tokens = self.tokens_encoder.embeddings().write();
        let mut context = self.context_encoder.write();
        let mut heads = self.heads_encoder.write();
        let mut root = self.root_embedding.write();
        tokens.check_state_dict(state)?;
        context.check_state_dict(state)?;
        heads.check_state_dict(state)?;
        root.check_state_dict(state)?;
        tokens.load_state_dict(state)?;
        context.load_state_dict(state)?;
        heads.load_state_dict(state)?;
        root.load_state_dict(state)?;
        Ok(())
    }

    pub fn save_parameters(&self, path: impl AsRef<Path>) -> LssResult<()> {
        save_state_dict_json(&self.state_dict()?, path)?;
        Ok(())
    }

    pub fn load_parameters(&self, path: impl AsRef<Path>) -> LssResult<()> {
        let state = load_state_dict_json(path)?;
        self.load_state_dict(&state)
    }
}

fn build_context(config: &BiRnnConfig, token_size: usize, seed: Option<u64>) -> LssResult<DeepBiRnn> {
    let layer = |index: usize, input_dim: usize| {
        BiRnn::new(
            format!("lss::context::{index}"),
            config.connection,
            input_dim,
            token_size,
            config.hidden_activation,
            OutputMerge::Concat,
            seed,
        )
    };
    let layers = match config.layers {
        1 => vec![layer(0, token_size)?],
        2 => vec![layer(0, token_size)?, layer(1, 2 * token_size)?],
        other => {
            return Err(LssError::Configuration(format!(
                "context encoder supports 1 or 2 layers, got {other}"
            )))
        }
    };
    Ok(DeepBiRnn::new(layers)?)
}
