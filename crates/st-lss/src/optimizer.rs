// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{LssError, LssResult};
use crate::model::{LssModel, RootEmbedding, ROOT_PARAMETER};
use crate::params::LssParameters;
use st_nn::{BiRnn, DeepBiRnn, EmbeddingTable, GradientSet, ParamsOptimizer, Tensor, UpdateMethod};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

/// One optimizer per pipeline stage plus one for the virtual root, all
/// sharing a single update method.
#[derive(Debug)]
pub struct LssOptimizer {
    tokens_encoder_optimizer: ParamsOptimizer<EmbeddingTable>,
    context_encoder_optimizer: ParamsOptimizer<DeepBiRnn>,
    heads_encoder_optimizer: ParamsOptimizer<BiRnn>,
    root_optimizer: ParamsOptimizer<RootEmbedding>,
    root_size: usize,
}

impl LssOptimizer {
    pub fn new(model: &LssModel, method: Arc<dyn UpdateMethod>) -> Self {
        Self {
            tokens_encoder_optimizer: ParamsOptimizer::new(
                model.tokens_encoder().embeddings().clone(),
                Arc::clone(&method),
            ),
            context_encoder_optimizer: ParamsOptimizer::new(
                model.context_encoder().clone(),
                Arc::clone(&method),
            ),
            heads_encoder_optimizer: ParamsOptimizer::new(
                model.heads_encoder().clone(),
                Arc::clone(&method),
            ),
            root_optimizer: ParamsOptimizer::new(model.root_embedding().clone(), method),
            root_size: model.context_vectors_size(),
        }
    }

    /// Hands each stage's errors to its optimizer. Owned errors are moved,
    /// borrowed ones are copied only when they start a new accumulation.
    pub fn accumulate(&mut self, params: LssParameters<'_>) -> LssResult<()> {
        self.tokens_encoder_optimizer
            .accumulate(params.tokens_encoder_params)?;
        self.context_encoder_optimizer
            .accumulate(params.context_encoder_params)?;
        self.heads_encoder_optimizer
            .accumulate(params.heads_encoder_params)?;
        Ok(())
    }

    /// Accumulates errors on the virtual root, shaped `1 x context width`.
    pub fn accumulate_root(&mut self, errors: &Tensor) -> LssResult<()> {
        if errors.shape() != (1, self.root_size) {
            return Err(LssError::ErrorsShape {
                slot: "virtual_root",
                expected: (1, self.root_size),
                got: errors.shape(),
            });
        }
        let mut grads = GradientSet::new();
        grads.insert(ROOT_PARAMETER, errors.clone())?;
        self.root_optimizer.accumulate(Cow::Owned(grads))?;
        Ok(())
    }

    /// Updates tokens, context, heads and root, in that order.
    pub fn update(&mut self) -> LssResult<()> {
        debug!(
            tokens = self.tokens_encoder_optimizer.pending(),
            context = self.context_encoder_optimizer.pending(),
            heads = self.heads_encoder_optimizer.pending(),
            root = self.root_optimizer.pending(),
            "updating lss parameters"
        );
        self.tokens_encoder_optimizer.update()?;
        self.context_encoder_optimizer.update()?;
        self.heads_encoder_optimizer.update()?;
        self.root_optimizer.update()?;
        Ok(())
    }
}
