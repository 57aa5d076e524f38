// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::encoder::{retained, SequenceEncoder};
use crate::gradient::GradientSet;
use crate::module::{Module, Parameter, Shared};
use crate::{PureResult, Tensor, TensorError};
use std::borrow::Cow;

/// Half-width of the uniform range used to initialise embedding rows.
pub const EMBEDDING_INIT_RANGE: f32 = 0.1;

/// Embedding lookup table, one row per vocabulary entry.
#[derive(Debug, Clone)]
pub struct EmbeddingTable {
    weight: Parameter,
    vocab_size: usize,
    embed_dim: usize,
}

impl EmbeddingTable {
    pub fn new(
        name: impl Into<String>,
        vocab_size: usize,
        embed_dim: usize,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        if vocab_size == 0 || embed_dim == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: vocab_size,
                cols: embed_dim,
            });
        }
        let name = format!("{}::weight", name.into());
        let weight = Tensor::random_uniform(
            vocab_size,
            embed_dim,
            -EMBEDDING_INIT_RANGE,
            EMBEDDING_INIT_RANGE,
            seed,
            &name,
        )?;
        Ok(Self {
            weight: Parameter::new(name, weight),
            vocab_size,
            embed_dim,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    /// Stacks the rows at `indices`.
    pub fn lookup(&self, indices: &[usize]) -> PureResult<Tensor> {
        if indices.is_empty() {
            return Err(TensorError::EmptyInput("embedding_lookup"));
        }
        let weights = self.weight.value();
        let mut out = Vec::with_capacity(indices.len() * self.embed_dim);
        for &idx in indices {
            if idx >= self.vocab_size {
                return Err(TensorError::InvalidValue {
                    label: "embedding_index_out_of_range",
                });
            }
            out.extend_from_slice(weights.row(idx));
        }
        Tensor::from_vec(indices.len(), self.embed_dim, out)
    }

    /// Scatters `grad_output` rows back onto the rows they were read from.
    pub fn scatter_gradient(&self, indices: &[usize], grad_output: &Tensor) -> PureResult<Tensor> {
        if grad_output.shape() != (indices.len(), self.embed_dim) {
            return Err(TensorError::ShapeMismatch {
                left: grad_output.shape(),
                right: (indices.len(), self.embed_dim),
            });
        }
        let mut grad_weight = Tensor::zeros(self.vocab_size, self.embed_dim)?;
        for (row, &idx) in indices.iter().enumerate() {
            let target = grad_weight.row_mut(idx);
            for (slot, value) in target.iter_mut().zip(grad_output.row(row)) {
                *slot += value;
            }
        }
        Ok(grad_weight)
    }
}

impl Module for EmbeddingTable {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&self.weight)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.weight)
    }
}

/// Processor looking up one index sequence in a shared [`EmbeddingTable`].
///
/// Indices are discrete, so there are no input errors to report.
#[derive(Debug, Clone)]
pub struct EmbeddingEncoder {
    model: Shared<EmbeddingTable>,
    indices: Option<Vec<usize>>,
    params_errors: Option<GradientSet>,
}

impl EmbeddingEncoder {
    pub fn new(model: Shared<EmbeddingTable>) -> Self {
        Self {
            model,
            indices: None,
            params_errors: None,
        }
    }

    pub fn model(&self) -> &Shared<EmbeddingTable> {
        &self.model
    }
}

impl SequenceEncoder<[usize]> for EmbeddingEncoder {
    fn forward(&mut self, input: &[usize]) -> PureResult<Tensor> {
        self.params_errors = None;
        self.indices = None;
        let output = self.model.read().lookup(input)?;
        self.indices = Some(input.to_vec());
        Ok(output)
    }

    fn backward(&mut self, output_errors: &Tensor) -> PureResult<()> {
        let indices = self.indices.take().ok_or(TensorError::InvalidValue {
            label: "embedding_cache_missing",
        })?;
        let model = self.model.read();
        let grad = model.scatter_gradient(&indices, output_errors)?;
        let mut grads = GradientSet::new();
        grads.insert(model.weight.name(), grad)?;
        self.params_errors = Some(grads);
        Ok(())
    }

    fn input_errors(&self, _copy: bool) -> PureResult<Cow<'_, Tensor>> {
        Err(TensorError::UnsupportedOperation {
            label: "embedding_input_errors",
        })
    }

    fn params_errors(&self, copy: bool) -> PureResult<Cow<'_, GradientSet>> {
        retained(&self.params_errors, copy, "embedding_errors_missing")
    }
}
