// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Bidirectional recurrent networks.
//!
//! [`BiRnn`] and [`DeepBiRnn`] hold parameters only. The matching
//! [`BiRnnEncoder`] and [`DeepBiRnnEncoder`] read them through a
//! [`Shared`] store and keep the activations of a single sequence, so any
//! number of encoders can run over one model.

use super::activation::Activation;
use super::recurrent::{RecurrentKind, RecurrentTrace, RecurrentUnit};
use crate::encoder::{retained, SequenceEncoder};
use crate::gradient::GradientSet;
use crate::module::{Module, Parameter, Shared};
use crate::{PureResult, Tensor, TensorError};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// How the two directions are combined into one output row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum OutputMerge {
    /// `[l2r | r2l]`, width `2 * hidden`.
    Concat,
    /// `f([l2r | r2l] W + b)`, width `output_size`.
    ConcatFeedforward {
        output_size: usize,
        activation: Activation,
    },
}

#[derive(Debug, Clone)]
enum MergeLayer {
    Concat,
    Feedforward {
        weight: Parameter,
        bias: Parameter,
        activation: Activation,
    },
}

/// Bidirectional RNN parameters.
#[derive(Debug, Clone)]
pub struct BiRnn {
    input_dim: usize,
    hidden_dim: usize,
    left_to_right: RecurrentUnit,
    right_to_left: RecurrentUnit,
    merge: MergeLayer,
}

impl BiRnn {
    pub fn new(
        name: impl Into<String>,
        kind: RecurrentKind,
        input_dim: usize,
        hidden_dim: usize,
        activation: Activation,
        merge: OutputMerge,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        let name = name.into();
        let left_to_right = RecurrentUnit::new(
            kind,
            format!("{name}::l2r"),
            input_dim,
            hidden_dim,
            activation,
            seed,
        )?;
        let right_to_left = RecurrentUnit::new(
            kind,
            format!("{name}::r2l"),
            input_dim,
            hidden_dim,
            activation,
            seed,
        )?;
        let merge = match merge {
            OutputMerge::Concat => MergeLayer::Concat,
            OutputMerge::ConcatFeedforward {
                output_size,
                activation,
            } => {
                if output_size == 0 {
                    return Err(TensorError::InvalidDimensions {
                        rows: 2 * hidden_dim,
                        cols: output_size,
                    });
                }
                let weight_name = format!("{name}::merge::weight");
                let weight =
                    Tensor::glorot_uniform(2 * hidden_dim, output_size, seed, &weight_name)?;
                MergeLayer::Feedforward {
                    weight: Parameter::new(weight_name, weight),
                    bias: Parameter::new(
                        format!("{name}::merge::bias"),
                        Tensor::zeros(1, output_size)?,
                    ),
                    activation,
                }
            }
        };
        Ok(Self {
            input_dim,
            hidden_dim,
            left_to_right,
            right_to_left,
            merge,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    pub fn kind(&self) -> RecurrentKind {
        self.left_to_right.kind()
    }

    /// Width of one output row.
    pub fn output_dim(&self) -> usize {
        match &self.merge {
            MergeLayer::Concat => 2 * self.hidden_dim,
            MergeLayer::Feedforward { bias, .. } => bias.value().cols(),
        }
    }
}

impl Module for BiRnn {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.left_to_right.visit_parameters(visitor)?;
        self.right_to_left.visit_parameters(visitor)?;
        if let MergeLayer::Feedforward { weight, bias, .. } = &self.merge {
            visitor(weight)?;
            visitor(bias)?;
        }
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.left_to_right.visit_parameters_mut(visitor)?;
        self.right_to_left.visit_parameters_mut(visitor)?;
        if let MergeLayer::Feedforward { weight, bias, .. } = &mut self.merge {
            visitor(weight)?;
            visitor(bias)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct BiRnnCache {
    left_to_right: RecurrentTrace,
    right_to_left: RecurrentTrace,
    concat: Tensor,
    output: Tensor,
}

/// Activations and errors of one sequence through a [`BiRnn`].
#[derive(Debug, Clone, Default)]
pub struct BiRnnState {
    cache: Option<BiRnnCache>,
    input_errors: Option<Tensor>,
    params_errors: Option<GradientSet>,
}

impl BiRnnState {
    pub fn forward(&mut self, model: &BiRnn, input: &Tensor) -> PureResult<Tensor> {
        self.cache = None;
        self.input_errors = None;
        self.params_errors = None;
        if input.cols() != model.input_dim {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: (input.rows(), model.input_dim),
            });
        }
        let (l2r, l2r_trace) = model.left_to_right.run(input)?;
        let (r2l_reversed, r2l_trace) = model.right_to_left.run(&input.reverse_rows())?;
        let concat = l2r.concat_cols(&r2l_reversed.reverse_rows())?;
        let output = match &model.merge {
            MergeLayer::Concat => concat.clone(),
            MergeLayer::Feedforward {
                weight,
                bias,
                activation,
            } => {
                let mut projected = concat.matmul(weight.value())?;
                projected.add_row_inplace(bias.value().data())?;
                activation.forward(&projected)?
            }
        };
        self.cache = Some(BiRnnCache {
            left_to_right: l2r_trace,
            right_to_left: r2l_trace,
            concat,
            output: output.clone(),
        });
        Ok(output)
    }

    /// Consumes the retained activations.
    pub fn backward(&mut self, model: &BiRnn, output_errors: &Tensor) -> PureResult<()> {
        let cache = self.cache.take().ok_or(TensorError::InvalidValue {
            label: "birnn_cache_missing",
        })?;
        if output_errors.shape() != cache.output.shape() {
            return Err(TensorError::ShapeMismatch {
                left: output_errors.shape(),
                right: cache.output.shape(),
            });
        }
        let mut grads = GradientSet::new();
        let concat_errors = match &model.merge {
            MergeLayer::Concat => output_errors.clone(),
            MergeLayer::Feedforward {
                weight,
                bias,
                activation,
            } => {
                let pre_errors = activation.backward(&cache.output, output_errors)?;
                grads.insert(
                    weight.name(),
                    cache.concat.transpose().matmul(&pre_errors)?,
                )?;
                grads.insert(
                    bias.name(),
                    Tensor::from_vec(1, pre_errors.cols(), pre_errors.sum_axis0())?,
                )?;
                pre_errors.matmul(&weight.value().transpose())?
            }
        };
        let (l2r_errors, r2l_errors) = concat_errors.split_cols(model.hidden_dim)?;
        let mut input_errors =
            model
                .left_to_right
                .run_backward(&cache.left_to_right, &l2r_errors, &mut grads)?;
        let r2l_input_errors = model.right_to_left.run_backward(
            &cache.right_to_left,
            &r2l_errors.reverse_rows(),
            &mut grads,
        )?;
        input_errors.add_scaled(&r2l_input_errors.reverse_rows(), 1.0)?;
        self.input_errors = Some(input_errors);
        self.params_errors = Some(grads);
        Ok(())
    }

    pub fn input_errors(&self, copy: bool) -> PureResult<Cow<'_, Tensor>> {
        retained(&self.input_errors, copy, "birnn_errors_missing")
    }

    pub fn params_errors(&self, copy: bool) -> PureResult<Cow<'_, GradientSet>> {
        retained(&self.params_errors, copy, "birnn_errors_missing")
    }

    fn take_errors(&mut self) -> PureResult<(Tensor, GradientSet)> {
        match (self.input_errors.take(), self.params_errors.take()) {
            (Some(input), Some(params)) => Ok((input, params)),
            _ => Err(TensorError::InvalidValue {
                label: "birnn_errors_missing",
            }),
        }
    }
}

/// Processor running one sequence through a shared [`BiRnn`].
#[derive(Debug, Clone)]
pub struct BiRnnEncoder {
    model: Shared<BiRnn>,
    state: BiRnnState,
}

impl BiRnnEncoder {
    pub fn new(model: Shared<BiRnn>) -> Self {
        Self {
            model,
            state: BiRnnState::default(),
        }
    }

    pub fn model(&self) -> &Shared<BiRnn> {
        &self.model
    }
}

impl SequenceEncoder<Tensor> for BiRnnEncoder {
    fn forward(&mut self, input: &Tensor) -> PureResult<Tensor> {
        let model = self.model.read();
        self.state.forward(&model, input)
    }

    fn backward(&mut self, output_errors: &Tensor) -> PureResult<()> {
        let model = self.model.read();
        self.state.backward(&model, output_errors)
    }

    fn input_errors(&self, copy: bool) -> PureResult<Cow<'_, Tensor>> {
        self.state.input_errors(copy)
    }

    fn params_errors(&self, copy: bool) -> PureResult<Cow<'_, GradientSet>> {
        self.state.params_errors(copy)
    }
}

/// Stack of [`BiRnn`] layers, each consuming the previous layer's output.
#[derive(Debug, Clone)]
pub struct DeepBiRnn {
    layers: Vec<BiRnn>,
}

impl DeepBiRnn {
    pub fn new(layers: Vec<BiRnn>) -> PureResult<Self> {
        if layers.is_empty() {
            return Err(TensorError::EmptyInput("deep_birnn_layers"));
        }
        for pair in layers.windows(2) {
            if pair[0].output_dim() != pair[1].input_dim() {
                return Err(TensorError::ShapeMismatch {
                    left: (pair[0].input_dim(), pair[0].output_dim()),
                    right: (pair[1].input_dim(), pair[1].output_dim()),
                });
            }
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[BiRnn] {
        &self.layers
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].input_dim()
    }

    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].output_dim()
    }
}

impl Module for DeepBiRnn {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        for layer in &self.layers {
            layer.visit_parameters(visitor)?;
        }
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        for layer in &mut self.layers {
            layer.visit_parameters_mut(visitor)?;
        }
        Ok(())
    }
}

/// Processor running one sequence through a shared [`DeepBiRnn`].
#[derive(Debug, Clone)]
pub struct DeepBiRnnEncoder {
    model: Shared<DeepBiRnn>,
    states: Vec<BiRnnState>,
    input_errors: Option<Tensor>,
    params_errors: Option<GradientSet>,
}

impl DeepBiRnnEncoder {
    pub fn new(model: Shared<DeepBiRnn>) -> Self {
        let depth = model.read().layers.len();
        Self {
            model,
            states: vec![BiRnnState::default(); depth],
            input_errors: None,
            params_errors: None,
        }
    }

    pub fn model(&self) -> &Shared<DeepBiRnn> {
        &self.model
    }
}

impl SequenceEncoder<Tensor> for DeepBiRnnEncoder {
    fn forward(&mut self, input: &Tensor) -> PureResult<Tensor> {
        self.input_errors = None;
        self.params_errors = None;
        let model = self.model.read();
        let mut current = Cow::Borrowed(input);
        for (layer, state) in model.layers.iter().zip(self.states.iter_mut()) {
            current = Cow::Owned(state.forward(layer, &current)?);
        }
        Ok(current.into_owned())
    }

    fn backward(&mut self, output_errors: &Tensor) -> PureResult<()> {
        let model = self.model.read();
        let mut errors = Cow::Borrowed(output_errors);
        let mut grads = GradientSet::new();
        for (layer, state) in model.layers.iter().zip(self.states.iter_mut()).rev() {
            state.backward(layer, &errors)?;
            let (input_errors, layer_grads) = state.take_errors()?;
            grads.merge_owned(layer_grads)?;
            errors = Cow::Owned(input_errors);
        }
        self.input_errors = Some(errors.into_owned());
        self.params_errors = Some(grads);
        Ok(())
    }

    fn input_errors(&self, copy: bool) -> PureResult<Cow<'_, Tensor>> {
        retained(&self.input_errors, copy, "deep_birnn_errors_missing")
    }

    fn params_errors(&self, copy: bool) -> PureResult<Cow<'_, GradientSet>> {
        retained(&self.params_errors, copy, "deep_birnn_errors_missing")
    }
}
