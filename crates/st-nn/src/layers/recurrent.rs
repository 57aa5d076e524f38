// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::activation::Activation;
use super::lstm::{Lstm, LstmTrace};
use crate::gradient::GradientSet;
use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};
use serde::{Deserialize, Serialize};

/// Recurrent connection type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrentKind {
    #[default]
    Simple,
    Lstm,
}

/// Elman cell: `h_t = f(x_t W_ih + h_{t-1} W_hh + b)`.
#[derive(Debug, Clone)]
pub struct SimpleRecurrent {
    input_dim: usize,
    hidden_dim: usize,
    activation: Activation,
    weight_ih: Parameter,
    weight_hh: Parameter,
    bias: Parameter,
}

#[derive(Debug, Clone)]
pub struct SimpleTrace {
    inputs: Tensor,
    outputs: Tensor,
}

impl SimpleRecurrent {
    pub fn new(
        name: impl Into<String>,
        input_dim: usize,
        hidden_dim: usize,
        activation: Activation,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        if input_dim == 0 || hidden_dim == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: input_dim,
                cols: hidden_dim,
            });
        }
        let name = name.into();
        let weight_ih_name = format!("{name}::weight_ih");
        let weight_hh_name = format!("{name}::weight_hh");
        let weight_ih = Tensor::glorot_uniform(input_dim, hidden_dim, seed, &weight_ih_name)?;
        let weight_hh = Tensor::glorot_uniform(hidden_dim, hidden_dim, seed, &weight_hh_name)?;
        Ok(Self {
            input_dim,
            hidden_dim,
            activation,
            weight_ih: Parameter::new(weight_ih_name, weight_ih),
            weight_hh: Parameter::new(weight_hh_name, weight_hh),
            bias: Parameter::new(format!("{name}::bias"), Tensor::zeros(1, hidden_dim)?),
        })
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn run(&self, input: &Tensor) -> PureResult<(Tensor, SimpleTrace)> {
        let (timesteps, cols) = input.shape();
        if cols != self.input_dim {
            return Err(TensorError::ShapeMismatch {
                left: (timesteps, cols),
                right: (timesteps, self.input_dim),
            });
        }
        let hidden_dim = self.hidden_dim;
        let weight_ih = self.weight_ih.value().data();
        let weight_hh = self.weight_hh.value().data();
        let bias = self.bias.value().data();
        let mut outputs = Tensor::zeros(timesteps, hidden_dim)?;
        let mut hidden_prev = vec![0.0f32; hidden_dim];
        for t in 0..timesteps {
            let x = input.row(t);
            let row = outputs.row_mut(t);
            for unit in 0..hidden_dim {
                let mut value = bias[unit];
                for (idx, x_value) in x.iter().enumerate() {
                    value += x_value * weight_ih[idx * hidden_dim + unit];
                }
                for (idx, h_value) in hidden_prev.iter().enumerate() {
                    value += h_value * weight_hh[idx * hidden_dim + unit];
                }
                row[unit] = self.activation.apply(value);
            }
            hidden_prev.copy_from_slice(row);
        }
        let trace = SimpleTrace {
            inputs: input.clone(),
            outputs: outputs.clone(),
        };
        Ok((outputs, trace))
    }

    pub fn run_backward(
        &self,
        trace: &SimpleTrace,
        grad_output: &Tensor,
        grads: &mut GradientSet,
    ) -> PureResult<Tensor> {
        let timesteps = trace.outputs.rows();
        let input_dim = self.input_dim;
        let hidden_dim = self.hidden_dim;
        if grad_output.shape() != (timesteps, hidden_dim) {
            return Err(TensorError::ShapeMismatch {
                left: grad_output.shape(),
                right: (timesteps, hidden_dim),
            });
        }
        let weight_ih = self.weight_ih.value().data();
        let weight_hh = self.weight_hh.value().data();
        let mut grad_input = Tensor::zeros(timesteps, input_dim)?;
        let mut grad_w_ih = vec![0.0f32; input_dim * hidden_dim];
        let mut grad_w_hh = vec![0.0f32; hidden_dim * hidden_dim];
        let mut grad_b = vec![0.0f32; hidden_dim];
        let mut grad_h_next = vec![0.0f32; hidden_dim];
        let mut grad_pre = vec![0.0f32; hidden_dim];
        for step in (0..timesteps).rev() {
            let outputs = trace.outputs.row(step);
            let upstream = grad_output.row(step);
            for unit in 0..hidden_dim {
                let dh = upstream[unit] + grad_h_next[unit];
                grad_pre[unit] = dh * self.activation.derivative_from_output(outputs[unit]);
                grad_b[unit] += grad_pre[unit];
            }
            let x = trace.inputs.row(step);
            let grad_x = grad_input.row_mut(step);
            for idx in 0..input_dim {
                let mut acc = 0.0f32;
                for unit in 0..hidden_dim {
                    acc += grad_pre[unit] * weight_ih[idx * hidden_dim + unit];
                    grad_w_ih[idx * hidden_dim + unit] += x[idx] * grad_pre[unit];
                }
                grad_x[idx] = acc;
            }
            for idx in 0..hidden_dim {
                let prev = if step == 0 {
                    0.0
                } else {
                    trace.outputs.row(step - 1)[idx]
                };
                let mut acc = 0.0f32;
                for unit in 0..hidden_dim {
                    acc += grad_pre[unit] * weight_hh[idx * hidden_dim + unit];
                    grad_w_hh[idx * hidden_dim + unit] += prev * grad_pre[unit];
                }
                grad_h_next[idx] = acc;
            }
        }
        grads.insert(
            self.weight_ih.name(),
            Tensor::from_vec(input_dim, hidden_dim, grad_w_ih)?,
        )?;
        grads.insert(
            self.weight_hh.name(),
            Tensor::from_vec(hidden_dim, hidden_dim, grad_w_hh)?,
        )?;
        grads.insert(self.bias.name(), Tensor::from_vec(1, hidden_dim, grad_b)?)?;
        Ok(grad_input)
    }
}

impl Module for SimpleRecurrent {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&self.weight_ih)?;
        visitor(&self.weight_hh)?;
        visitor(&self.bias)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.weight_ih)?;
        visitor(&mut self.weight_hh)?;
        visitor(&mut self.bias)
    }
}

/// One direction of a recurrent network.
#[derive(Debug, Clone)]
pub enum RecurrentUnit {
    Simple(SimpleRecurrent),
    Lstm(Lstm),
}

#[derive(Debug, Clone)]
pub enum RecurrentTrace {
    Simple(SimpleTrace),
    Lstm(LstmTrace),
}

impl RecurrentUnit {
    /// The activation only applies to [`RecurrentKind::Simple`]; LSTM gates
    /// keep their fixed sigmoid/tanh pair.
    pub fn new(
        kind: RecurrentKind,
        name: impl Into<String>,
        input_dim: usize,
        hidden_dim: usize,
        activation: Activation,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        Ok(match kind {
            RecurrentKind::Simple => RecurrentUnit::Simple(SimpleRecurrent::new(
                name, input_dim, hidden_dim, activation, seed,
            )?),
            RecurrentKind::Lstm => RecurrentUnit::Lstm(Lstm::new(name, input_dim, hidden_dim, seed)?),
        })
    }

    pub fn kind(&self) -> RecurrentKind {
        match self {
            RecurrentUnit::Simple(_) => RecurrentKind::Simple,
            RecurrentUnit::Lstm(_) => RecurrentKind::Lstm,
        }
    }

    pub fn input_dim(&self) -> usize {
        match self {
            RecurrentUnit::Simple(cell) => cell.input_dim,
            RecurrentUnit::Lstm(cell) => cell.input_dim(),
        }
    }

    pub fn hidden_dim(&self) -> usize {
        match self {
            RecurrentUnit::Simple(cell) => cell.hidden_dim,
            RecurrentUnit::Lstm(cell) => cell.hidden_dim(),
        }
    }

    pub fn run(&self, input: &Tensor) -> PureResult<(Tensor, RecurrentTrace)> {
        match self {
            RecurrentUnit::Simple(cell) => {
                let (output, trace) = cell.run(input)?;
                Ok((output, RecurrentTrace::Simple(trace)))
            }
            RecurrentUnit::Lstm(cell) => {
                let (output, trace) = cell.run(input)?;
                Ok((output, RecurrentTrace::Lstm(trace)))
            }
        }
    }

    pub fn run_backward(
        &self,
        trace: &RecurrentTrace,
        grad_output: &Tensor,
        grads: &mut GradientSet,
    ) -> PureResult<Tensor> {
        match (self, trace) {
            (RecurrentUnit::Simple(cell), RecurrentTrace::Simple(trace)) => {
                cell.run_backward(trace, grad_output, grads)
            }
            (RecurrentUnit::Lstm(cell), RecurrentTrace::Lstm(trace)) => {
                cell.run_backward(trace, grad_output, grads)
            }
            _ => Err(TensorError::InvalidValue {
                label: "recurrent_trace_kind",
            }),
        }
    }
}

impl Module for RecurrentUnit {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        match self {
            RecurrentUnit::Simple(cell) => cell.visit_parameters(visitor),
            RecurrentUnit::Lstm(cell) => cell.visit_parameters(visitor),
        }
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        match self {
            RecurrentUnit::Simple(cell) => cell.visit_parameters_mut(visitor),
            RecurrentUnit::Lstm(cell) => cell.visit_parameters_mut(visitor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> Tensor {
        Tensor::from_vec(3, 2, vec![0.5, -0.1, 0.2, 0.3, -0.4, 0.6]).unwrap()
    }

    #[test]
    fn simple_cell_is_causal() {
        let cell =
            SimpleRecurrent::new("rnn", 2, 3, Activation::Tanh, Some(5)).unwrap();
        let input = sample_input();
        let (full, _) = cell.run(&input).unwrap();
        let prefix = Tensor::from_vec(2, 2, input.data()[..4].to_vec()).unwrap();
        let (partial, _) = cell.run(&prefix).unwrap();
        assert_eq!(&full.data()[..6], partial.data());
    }

    #[test]
    fn simple_cell_gradients_match_finite_differences() {
        for activation in [Activation::Tanh, Activation::Sigmoid, Activation::Identity] {
            let cell = SimpleRecurrent::new("rnn", 2, 2, activation, Some(9)).unwrap();
            let input = sample_input();
            let (_, trace) = cell.run(&input).unwrap();
            let ones = Tensor::from_vec(3, 2, vec![1.0; 6]).unwrap();
            let mut grads = GradientSet::new();
            let analytic = cell.run_backward(&trace, &ones, &mut grads).unwrap();
            assert_eq!(grads.len(), 3);

            let loss = |tensor: &Tensor| -> f32 { cell.run(tensor).unwrap().0.data().iter().sum() };
            let eps = 1e-2f32;
            for idx in 0..input.len() {
                let mut plus = input.clone();
                plus.data_mut()[idx] += eps;
                let mut minus = input.clone();
                minus.data_mut()[idx] -= eps;
                let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
                assert!(
                    (numeric - analytic.data()[idx]).abs() < 1e-2,
                    "{activation:?} idx {idx}"
                );
            }
        }
    }

    #[test]
    fn unit_rejects_foreign_trace() {
        let simple = RecurrentUnit::new(RecurrentKind::Simple, "a", 2, 2, Activation::Tanh, None)
            .unwrap();
        let lstm = RecurrentUnit::new(RecurrentKind::Lstm, "b", 2, 2, Activation::Tanh, None)
            .unwrap();
        let input = sample_input();
        let (_, trace) = lstm.run(&input).unwrap();
        let grad = Tensor::zeros(3, 2).unwrap();
        let mut grads = GradientSet::new();
        assert!(matches!(
            simple.run_backward(&trace, &grad, &mut grads),
            Err(TensorError::InvalidValue {
                label: "recurrent_trace_kind"
            })
        ));
        assert_eq!(lstm.kind(), RecurrentKind::Lstm);
        assert_eq!(simple.hidden_dim(), 2);
    }
}
