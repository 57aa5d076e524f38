// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::activation::sigmoid;
use crate::gradient::GradientSet;
use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};

/// Single-layer LSTM operating on sequences laid out along the row axis.
///
/// Every sequence starts from a zero hidden and cell state.
#[derive(Debug, Clone)]
pub struct Lstm {
    input_dim: usize,
    hidden_dim: usize,
    weight_ih: Parameter,
    weight_hh: Parameter,
    bias: Parameter,
}

/// Activations retained by [`Lstm::run`] for the backward pass.
#[derive(Debug, Clone)]
pub struct LstmTrace {
    inputs: Vec<f32>,
    gates_i: Vec<f32>,
    gates_f: Vec<f32>,
    gates_g: Vec<f32>,
    gates_o: Vec<f32>,
    hidden_states: Vec<f32>,
    cell_states: Vec<f32>,
    timesteps: usize,
}

impl LstmTrace {
    fn new(timesteps: usize, input_dim: usize, hidden_dim: usize) -> Self {
        Self {
            inputs: vec![0.0f32; timesteps * input_dim],
            gates_i: vec![0.0f32; timesteps * hidden_dim],
            gates_f: vec![0.0f32; timesteps * hidden_dim],
            gates_g: vec![0.0f32; timesteps * hidden_dim],
            gates_o: vec![0.0f32; timesteps * hidden_dim],
            hidden_states: vec![0.0f32; (timesteps + 1) * hidden_dim],
            cell_states: vec![0.0f32; (timesteps + 1) * hidden_dim],
            timesteps,
        }
    }

    pub fn timesteps(&self) -> usize {
        self.timesteps
    }
}

impl Lstm {
    /// Creates a new LSTM layer with Glorot-initialised weights and zero biases.
    pub fn new(
        name: impl Into<String>,
        input_dim: usize,
        hidden_dim: usize,
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
        let weight_ih = Tensor::glorot_uniform(input_dim, 4 * hidden_dim, seed, &weight_ih_name)?;
        let weight_hh = Tensor::glorot_uniform(hidden_dim, 4 * hidden_dim, seed, &weight_hh_name)?;
        let bias = Tensor::zeros(1, 4 * hidden_dim)?;
        Ok(Self {
            input_dim,
            hidden_dim,
            weight_ih: Parameter::new(weight_ih_name, weight_ih),
            weight_hh: Parameter::new(weight_hh_name, weight_hh),
            bias: Parameter::new(format!("{name}::bias"), bias),
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    fn guard_input(&self, input: &Tensor) -> PureResult<()> {
        let (rows, cols) = input.shape();
        if cols != self.input_dim {
            return Err(TensorError::ShapeMismatch {
                left: (rows, cols),
                right: (rows, self.input_dim),
            });
        }
        if rows == 0 {
            return Err(TensorError::EmptyInput("lstm_forward"));
        }
        Ok(())
    }

    /// Runs the sequence and returns the hidden states with their trace.
    pub fn run(&self, input: &Tensor) -> PureResult<(Tensor, LstmTrace)> {
        self.guard_input(input)?;
        let timesteps = input.rows();
        let hidden_dim = self.hidden_dim;
        let input_dim = self.input_dim;
        let mut output = vec![0.0f32; timesteps * hidden_dim];
        let mut hidden_prev = vec![0.0f32; hidden_dim];
        let mut cell_prev = vec![0.0f32; hidden_dim];
        let mut trace = LstmTrace::new(timesteps, input_dim, hidden_dim);
        let weight_ih = self.weight_ih.value().data();
        let weight_hh = self.weight_hh.value().data();
        let bias = self.bias.value().data();
        let mut gates = vec![0.0f32; 4 * hidden_dim];
        for t in 0..timesteps {
            let input_slice = input.row(t);
            trace.inputs[t * input_dim..(t + 1) * input_dim].copy_from_slice(input_slice);
            for gate in 0..4 * hidden_dim {
                let mut value = bias[gate];
                for idx in 0..input_dim {
                    value += input_slice[idx] * weight_ih[idx * 4 * hidden_dim + gate];
                }
                for idx in 0..hidden_dim {
                    value += hidden_prev[idx] * weight_hh[idx * 4 * hidden_dim + gate];
                }
                gates[gate] = value;
            }
            for unit in 0..hidden_dim {
                let gi = sigmoid(gates[unit]);
                let gf = sigmoid(gates[hidden_dim + unit]);
                let gg = gates[2 * hidden_dim + unit].tanh();
                let go = sigmoid(gates[3 * hidden_dim + unit]);
                let cell = gf * cell_prev[unit] + gi * gg;
                let hidden = go * cell.tanh();
                trace.gates_i[t * hidden_dim + unit] = gi;
                trace.gates_f[t * hidden_dim + unit] = gf;
                trace.gates_g[t * hidden_dim + unit] = gg;
                trace.gates_o[t * hidden_dim + unit] = go;
                trace.cell_states[(t + 1) * hidden_dim + unit] = cell;
                trace.hidden_states[(t + 1) * hidden_dim + unit] = hidden;
                cell_prev[unit] = cell;
                hidden_prev[unit] = hidden;
                output[t * hidden_dim + unit] = hidden;
            }
        }
        Ok((Tensor::from_vec(timesteps, hidden_dim, output)?, trace))
    }

    /// Back-propagates through time, adding parameter errors into `grads`.
    /// Returns the errors with respect to the input sequence.
    pub fn run_backward(
        &self,
        trace: &LstmTrace,
        grad_output: &Tensor,
        grads: &mut GradientSet,
    ) -> PureResult<Tensor> {
        let timesteps = trace.timesteps;
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
        let mut grad_input = vec![0.0f32; timesteps * input_dim];
        let mut grad_w_ih = vec![0.0f32; input_dim * 4 * hidden_dim];
        let mut grad_w_hh = vec![0.0f32; hidden_dim * 4 * hidden_dim];
        let mut grad_b = vec![0.0f32; 4 * hidden_dim];
        let mut grad_h_next = vec![0.0f32; hidden_dim];
        let mut grad_c_next = vec![0.0f32; hidden_dim];
        let mut gate_grad = vec![0.0f32; 4 * hidden_dim];
        for step in (0..timesteps).rev() {
            let grad_hidden_slice = grad_output.row(step);
            let prev_hidden = &trace.hidden_states[step * hidden_dim..(step + 1) * hidden_dim];
            let prev_cell = &trace.cell_states[step * hidden_dim..(step + 1) * hidden_dim];
            let curr_cell = &trace.cell_states[(step + 1) * hidden_dim..(step + 2) * hidden_dim];
            for unit in 0..hidden_dim {
                let dh = grad_hidden_slice[unit] + grad_h_next[unit];
                let o = trace.gates_o[step * hidden_dim + unit];
                let i = trace.gates_i[step * hidden_dim + unit];
                let f = trace.gates_f[step * hidden_dim + unit];
                let g = trace.gates_g[step * hidden_dim + unit];
                let tanh_c = curr_cell[unit].tanh();
                let do_gate = dh * tanh_c * o * (1.0 - o);
                let dc = dh * o * (1.0 - tanh_c * tanh_c) + grad_c_next[unit];
                let di = dc * g * i * (1.0 - i);
                let dg = dc * i * (1.0 - g * g);
                let df = dc * prev_cell[unit] * f * (1.0 - f);
                grad_c_next[unit] = dc * f;
                gate_grad[unit] = di;
                gate_grad[hidden_dim + unit] = df;
                gate_grad[2 * hidden_dim + unit] = dg;
                gate_grad[3 * hidden_dim + unit] = do_gate;
            }
            for gate in 0..4 * hidden_dim {
                grad_b[gate] += gate_grad[gate];
            }
            for input_idx in 0..input_dim {
                let mut acc = 0.0f32;
                for gate in 0..4 * hidden_dim {
                    acc += gate_grad[gate] * weight_ih[input_idx * 4 * hidden_dim + gate];
                    grad_w_ih[input_idx * 4 * hidden_dim + gate] +=
                        trace.inputs[step * input_dim + input_idx] * gate_grad[gate];
                }
                grad_input[step * input_dim + input_idx] = acc;
            }
            for hidden_idx in 0..hidden_dim {
                let mut acc = 0.0f32;
                for gate in 0..4 * hidden_dim {
                    acc += gate_grad[gate] * weight_hh[hidden_idx * 4 * hidden_dim + gate];
                    grad_w_hh[hidden_idx * 4 * hidden_dim + gate] +=
                        prev_hidden[hidden_idx] * gate_grad[gate];
                }
                grad_h_next[hidden_idx] = acc;
            }
        }
        grads.insert(
            self.weight_ih.name(),
            Tensor::from_vec(input_dim, 4 * hidden_dim, grad_w_ih)?,
        )?;
        grads.insert(
            self.weight_hh.name(),
            Tensor::from_vec(hidden_dim, 4 * hidden_dim, grad_w_hh)?,
        )?;
        grads.insert(self.bias.name(), Tensor::from_vec(1, 4 * hidden_dim, grad_b)?)?;
        Tensor::from_vec(timesteps, input_dim, grad_input)
    }
}

impl Module for Lstm {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lstm_forward_produces_hidden_sequence() {
        let lstm = Lstm::new("lstm", 2, 3, Some(7)).unwrap();
        let input = Tensor::from_vec(4, 2, vec![0.1, 0.2, -0.3, 0.4, 0.5, -0.6, 0.7, 0.8]).unwrap();
        let (output, trace) = lstm.run(&input).unwrap();
        assert_eq!(output.shape(), (4, 3));
        assert_eq!(trace.timesteps(), 4);
        for value in output.data() {
            assert!(value.is_finite());
            assert!(value.abs() < 1.0);
        }
    }

    #[test]
    fn lstm_backward_reports_every_parameter() {
        let lstm = Lstm::new("lstm", 3, 2, Some(11)).unwrap();
        let input =
            Tensor::from_vec(3, 3, vec![0.2, -0.1, 0.3, 0.4, -0.5, 0.6, -0.2, 0.1, 0.7]).unwrap();
        let grad_out = Tensor::from_vec(3, 2, vec![0.1, -0.2, 0.3, 0.2, -0.4, 0.5]).unwrap();
        let (_, trace) = lstm.run(&input).unwrap();
        let mut grads = GradientSet::new();
        let grad_input = lstm.run_backward(&trace, &grad_out, &mut grads).unwrap();
        assert_eq!(grad_input.shape(), (3, 3));
        assert_eq!(grads.get("lstm::weight_ih").unwrap().shape(), (3, 8));
        assert_eq!(grads.get("lstm::weight_hh").unwrap().shape(), (2, 8));
        assert!(grads.get("lstm::bias").unwrap().squared_l2_norm() > 0.0);
    }

    #[test]
    fn lstm_input_gradient_matches_finite_differences() {
        let lstm = Lstm::new("lstm", 2, 2, Some(3)).unwrap();
        let input = Tensor::from_vec(2, 2, vec![0.3, -0.2, 0.1, 0.4]).unwrap();
        let (_, trace) = lstm.run(&input).unwrap();
        let ones = Tensor::from_vec(2, 2, vec![1.0; 4]).unwrap();
        let mut grads = GradientSet::new();
        let analytic = lstm.run_backward(&trace, &ones, &mut grads).unwrap();

        let loss = |tensor: &Tensor| -> f32 { lstm.run(tensor).unwrap().0.data().iter().sum() };
        let eps = 1e-2f32;
        for idx in 0..input.len() {
            let mut plus = input.clone();
            plus.data_mut()[idx] += eps;
            let mut minus = input.clone();
            minus.data_mut()[idx] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!((numeric - analytic.data()[idx]).abs() < 1e-2);
        }
    }
}
