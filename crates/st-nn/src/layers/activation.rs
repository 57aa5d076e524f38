// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::{PureResult, Tensor, TensorError};
use serde::{Deserialize, Serialize};

/// Element-wise activation used by recurrent cells and output merges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Tanh,
    Relu,
    Sigmoid,
    Identity,
}

impl Activation {
    pub fn apply(self, value: f32) -> f32 {
        match self {
            Activation::Tanh => value.tanh(),
            Activation::Relu => value.max(0.0),
            Activation::Sigmoid => sigmoid(value),
            Activation::Identity => value,
        }
    }

    /// Derivative expressed through the activated output `y = f(x)`.
    pub fn derivative_from_output(self, output: f32) -> f32 {
        match self {
            Activation::Tanh => 1.0 - output * output,
            Activation::Relu => {
                if output > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => output * (1.0 - output),
            Activation::Identity => 1.0,
        }
    }

    pub fn forward(self, input: &Tensor) -> PureResult<Tensor> {
        input.map(|value| self.apply(*value))
    }

    /// Multiplies `grad_output` by the derivative taken at `output`.
    pub fn backward(self, output: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        if output.shape() != grad_output.shape() {
            return Err(TensorError::ShapeMismatch {
                left: output.shape(),
                right: grad_output.shape(),
            });
        }
        let (rows, cols) = output.shape();
        let data = output
            .data()
            .iter()
            .zip(grad_output.data())
            .map(|(y, grad)| grad * self.derivative_from_output(*y))
            .collect();
        Tensor::from_vec(rows, cols, data)
    }
}

pub(crate) fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_forward_backward() {
        let input = Tensor::from_vec(1, 4, vec![-1.0, -0.5, 0.2, 1.5]).unwrap();
        let output = Activation::Relu.forward(&input).unwrap();
        assert_eq!(output.data(), &[0.0, 0.0, 0.2, 1.5]);

        let grad_output = Tensor::from_vec(1, 4, vec![0.3, 0.4, 0.5, 0.6]).unwrap();
        let grad_input = Activation::Relu.backward(&output, &grad_output).unwrap();
        assert_eq!(grad_input.data(), &[0.0, 0.0, 0.5, 0.6]);
    }

    #[test]
    fn forward_applies_elementwise_and_keeps_shape() {
        let input = Tensor::from_vec(2, 2, vec![-2.0, -0.1, 0.0, 3.0]).unwrap();
        for activation in [Activation::Tanh, Activation::Sigmoid, Activation::Identity] {
            let output = activation.forward(&input).unwrap();
            assert_eq!(output.shape(), (2, 2));
            for (y, x) in output.data().iter().zip(input.data()) {
                assert_eq!(*y, activation.apply(*x));
            }
        }
        let tanh = Activation::Tanh.forward(&input).unwrap();
        assert!((tanh.data()[3] - 3.0f32.tanh()).abs() < 1e-7);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        for activation in [Activation::Tanh, Activation::Sigmoid, Activation::Identity] {
            let x = 0.3f32;
            let eps = 1e-3f32;
            let numeric = (activation.apply(x + eps) - activation.apply(x - eps)) / (2.0 * eps);
            let analytic = activation.derivative_from_output(activation.apply(x));
            assert!((numeric - analytic).abs() < 1e-3, "{activation:?}");
        }
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Activation::Sigmoid).unwrap();
        assert_eq!(json, "\"sigmoid\"");
    }
}
