// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::{PureResult, Tensor, TensorError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Parameter store shared between the processors that read it and the
/// optimizer that writes it.
pub type Shared<M> = Arc<RwLock<M>>;

/// Wraps a module into a [`Shared`] store.
pub fn share<M>(module: M) -> Shared<M> {
    Arc::new(RwLock::new(module))
}

/// Named trainable tensor.
///
/// Gradients do not live here: processors report them through
/// [`crate::GradientSet`] so that many processors can read one parameter
/// concurrently.
#[derive(Clone)]
pub struct Parameter {
    name: String,
    value: Tensor,
}

impl core::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (rows, cols) = self.value.shape();
        write!(f, "Parameter(name={},shape=({},{}))", self.name, rows, cols)
    }
}

impl Parameter {
    /// Creates a new parameter with the provided tensor value.
    pub fn new(name: impl Into<String>, value: Tensor) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Returns the identifier assigned to the parameter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overrides the parameter name.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Provides an immutable view into the underlying tensor value.
    pub fn value(&self) -> &Tensor {
        &self.value
    }

    /// Provides a mutable view into the underlying tensor value.
    pub fn value_mut(&mut self) -> &mut Tensor {
        &mut self.value
    }

    /// Fails unless `tensor` has the same shape as the parameter.
    pub fn assert_shape(&self, tensor: &Tensor) -> PureResult<()> {
        if self.value.shape() != tensor.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.value.shape(),
                right: tensor.shape(),
            });
        }
        Ok(())
    }

    /// Replaces the parameter value with the provided tensor.
    pub fn load_value(&mut self, value: &Tensor) -> PureResult<()> {
        self.assert_shape(value)?;
        self.value = value.clone();
        Ok(())
    }
}

/// Learnable component whose parameters can be enumerated by name.
///
/// Forward and backward passes live on the processors built around a module
/// (see [`crate::SequenceEncoder`]), never on the module itself.
pub trait Module {
    /// Visits immutable parameters.
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()>;

    /// Visits mutable parameters.
    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()>;

    /// Total number of scalar weights.
    fn parameter_count(&self) -> PureResult<usize> {
        let mut total = 0usize;
        self.visit_parameters(&mut |param| {
            total += param.value().len();
            Ok(())
        })?;
        Ok(total)
    }

    /// Captures a copy of every parameter tensor keyed by its canonical name.
    fn state_dict(&self) -> PureResult<HashMap<String, Tensor>> {
        let mut state = HashMap::new();
        self.visit_parameters(&mut |param| {
            state.insert(param.name().to_string(), param.value().clone());
            Ok(())
        })?;
        Ok(state)
    }

    /// Fails unless `state` holds every parameter under its name and shape.
    fn check_state_dict(&self, state: &HashMap<String, Tensor>) -> PureResult<()> {
        self.visit_parameters(&mut |param| {
            let Some(value) = state.get(param.name()) else {
                return Err(TensorError::MissingParameter {
                    name: param.name().to_string(),
                });
            };
            param.assert_shape(value)
        })
    }

    /// Restores parameters from a state dictionary produced by
    /// [`Module::state_dict`]. Nothing is written unless every parameter
    /// passes [`Module::check_state_dict`].
    fn load_state_dict(&mut self, state: &HashMap<String, Tensor>) -> PureResult<()> {
        self.check_state_dict(state)?;
        self.visit_parameters_mut(&mut |param| match state.get(param.name()) {
            Some(value) => param.load_value(value),
            None => Err(TensorError::MissingParameter {
                name: param.name().to_string(),
            }),
        })
    }
}

impl Module for Parameter {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(self)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_value_checks_shape() {
        let mut param = Parameter::new("gate", Tensor::zeros(1, 3).unwrap());
        assert!(param.load_value(&Tensor::zeros(3, 1).unwrap()).is_err());
        let ones = Tensor::from_vec(1, 3, vec![1.0; 3]).unwrap();
        param.load_value(&ones).unwrap();
        assert_eq!(param.value(), &ones);
    }

    #[test]
    fn state_dict_round_trips_through_parameter_module() {
        let mut param = Parameter::new("root", Tensor::from_vec(1, 2, vec![0.5, -0.5]).unwrap());
        let state = param.state_dict().unwrap();
        assert_eq!(param.parameter_count().unwrap(), 2);
        param.value_mut().data_mut()[0] = 9.0;
        param.load_state_dict(&state).unwrap();
        assert_eq!(param.value().data(), &[0.5, -0.5]);

        let mut renamed = param.clone();
        renamed.rename("other");
        assert!(matches!(
            renamed.load_state_dict(&state),
            Err(TensorError::MissingParameter { .. })
        ));
    }

    #[derive(Debug)]
    struct Pair {
        first: Parameter,
        second: Parameter,
    }

    impl Module for Pair {
        fn visit_parameters(
            &self,
            visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
        ) -> PureResult<()> {
            visitor(&self.first)?;
            visitor(&self.second)
        }

        fn visit_parameters_mut(
            &mut self,
            visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
        ) -> PureResult<()> {
            visitor(&mut self.first)?;
            visitor(&mut self.second)
        }
    }

    #[test]
    fn rejected_state_dict_writes_nothing() {
        let mut pair = Pair {
            first: Parameter::new("first", Tensor::zeros(1, 2).unwrap()),
            second: Parameter::new("second", Tensor::zeros(1, 2).unwrap()),
        };
        let before = pair.state_dict().unwrap();

        let mut wrong_shape = HashMap::new();
        wrong_shape.insert("first".to_string(), Tensor::from_vec(1, 2, vec![1.0; 2]).unwrap());
        wrong_shape.insert("second".to_string(), Tensor::zeros(2, 1).unwrap());
        assert!(matches!(
            pair.load_state_dict(&wrong_shape),
            Err(TensorError::ShapeMismatch { .. })
        ));
        assert_eq!(pair.state_dict().unwrap(), before);

        let mut missing = HashMap::new();
        missing.insert("first".to_string(), Tensor::from_vec(1, 2, vec![1.0; 2]).unwrap());
        assert!(pair.load_state_dict(&missing).is_err());
        assert_eq!(pair.state_dict().unwrap(), before);
    }
}
