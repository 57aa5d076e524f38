// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::Module;
use crate::{PureResult, Tensor};
use std::collections::BTreeMap;

/// Parameter errors keyed by parameter name.
///
/// Names match [`crate::Parameter::name`], which is how optimizers route each
/// gradient back to the tensor it belongs to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GradientSet {
    grads: BTreeMap<String, Tensor>,
}

impl GradientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero gradients for every parameter of `module`.
    pub fn zeros_like<M: Module + ?Sized>(module: &M) -> PureResult<Self> {
        let mut set = Self::new();
        module.visit_parameters(&mut |param| {
            let (rows, cols) = param.value().shape();
            set.grads
                .insert(param.name().to_string(), Tensor::zeros(rows, cols)?);
            Ok(())
        })?;
        Ok(set)
    }

    /// Adds `grad` to the entry for `name`, creating it when absent.
    pub fn accumulate(&mut self, name: &str, grad: &Tensor) -> PureResult<()> {
        match self.grads.get_mut(name) {
            Some(existing) => existing.add_scaled(grad, 1.0),
            None => {
                self.grads.insert(name.to_string(), grad.clone());
                Ok(())
            }
        }
    }

    /// Like [`GradientSet::accumulate`] but takes ownership of the tensor.
    pub fn insert(&mut self, name: impl Into<String>, grad: Tensor) -> PureResult<()> {
        let name = name.into();
        match self.grads.get_mut(&name) {
            Some(existing) => existing.add_scaled(&grad, 1.0),
            None => {
                self.grads.insert(name, grad);
                Ok(())
            }
        }
    }

    /// Accumulates every entry of `other`.
    pub fn merge(&mut self, other: &GradientSet) -> PureResult<()> {
        for (name, grad) in &other.grads {
            self.accumulate(name, grad)?;
        }
        Ok(())
    }

    /// Like [`GradientSet::merge`] but moves the tensors of `other`.
    pub fn merge_owned(&mut self, other: GradientSet) -> PureResult<()> {
        for (name, grad) in other.grads {
            self.insert(name, grad)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.grads.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.grads.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.grads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }

    /// Iterates in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> + '_ {
        self.grads.iter().map(|(name, grad)| (name.as_str(), grad))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.grads.keys().map(String::as_str)
    }

    /// Multiplies every gradient by `factor`.
    pub fn scale_inplace(&mut self, factor: f32) {
        for grad in self.grads.values_mut() {
            for value in grad.data_mut() {
                *value *= factor;
            }
        }
    }

    /// Squared L2 norm over every entry.
    pub fn squared_l2_norm(&self) -> f32 {
        self.grads.values().map(Tensor::squared_l2_norm).sum()
    }
}
