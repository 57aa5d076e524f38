// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Gradient accumulation and parameter updates for shared modules.

use crate::gradient::GradientSet;
use crate::module::{Module, Shared};
use crate::{PureResult, Tensor, TensorError};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

fn validate_rate(rate: f32) -> PureResult<f32> {
    if rate <= 0.0 || !rate.is_finite() {
        return Err(TensorError::NonPositiveLearningRate { rate });
    }
    Ok(rate)
}

/// Per-parameter state an [`UpdateMethod`] may keep between updates.
#[derive(Clone, Debug, Default)]
pub struct UpdateSupport {
    step: u32,
    first_moment: Vec<f32>,
    second_moment: Vec<f32>,
}

impl UpdateSupport {
    /// Number of updates applied so far.
    pub fn step(&self) -> u32 {
        self.step
    }
}

/// Rule turning an averaged gradient into a parameter change.
pub trait UpdateMethod: fmt::Debug + Send + Sync {
    fn update(
        &self,
        value: &mut Tensor,
        gradient: &Tensor,
        support: &mut UpdateSupport,
    ) -> PureResult<()>;
}

/// Plain gradient descent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LearningRate {
    rate: f32,
}

impl LearningRate {
    pub fn new(rate: f32) -> PureResult<Self> {
        Ok(Self {
            rate: validate_rate(rate)?,
        })
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl UpdateMethod for LearningRate {
    fn update(
        &self,
        value: &mut Tensor,
        gradient: &Tensor,
        support: &mut UpdateSupport,
    ) -> PureResult<()> {
        value.add_scaled(gradient, -self.rate)?;
        support.step += 1;
        Ok(())
    }
}

/// Adam with bias-corrected moments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Adam {
    rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
}

impl Adam {
    pub fn new(rate: f32) -> PureResult<Self> {
        Self::with_betas(rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_betas(rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> PureResult<Self> {
        let rate = validate_rate(rate)?;
        if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
            return Err(TensorError::InvalidValue {
                label: "adam_beta_range",
            });
        }
        if epsilon <= 0.0 || !epsilon.is_finite() {
            return Err(TensorError::InvalidValue {
                label: "adam_epsilon",
            });
        }
        Ok(Self {
            rate,
            beta1,
            beta2,
            epsilon,
        })
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl UpdateMethod for Adam {
    fn update(
        &self,
        value: &mut Tensor,
        gradient: &Tensor,
        support: &mut UpdateSupport,
    ) -> PureResult<()> {
        if value.shape() != gradient.shape() {
            return Err(TensorError::ShapeMismatch {
                left: value.shape(),
                right: gradient.shape(),
            });
        }
        let len = value.len();
        if support.first_moment.len() != len {
            support.first_moment = vec![0.0; len];
            support.second_moment = vec![0.0; len];
            support.step = 0;
        }
        support.step += 1;
        let step = support.step as i32;
        let correction1 = 1.0 - self.beta1.powi(step);
        let correction2 = 1.0 - self.beta2.powi(step);
        let moments = support
            .first_moment
            .iter_mut()
            .zip(support.second_moment.iter_mut());
        for ((weight, grad), (m, v)) in value.data_mut().iter_mut().zip(gradient.data()).zip(moments) {
            *m = self.beta1 * *m + (1.0 - self.beta1) * grad;
            *v = self.beta2 * *v + (1.0 - self.beta2) * grad * grad;
            let m_hat = *m / correction1;
            let v_hat = *v / correction2;
            *weight -= self.rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
        Ok(())
    }
}

/// Accumulates parameter errors for one shared module and applies their
/// average on [`ParamsOptimizer::update`].
#[derive(Debug)]
pub struct ParamsOptimizer<M: Module> {
    module: Shared<M>,
    method: Arc<dyn UpdateMethod>,
    accumulated: Option<GradientSet>,
    count: usize,
    support: HashMap<String, UpdateSupport>,
}

impl<M: Module> ParamsOptimizer<M> {
    pub fn new(module: Shared<M>, method: Arc<dyn UpdateMethod>) -> Self {
        Self {
            module,
            method,
            accumulated: None,
            count: 0,
            support: HashMap::new(),
        }
    }

    pub fn module(&self) -> &Shared<M> {
        &self.module
    }

    /// Number of gradient sets accumulated since the last update.
    pub fn pending(&self) -> usize {
        self.count
    }

    /// Adds one set of parameter errors. An owned set is moved in without
    /// copying when nothing has been accumulated yet.
    pub fn accumulate(&mut self, errors: Cow<'_, GradientSet>) -> PureResult<()> {
        match self.accumulated.as_mut() {
            Some(total) => match errors {
                Cow::Borrowed(errors) => total.merge(errors)?,
                Cow::Owned(errors) => total.merge_owned(errors)?,
            },
            None => self.accumulated = Some(errors.into_owned()),
        }
        self.count += 1;
        Ok(())
    }

    /// Applies the averaged accumulated errors and clears them. A no-op when
    /// nothing was accumulated.
    pub fn update(&mut self) -> PureResult<()> {
        let Some(mut grads) = self.accumulated.take() else {
            return Ok(());
        };
        if self.count > 1 {
            grads.scale_inplace(1.0 / self.count as f32);
        }
        debug!(
            parameters = grads.len(),
            examples = self.count,
            "applying accumulated parameter errors"
        );
        self.count = 0;
        let method = &self.method;
        let support = &mut self.support;
        let mut applied = 0usize;
        let mut module = self.module.write();
        module.visit_parameters_mut(&mut |param| {
            if let Some(grad) = grads.get(param.name()) {
                let state = support.entry(param.name().to_string()).or_default();
                method.update(param.value_mut(), grad, state)?;
                applied += 1;
            }
            Ok(())
        })?;
        if applied != grads.len() {
            let mut known = Vec::new();
            module.visit_parameters(&mut |param| {
                known.push(param.name().to_string());
                Ok(())
            })?;
            if let Some(name) = grads.names().find(|name| !known.iter().any(|k| k == name)) {
                return Err(TensorError::MissingParameter {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }
}
