// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::gradient::GradientSet;
use crate::{PureResult, Tensor, TensorError};
use std::borrow::Cow;

/// Stateful processor that maps a sequence to one output row per element.
///
/// A processor keeps the activations of its last [`SequenceEncoder::forward`]
/// call so that [`SequenceEncoder::backward`] can be run against them. The
/// parameters it reads live in a shared model and are never written here.
pub trait SequenceEncoder<I: ?Sized> {
    /// Encodes `input`, replacing any previously retained activations.
    fn forward(&mut self, input: &I) -> PureResult<Tensor>;

    /// Back-propagates `output_errors` through the last forward pass.
    fn backward(&mut self, output_errors: &Tensor) -> PureResult<()>;

    /// Errors with respect to the last input. `copy` asks for an owned value.
    fn input_errors(&self, copy: bool) -> PureResult<Cow<'_, Tensor>>;

    /// Errors with respect to the parameters. `copy` asks for an owned value.
    fn params_errors(&self, copy: bool) -> PureResult<Cow<'_, GradientSet>>;
}

/// Hands out `value` borrowed, or cloned when `copy` is set.
pub fn lend<T: Clone>(value: &T, copy: bool) -> Cow<'_, T> {
    if copy {
        Cow::Owned(value.clone())
    } else {
        Cow::Borrowed(value)
    }
}

/// Resolves a retained slot, failing with `label` when no backward pass ran.
pub fn retained<'a, T: Clone>(
    slot: &'a Option<T>,
    copy: bool,
    label: &'static str,
) -> PureResult<Cow<'a, T>> {
    slot.as_ref()
        .map(|value| lend(value, copy))
        .ok_or(TensorError::InvalidValue { label })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lend_respects_copy_flag() {
        let tensor = Tensor::zeros(1, 1).unwrap();
        assert!(matches!(lend(&tensor, false), Cow::Borrowed(_)));
        assert!(matches!(lend(&tensor, true), Cow::Owned(_)));
    }

    #[test]
    fn retained_reports_missing_backward() {
        let slot: Option<Tensor> = None;
        assert!(matches!(
            retained(&slot, false, "errors_missing"),
            Err(TensorError::InvalidValue {
                label: "errors_missing"
            })
        ));
    }
}
