// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use st_nn::GradientSet;
use std::borrow::Cow;

/// Parameter errors of the three pipeline stages, always collected together.
///
/// Borrowed variants live no longer than the encoder they were collected
/// from; call [`LssParameters::into_owned`] to keep them past its next call.
#[derive(Clone, Debug)]
pub struct LssParameters<'a> {
    pub tokens_encoder_params: Cow<'a, GradientSet>,
    pub context_encoder_params: Cow<'a, GradientSet>,
    pub heads_encoder_params: Cow<'a, GradientSet>,
}

impl LssParameters<'_> {
    pub fn into_owned(self) -> LssParameters<'static> {
        LssParameters {
            tokens_encoder_params: Cow::Owned(self.tokens_encoder_params.into_owned()),
            context_encoder_params: Cow::Owned(self.context_encoder_params.into_owned()),
            heads_encoder_params: Cow::Owned(self.heads_encoder_params.into_owned()),
        }
    }

    /// Squared L2 norm over the three stages.
    pub fn squared_l2_norm(&self) -> f32 {
        self.tokens_encoder_params.squared_l2_norm()
            + self.context_encoder_params.squared_l2_norm()
            + self.heads_encoder_params.squared_l2_norm()
    }
}
