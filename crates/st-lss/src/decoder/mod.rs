// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Arc scoring over a finished [`LatentSyntacticStructure`].

mod cosine;
mod scored_arcs;

pub use cosine::{rescale, CosineDecoder};
pub use scored_arcs::{ScoredArcs, ROOT_ID};

use crate::error::LssResult;
use crate::structure::LatentSyntacticStructure;

/// Scores every candidate governor of every token.
pub trait HeadsDecoder {
    fn decode(&self, lss: &LatentSyntacticStructure<'_>) -> LssResult<ScoredArcs>;
}
