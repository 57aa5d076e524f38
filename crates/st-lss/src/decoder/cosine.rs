// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::scored_arcs::{ScoredArcs, ROOT_ID};
use super::HeadsDecoder;
use crate::error::{LssError, LssResult};
use crate::language::{ParsingToken, TokenId};
use crate::structure::LatentSyntacticStructure;
use st_tensor::cosine_similarity;
use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_2;
use tracing::warn;

/// Scores governor `g` of dependent `d` by the cosine between the context
/// vector of `g` and the latent head of `d`. The root competes through its own
/// vector unless `d` is punctuation or has no form.
#[derive(Clone, Copy, Debug, Default)]
pub struct CosineDecoder;

impl CosineDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Raw cosine similarities, before rescaling and normalisation.
    pub fn similarities(&self, lss: &LatentSyntacticStructure<'_>) -> LssResult<ScoredArcs> {
        let norm = lss.normalized();
        let mut scores = BTreeMap::new();
        for dependent in lss.sentence().tokens() {
            scores.insert(dependent.id(), dependent_similarities(&norm, dependent)?);
        }
        Ok(ScoredArcs::new(scores))
    }
}

impl HeadsDecoder for CosineDecoder {
    fn decode(&self, lss: &LatentSyntacticStructure<'_>) -> LssResult<ScoredArcs> {
        let norm = lss.normalized();
        let mut scores = BTreeMap::new();
        for dependent in lss.sentence().tokens() {
            let mut candidates = dependent_similarities(&norm, dependent)?;
            to_distribution(dependent.id(), &mut candidates)?;
            scores.insert(dependent.id(), candidates);
        }
        Ok(ScoredArcs::new(scores))
    }
}

fn dependent_similarities(
    norm: &LatentSyntacticStructure<'_>,
    dependent: &ParsingToken,
) -> LssResult<BTreeMap<TokenId, f64>> {
    let head = norm.latent_head(dependent.id())?;
    let mut candidates = BTreeMap::new();
    for governor in norm.sentence().tokens() {
        if governor.id() == dependent.id() {
            continue;
        }
        let context = norm.context_vector(governor.id())?;
        candidates.insert(governor.id(), cosine_similarity(context, head));
    }
    let root = if dependent.form().is_some() && !dependent.is_punctuation() {
        cosine_similarity(head, norm.virtual_root())
    } else {
        0.0
    };
    candidates.insert(ROOT_ID, root);
    Ok(candidates)
}

/// Maps a cosine onto a linear angle scale: `π/2 - acos(s)`, in `[-π/2, π/2]`.
pub fn rescale(similarity: f64) -> f64 {
    FRAC_PI_2 - similarity.clamp(-1.0, 1.0).acos()
}

/// Rescales in place and normalises the scores to sum to one.
///
/// Rescaled scores below zero are floored at zero before normalising, so an
/// anti-aligned candidate gets no mass instead of a negative share. A plain
/// rescale-and-normalise would let those candidates subtract from the total.
fn to_distribution(dependent: TokenId, scores: &mut BTreeMap<TokenId, f64>) -> LssResult<()> {
    for score in scores.values_mut() {
        *score = rescale(*score).max(0.0);
    }
    let total: f64 = scores.values().sum();
    if !(total.is_finite() && total > 0.0) {
        warn!(dependent, total, "degenerate arc scores");
        return Err(LssError::DegenerateScores { dependent });
    }
    for score in scores.values_mut() {
        *score /= total;
    }
    Ok(())
}
