// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::language::TokenId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Governor id of the virtual root.
pub const ROOT_ID: TokenId = -1;

/// Dependent id → governor id → score.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoredArcs {
    scores: BTreeMap<TokenId, BTreeMap<TokenId, f64>>,
}

impl ScoredArcs {
    pub fn new(scores: BTreeMap<TokenId, BTreeMap<TokenId, f64>>) -> Self {
        Self { scores }
    }

    /// Governor scores of `dependent`.
    pub fn scores(&self, dependent: TokenId) -> Option<&BTreeMap<TokenId, f64>> {
        self.scores.get(&dependent)
    }

    pub fn score(&self, dependent: TokenId, governor: TokenId) -> Option<f64> {
        self.scores(dependent)?.get(&governor).copied()
    }

    /// Best governor of `dependent`; ties go to the lower id.
    pub fn highest_scoring_governor(&self, dependent: TokenId) -> Option<(TokenId, f64)> {
        self.sorted_governors(dependent).into_iter().next()
    }

    /// Governors of `dependent` by descending score, ties by ascending id.
    pub fn sorted_governors(&self, dependent: TokenId) -> Vec<(TokenId, f64)> {
        let mut governors: Vec<(TokenId, f64)> = self
            .scores(dependent)
            .map(|scores| scores.iter().map(|(id, score)| (*id, *score)).collect())
            .unwrap_or_default();
        governors.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        governors
    }

    pub fn dependents(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.scores.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &BTreeMap<TokenId, f64>)> + '_ {
        self.scores.iter().map(|(id, scores)| (*id, scores))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<TokenId, BTreeMap<TokenId, f64>> {
        self.scores
    }
}
