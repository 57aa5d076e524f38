// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Token encoding stage: forms are looked up in a vocabulary and embedded.

use crate::language::ParsingSentence;
use st_nn::encoder::SequenceEncoder;
use st_nn::{EmbeddingEncoder, EmbeddingTable, GradientSet, PureResult, Shared, Tensor, TensorError};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// Embedding row shared by unknown and form-less tokens.
pub const UNKNOWN_INDEX: usize = 0;

/// Known forms mapped to embedding rows; row 0 is reserved for unknowns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Vocabulary {
    forms: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    /// Builds a vocabulary from `forms`, ignoring repeats.
    pub fn from_forms<I, S>(forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocabulary = Self::default();
        for form in forms {
            vocabulary.insert(form.into());
        }
        vocabulary
    }

    /// Adds `form` and returns its row.
    pub fn insert(&mut self, form: String) -> usize {
        if let Some(&idx) = self.index.get(&form) {
            return idx;
        }
        self.forms.push(form.clone());
        let idx = self.forms.len();
        self.index.insert(form, idx);
        idx
    }

    pub fn index_of(&self, form: Option<&str>) -> usize {
        form.and_then(|form| self.index.get(form).copied())
            .unwrap_or(UNKNOWN_INDEX)
    }

    pub fn forms(&self) -> &[String] {
        &self.forms
    }

    /// Number of embedding rows, unknown row included.
    pub fn rows(&self) -> usize {
        self.forms.len() + 1
    }
}

/// Token-stage model: a vocabulary and the embeddings it indexes.
#[derive(Debug, Clone)]
pub struct TokensEncoderModel {
    vocabulary: Arc<Vocabulary>,
    embeddings: Shared<EmbeddingTable>,
}

impl TokensEncoderModel {
    pub fn new(vocabulary: Vocabulary, embeddings: Shared<EmbeddingTable>) -> PureResult<Self> {
        let rows = embeddings.read().vocab_size();
        if rows != vocabulary.rows() {
            return Err(TensorError::DataLength {
                expected: vocabulary.rows(),
                got: rows,
            });
        }
        Ok(Self {
            vocabulary: Arc::new(vocabulary),
            embeddings,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn embeddings(&self) -> &Shared<EmbeddingTable> {
        &self.embeddings
    }

    pub fn build_encoder(&self) -> FormTokensEncoder {
        FormTokensEncoder {
            vocabulary: Arc::clone(&self.vocabulary),
            embeddings: EmbeddingEncoder::new(Arc::clone(&self.embeddings)),
        }
    }
}

/// Token-stage processor over a sentence.
#[derive(Debug, Clone)]
pub struct FormTokensEncoder {
    vocabulary: Arc<Vocabulary>,
    embeddings: EmbeddingEncoder,
}

impl SequenceEncoder<ParsingSentence> for FormTokensEncoder {
    fn forward(&mut self, input: &ParsingSentence) -> PureResult<Tensor> {
        let indices: Vec<usize> = input
            .tokens()
            .iter()
            .map(|token| self.vocabulary.index_of(token.form()))
            .collect();
        self.embeddings.forward(&indices[..])
    }

    fn backward(&mut self, output_errors: &Tensor) -> PureResult<()> {
        self.embeddings.backward(output_errors)
    }

    fn input_errors(&self, _copy: bool) -> PureResult<Cow<'_, Tensor>> {
        Err(TensorError::UnsupportedOperation {
            label: "tokens_encoder_input_errors",
        })
    }

    fn params_errors(&self, copy: bool) -> PureResult<Cow<'_, GradientSet>> {
        self.embeddings.params_errors(copy)
    }
}
