// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Sentences as seen by the encoder: identified tokens with an optional form.

use crate::error::{LssError, LssResult};
use std::collections::HashMap;

/// Token identifier. Unique within a sentence, not necessarily contiguous.
pub type TokenId = i32;

/// Character span of a token in the source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsingToken {
    id: TokenId,
    form: Option<String>,
    punctuation: bool,
    position: Option<Position>,
}

impl ParsingToken {
    /// Token with a surface form. Punctuation is inferred from the form.
    pub fn new(id: TokenId, form: impl Into<String>) -> Self {
        let form = form.into();
        let punctuation = is_punctuation_form(&form);
        Self {
            id,
            form: Some(form),
            punctuation,
            position: None,
        }
    }

    /// Token without a surface form (e.g. an empty node).
    pub fn formless(id: TokenId) -> Self {
        Self {
            id,
            form: None,
            punctuation: false,
            position: None,
        }
    }

    pub fn with_punctuation(mut self, punctuation: bool) -> Self {
        self.punctuation = punctuation;
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn form(&self) -> Option<&str> {
        self.form.as_deref()
    }

    pub fn is_punctuation(&self) -> bool {
        self.punctuation
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }
}

/// True when `form` is non-empty and has no letters, digits or spaces.
pub fn is_punctuation_form(form: &str) -> bool {
    !form.is_empty()
        && form
            .chars()
            .all(|c| !c.is_alphanumeric() && !c.is_whitespace())
}

/// Ordered tokens with an id → index map.
#[derive(Clone, Debug)]
pub struct ParsingSentence {
    tokens: Vec<ParsingToken>,
    index: HashMap<TokenId, usize>,
}

impl ParsingSentence {
    pub fn new(tokens: Vec<ParsingToken>) -> LssResult<Self> {
        let mut index = HashMap::with_capacity(tokens.len());
        for (position, token) in tokens.iter().enumerate() {
            if index.insert(token.id, position).is_some() {
                return Err(LssError::DuplicateToken(token.id));
            }
        }
        Ok(Self { tokens, index })
    }

    pub fn tokens(&self) -> &[ParsingToken] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token_index(&self, id: TokenId) -> LssResult<usize> {
        self.index
            .get(&id)
            .copied()
            .ok_or(LssError::UnknownToken(id))
    }

    pub fn token(&self, id: TokenId) -> LssResult<&ParsingToken> {
        Ok(&self.tokens[self.token_index(id)?])
    }
}
