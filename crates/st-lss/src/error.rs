// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::language::TokenId;
use st_tensor::TensorError;
use thiserror::Error;

pub type LssResult<T> = Result<T, LssError>;

#[derive(Debug, Error)]
pub enum LssError {
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("lifecycle violation: {0}")]
    Lifecycle(&'static str),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    #[error("cannot encode an empty sentence")]
    EmptySentence,
    #[error("token id {0} appears more than once in the sentence")]
    DuplicateToken(TokenId),
    #[error("token id {0} is not part of the sentence")]
    UnknownToken(TokenId),
    #[error("{slot} must have {expected} rows, got {got}")]
    SequenceLength {
        slot: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{slot} errors must be {expected:?}, got {got:?}")]
    ErrorsShape {
        slot: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("scores of dependent {dependent} sum to zero or are not finite")]
    DegenerateScores { dependent: TokenId },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },
}
