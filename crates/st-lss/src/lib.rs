// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Latent syntactic structures.
//!
//! An [`LssModel`] holds the token embeddings, the contextual BiRNN, the heads
//! BiRNN and the virtual root. [`LssEncoder`]s built from it turn a
//! [`ParsingSentence`] into a [`LatentSyntacticStructure`], propagate errors
//! back through the three stages and hand the collected parameter errors to
//! an [`LssOptimizer`]. A [`HeadsDecoder`] turns a structure into
//! [`ScoredArcs`].

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod language;
pub mod model;
pub mod optimizer;
pub mod params;
pub mod structure;
pub mod tokens;

pub use config::{BiRnnConfig, LssConfig};
pub use decoder::{rescale, CosineDecoder, HeadsDecoder, ScoredArcs, ROOT_ID};
pub use encoder::{LssEncoder, OutputErrors, StageWidths};
pub use error::{LssError, LssResult};
pub use language::{ParsingSentence, ParsingToken, Position, TokenId};
pub use model::{LssModel, RootEmbedding, ROOT_PARAMETER};
pub use optimizer::LssOptimizer;
pub use params::LssParameters;
pub use structure::LatentSyntacticStructure;
pub use tokens::{FormTokensEncoder, TokensEncoderModel, Vocabulary, UNKNOWN_INDEX};
