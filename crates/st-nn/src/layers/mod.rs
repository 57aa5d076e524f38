// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

pub mod activation;
pub mod birnn;
pub mod embedding;
pub mod lstm;
pub mod recurrent;

pub use activation::Activation;
pub use birnn::{BiRnn, BiRnnEncoder, BiRnnState, DeepBiRnn, DeepBiRnnEncoder, OutputMerge};
pub use embedding::{EmbeddingEncoder, EmbeddingTable};
pub use lstm::Lstm;
pub use recurrent::{RecurrentKind, RecurrentUnit, SimpleRecurrent};
