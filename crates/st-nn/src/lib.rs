// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Sequence encoders built on SpiralTorch tensors.
//!
//! Models ([`Module`]) own parameters and sit behind a [`Shared`] store.
//! Processors ([`SequenceEncoder`]) borrow them read-only for one sequence at
//! a time, and [`optim::ParamsOptimizer`] writes the averaged errors back.

pub mod encoder;
pub mod gradient;
pub mod io;
pub mod layers;
pub mod module;
pub mod optim;

pub use encoder::SequenceEncoder;
pub use gradient::GradientSet;
pub use io::{load_json, load_state_dict_json, save_json, save_state_dict_json};
pub use layers::{
    Activation, BiRnn, BiRnnEncoder, DeepBiRnn, DeepBiRnnEncoder, EmbeddingEncoder,
    EmbeddingTable, OutputMerge, RecurrentKind,
};
pub use module::{share, Module, Parameter, Shared};
pub use optim::{Adam, LearningRate, ParamsOptimizer, UpdateMethod};

pub use st_tensor::{PureResult, Tensor, TensorError};
