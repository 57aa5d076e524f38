// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use st_lss::{
    BiRnnConfig, LssConfig, LssError, LssModel, LssOptimizer, OutputErrors, ParsingSentence,
    ParsingToken, Vocabulary,
};
use st_nn::{Activation, LearningRate, RecurrentKind, SequenceEncoder, Tensor};
use std::sync::Arc;

fn vocabulary() -> Vocabulary {
    Vocabulary::from_forms(["the", "cat", "sat", "on", "mat", "."])
}

fn sentence() -> ParsingSentence {
    ParsingSentence::new(vec![
        ParsingToken::new(1, "the"),
        ParsingToken::new(2, "cat"),
        ParsingToken::new(3, "sat"),
        ParsingToken::new(4, "."),
    ])
    .unwrap()
}

fn model(connection: RecurrentKind, layers: usize, seed: u64) -> LssModel {
    let config = LssConfig::new(4)
        .with_context(BiRnnConfig::new(connection, Activation::Tanh, layers))
        .with_heads(BiRnnConfig::new(connection, Activation::Tanh, 1))
        .with_seed(seed);
    LssModel::new(config, vocabulary()).unwrap()
}

fn ones(rows: usize, cols: usize) -> Tensor {
    Tensor::from_vec(rows, cols, vec![1.0; rows * cols]).unwrap()
}

#[test]
fn encode_produces_expected_shapes() {
    for connection in [RecurrentKind::Simple, RecurrentKind::Lstm] {
        for layers in [1, 2] {
            let model = model(connection, layers, 5);
            let sentence = sentence();
            let mut encoder = model.build_encoder(0);
            let lss = encoder.encode(&sentence).unwrap();
            assert_eq!(lss.len(), 4);
            assert_eq!(lss.tokens_encodings().shape(), (4, 4));
            assert_eq!(lss.context_vectors().shape(), (4, 8));
            assert_eq!(lss.latent_heads().shape(), (4, 8));
            assert_eq!(lss.virtual_root().len(), 8);
            assert_eq!(lss.latent_syntactic_encodings().unwrap().shape(), (4, 16));
            assert_eq!(
                lss.latent_syntactic_encoding(3).unwrap(),
                [lss.context_vector(3).unwrap(), lss.latent_head(3).unwrap()].concat()
            );
            lss.latent_heads().ensure_finite("latent_heads").unwrap();
        }
    }
}

#[test]
fn encoders_of_one_model_agree() {
    let model = model(RecurrentKind::Lstm, 2, 13);
    let sentence = sentence();
    let mut first = model.build_encoder(0);
    let mut second = model.build_encoder(1);
    let a = first.encode(&sentence).unwrap();
    let b = second.encode(&sentence).unwrap();
    assert_eq!(a.latent_heads(), b.latent_heads());
    assert_eq!(a.virtual_root(), b.virtual_root());

    let twin = self::model(RecurrentKind::Lstm, 2, 13);
    let mut third = twin.build_encoder(2);
    let c = third.encode(&sentence).unwrap();
    assert_eq!(a.context_vectors(), c.context_vectors());
    assert_eq!(a.latent_heads(), c.latent_heads());
}

#[test]
fn context_errors_can_cancel_the_heads_contribution() {
    let model = model(RecurrentKind::Simple, 1, 21);
    let sentence = sentence();
    let mut encoder = model.build_encoder(0);
    let heads_errors = ones(4, 8);

    encoder.encode(&sentence).unwrap();
    encoder
        .propagate_errors(&OutputErrors::new(4).with_latent_heads(heads_errors.clone()))
        .unwrap();
    let seam = encoder.heads_encoder().input_errors(true).unwrap().into_owned();
    let params = encoder.collect_parameter_errors(false).unwrap();
    assert!(params.context_encoder_params.squared_l2_norm() > 0.0);
    assert!(params.tokens_encoder_params.squared_l2_norm() > 0.0);

    encoder.encode(&sentence).unwrap();
    encoder
        .propagate_errors(
            &OutputErrors::new(4)
                .with_latent_heads(heads_errors)
                .with_context_vectors(seam.scale(-1.0).unwrap()),
        )
        .unwrap();
    let params = encoder.collect_parameter_errors(true).unwrap();
    assert!(params.heads_encoder_params.squared_l2_norm() > 0.0);
    assert_eq!(params.context_encoder_params.squared_l2_norm(), 0.0);
    assert_eq!(params.tokens_encoder_params.squared_l2_norm(), 0.0);
}

#[test]
fn parameter_errors_are_named_after_model_parameters() {
    let model = model(RecurrentKind::Lstm, 2, 3);
    let sentence = sentence();
    let mut encoder = model.build_encoder(0);
    encoder.encode(&sentence).unwrap();
    encoder
        .propagate_errors(&OutputErrors::new(4).with_latent_heads(ones(4, 8)))
        .unwrap();
    let params = encoder.collect_parameter_errors(false).unwrap();
    let state = model.state_dict().unwrap();
    for set in [
        &params.tokens_encoder_params,
        &params.context_encoder_params,
        &params.heads_encoder_params,
    ] {
        assert!(!set.is_empty());
        for (name, grad) in set.iter() {
            let value = state.get(name).unwrap();
            assert_eq!(value.shape(), grad.shape(), "{name}");
        }
    }
}

#[test]
fn an_optimizer_step_changes_the_encoding() {
    let model = model(RecurrentKind::Lstm, 1, 8);
    let sentence = sentence();
    let mut encoder = model.build_encoder(0);
    let mut optimizer = LssOptimizer::new(&model, Arc::new(LearningRate::new(0.1).unwrap()));

    let before = encoder.encode(&sentence).unwrap().latent_heads().clone();
    let root_before = model.root_vector();
    encoder
        .propagate_errors(&OutputErrors::new(4).with_latent_heads(ones(4, 8)))
        .unwrap();
    optimizer
        .accumulate(encoder.collect_parameter_errors(false).unwrap())
        .unwrap();
    optimizer.accumulate_root(&ones(1, 8)).unwrap();
    optimizer.update().unwrap();

    let after = encoder.encode(&sentence).unwrap().latent_heads().clone();
    assert_ne!(before, after);
    let root_after = model.root_vector();
    for (old, new) in root_before.data().iter().zip(root_after.data()) {
        approx::assert_relative_eq!(old - 0.1, *new, epsilon = 1e-6);
    }
}

#[test]
fn errors_from_several_sentences_are_averaged() {
    let model = model(RecurrentKind::Simple, 1, 2);
    let reference = self::model(RecurrentKind::Simple, 1, 2);
    let sentence = sentence();
    let errors = OutputErrors::new(4).with_latent_heads(ones(4, 8));

    let mut optimizer = LssOptimizer::new(&model, Arc::new(LearningRate::new(0.05).unwrap()));
    let mut first = model.build_encoder(0);
    let mut second = model.build_encoder(1);
    first.encode(&sentence).unwrap();
    second.encode(&sentence).unwrap();
    first.propagate_errors(&errors).unwrap();
    second.propagate_errors(&errors).unwrap();
    optimizer
        .accumulate(first.collect_parameter_errors(true).unwrap())
        .unwrap();
    optimizer
        .accumulate(second.collect_parameter_errors(false).unwrap())
        .unwrap();
    optimizer.update().unwrap();

    let mut single = LssOptimizer::new(&reference, Arc::new(LearningRate::new(0.05).unwrap()));
    let mut encoder = reference.build_encoder(0);
    encoder.encode(&sentence).unwrap();
    encoder.propagate_errors(&errors).unwrap();
    single
        .accumulate(encoder.collect_parameter_errors(false).unwrap())
        .unwrap();
    single.update().unwrap();

    let averaged = model.state_dict().unwrap();
    let expected = reference.state_dict().unwrap();
    for (name, value) in expected {
        for (a, b) in value.data().iter().zip(averaged[&name].data()) {
            approx::assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }
}

#[test]
fn root_errors_must_match_the_context_width() {
    let model = model(RecurrentKind::Simple, 1, 4);
    let mut optimizer = LssOptimizer::new(&model, Arc::new(LearningRate::new(0.1).unwrap()));
    assert!(matches!(
        optimizer.accumulate_root(&ones(1, 4)),
        Err(LssError::ErrorsShape {
            slot: "virtual_root",
            ..
        })
    ));
}

#[test]
fn structure_keeps_the_root_of_its_encode() {
    let model = model(RecurrentKind::Simple, 1, 6);
    let sentence = sentence();
    let mut encoder = model.build_encoder(0);
    let lss = encoder.encode(&sentence).unwrap();
    let root = lss.virtual_root().to_vec();
    let mut optimizer = LssOptimizer::new(&model, Arc::new(LearningRate::new(0.5).unwrap()));
    optimizer.accumulate_root(&ones(1, 8)).unwrap();
    optimizer.update().unwrap();
    assert_eq!(lss.virtual_root(), &root[..]);
    assert_ne!(model.root_vector().data(), &root[..]);
}

#[test]
fn lifecycle_and_input_checks() {
    let model = model(RecurrentKind::Simple, 1, 1);
    let sentence = sentence();
    let mut encoder = model.build_encoder(0);
    assert!(matches!(
        encoder.propagate_errors(&OutputErrors::new(4)),
        Err(LssError::Lifecycle(_))
    ));
    assert!(matches!(
        encoder.encode(&ParsingSentence::new(Vec::new()).unwrap()),
        Err(LssError::EmptySentence)
    ));
    encoder.encode(&sentence).unwrap();
    assert!(matches!(
        encoder.propagate_errors(&OutputErrors::new(4).with_tokens_encodings(ones(4, 8))),
        Err(LssError::ErrorsShape { .. })
    ));
    encoder.propagate_errors(&OutputErrors::new(4)).unwrap();
    assert!(matches!(
        encoder.input_errors(false),
        Err(LssError::UnsupportedOperation(_))
    ));
}
