// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! The three-stage encoding pipeline.
//!
//! `encode` runs tokens → context → heads. `propagate_errors` walks the same
//! stages backwards, adding each stage's input errors into the output errors
//! of the stage before it.

use crate::error::{LssError, LssResult};
use crate::language::ParsingSentence;
use crate::model::{LssModel, RootEmbedding};
use crate::params::LssParameters;
use crate::structure::LatentSyntacticStructure;
use crate::tokens::FormTokensEncoder;
use st_nn::encoder::SequenceEncoder;
use st_nn::{BiRnnEncoder, DeepBiRnnEncoder, Shared, Tensor};
use std::borrow::Cow;
use std::convert::Infallible;
use tracing::{debug, debug_span, trace};

/// Errors on the outputs of one `encode` call.
///
/// Slots left empty are treated as zero matrices of `size` rows.
#[derive(Clone, Debug, Default)]
pub struct OutputErrors {
    pub size: usize,
    pub tokens_encodings: Option<Tensor>,
    pub context_vectors: Option<Tensor>,
    pub latent_heads: Option<Tensor>,
}

impl OutputErrors {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn with_tokens_encodings(mut self, errors: Tensor) -> Self {
        self.tokens_encodings = Some(errors);
        self
    }

    pub fn with_context_vectors(mut self, errors: Tensor) -> Self {
        self.context_vectors = Some(errors);
        self
    }

    pub fn with_latent_heads(mut self, errors: Tensor) -> Self {
        self.latent_heads = Some(errors);
        self
    }

    fn resolve<'a>(
        &self,
        slot: &'static str,
        errors: Option<&'a Tensor>,
        width: usize,
    ) -> LssResult<Cow<'a, Tensor>> {
        let expected = (self.size, width);
        match errors {
            Some(tensor) if tensor.shape() == expected => Ok(Cow::Borrowed(tensor)),
            Some(tensor) => Err(LssError::ErrorsShape {
                slot,
                expected,
                got: tensor.shape(),
            }),
            None => Ok(Cow::Owned(Tensor::zeros(self.size, width)?)),
        }
    }
}

/// Output widths of the token and context stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageWidths {
    pub token_encoding_size: usize,
    pub context_vectors_size: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Encoded { size: usize },
    Propagated,
}

/// Encoding pipeline over a token stage `T`, a contextual stage `C` and a
/// heads stage `H`.
///
/// An encoder holds at most one in-flight cycle: a new `encode` discards the
/// previous one. Errors can be propagated once per `encode`.
#[derive(Debug)]
pub struct LssEncoder<T = FormTokensEncoder, C = DeepBiRnnEncoder, H = BiRnnEncoder> {
    id: usize,
    widths: StageWidths,
    root: Shared<RootEmbedding>,
    tokens_encoder: T,
    context_encoder: C,
    heads_encoder: H,
    phase: Phase,
}

impl LssEncoder {
    pub fn new(model: &LssModel, id: usize) -> Self {
        Self::with_stages(
            id,
            StageWidths {
                token_encoding_size: model.token_encoding_size(),
                context_vectors_size: model.context_vectors_size(),
            },
            model.root_embedding().clone(),
            model.tokens_encoder().build_encoder(),
            DeepBiRnnEncoder::new(model.context_encoder().clone()),
            BiRnnEncoder::new(model.heads_encoder().clone()),
        )
    }
}

impl<T, C, H> LssEncoder<T, C, H>
where
    T: SequenceEncoder<ParsingSentence>,
    C: SequenceEncoder<Tensor>,
    H: SequenceEncoder<Tensor>,
{
    pub fn with_stages(
        id: usize,
        widths: StageWidths,
        root: Shared<RootEmbedding>,
        tokens_encoder: T,
        context_encoder: C,
        heads_encoder: H,
    ) -> Self {
        Self {
            id,
            widths,
            root,
            tokens_encoder,
            context_encoder,
            heads_encoder,
            phase: Phase::Idle,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn widths(&self) -> StageWidths {
        self.widths
    }

    pub fn tokens_encoder(&self) -> &T {
        &self.tokens_encoder
    }

    pub fn context_encoder(&self) -> &C {
        &self.context_encoder
    }

    pub fn heads_encoder(&self) -> &H {
        &self.heads_encoder
    }

    pub fn encode<'s>(
        &mut self,
        sentence: &'s ParsingSentence,
    ) -> LssResult<LatentSyntacticStructure<'s>> {
        let span = debug_span!("lss_encode", encoder = self.id, tokens = sentence.len());
        let _entered = span.enter();
        self.phase = Phase::Idle;
        if sentence.is_empty() {
            return Err(LssError::EmptySentence);
        }
        let tokens_encodings = self.tokens_encoder.forward(sentence)?;
        let context_vectors = self.context_encoder.forward(&tokens_encodings)?;
        let latent_heads = self.heads_encoder.forward(&context_vectors)?;
        let virtual_root = self.root.read().vector().clone();
        let structure = LatentSyntacticStructure::new(
            sentence,
            tokens_encodings,
            context_vectors,
            latent_heads,
            virtual_root,
        )?;
        self.phase = Phase::Encoded {
            size: sentence.len(),
        };
        trace!("sentence encoded");
        Ok(structure)
    }

    pub fn propagate_errors(&mut self, errors: &OutputErrors) -> LssResult<()> {
        let size = match self.phase {
            Phase::Encoded { size } => size,
            Phase::Idle => {
                return Err(LssError::Lifecycle(
                    "propagate_errors requires a preceding encode",
                ))
            }
            Phase::Propagated => {
                return Err(LssError::Lifecycle(
                    "errors were already propagated for the last encode",
                ))
            }
        };
        if errors.size != size {
            return Err(LssError::SequenceLength {
                slot: "output_errors",
                expected: size,
                got: errors.size,
            });
        }
        let span = debug_span!("lss_propagate_errors", encoder = self.id, tokens = size);
        let _entered = span.enter();
        let context_width = self.widths.context_vectors_size;
        let token_width = self.widths.token_encoding_size;
        let heads_errors =
            errors.resolve("latent_heads", errors.latent_heads.as_ref(), context_width)?;
        let context_errors =
            errors.resolve("context_vectors", errors.context_vectors.as_ref(), context_width)?;
        let tokens_errors = errors.resolve(
            "tokens_encodings",
            errors.tokens_encodings.as_ref(),
            token_width,
        )?;

        self.phase = Phase::Idle;
        self.heads_encoder.backward(&heads_errors)?;
        let mut context_errors = context_errors.into_owned();
        context_errors.add_scaled(&*self.heads_encoder.input_errors(false)?, 1.0)?;

        self.context_encoder.backward(&context_errors)?;
        let mut tokens_errors = tokens_errors.into_owned();
        tokens_errors.add_scaled(&*self.context_encoder.input_errors(false)?, 1.0)?;

        self.tokens_encoder.backward(&tokens_errors)?;
        self.phase = Phase::Propagated;
        debug!("errors propagated");
        Ok(())
    }

    /// Parameter errors of the last `propagate_errors`. With `copy` unset the
    /// aggregate borrows from this encoder.
    pub fn collect_parameter_errors(&self, copy: bool) -> LssResult<LssParameters<'_>> {
        if self.phase != Phase::Propagated {
            return Err(LssError::Lifecycle(
                "collect_parameter_errors requires a preceding propagate_errors",
            ));
        }
        Ok(LssParameters {
            tokens_encoder_params: self.tokens_encoder.params_errors(copy)?,
            context_encoder_params: self.context_encoder.params_errors(copy)?,
            heads_encoder_params: self.heads_encoder.params_errors(copy)?,
        })
    }

    /// The pipeline has no differentiable input.
    pub fn input_errors(&self, _copy: bool) -> LssResult<Infallible> {
        Err(LssError::UnsupportedOperation(
            "the encoding pipeline does not produce input errors",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ParsingToken;
    use crate::model::RootEmbedding;
    use st_nn::encoder::lend;
    use st_nn::{share, GradientSet, PureResult, TensorError};

    /// Token stage emitting `[id, id]` per token.
    #[derive(Default)]
    struct IdTokens {
        received: Option<Tensor>,
        grads: Option<GradientSet>,
    }

    impl SequenceEncoder<ParsingSentence> for IdTokens {
        fn forward(&mut self, input: &ParsingSentence) -> PureResult<Tensor> {
            let rows: Vec<[f32; 2]> = input
                .tokens()
                .iter()
                .map(|token| [token.id() as f32; 2])
                .collect();
            Tensor::from_rows(&rows)
        }

        fn backward(&mut self, output_errors: &Tensor) -> PureResult<()> {
            let mut grads = GradientSet::new();
            grads.insert("tokens", output_errors.clone())?;
            self.received = Some(output_errors.clone());
            self.grads = Some(grads);
            Ok(())
        }

        fn input_errors(&self, _copy: bool) -> PureResult<Cow<'_, Tensor>> {
            Err(TensorError::UnsupportedOperation { label: "id_tokens" })
        }

        fn params_errors(&self, copy: bool) -> PureResult<Cow<'_, GradientSet>> {
            self.grads
                .as_ref()
                .map(|grads| lend(grads, copy))
                .ok_or(TensorError::InvalidValue { label: "id_tokens" })
        }
    }

    /// Linear stage `y = [x | x] * factor`, whose input errors are
    /// `factor * (e_left + e_right)`.
    struct Doubling {
        factor: f32,
        name: &'static str,
        received: Option<Tensor>,
        input_errors: Option<Tensor>,
        grads: Option<GradientSet>,
    }

    impl Doubling {
        fn new(name: &'static str, factor: f32) -> Self {
            Self {
                factor,
                name,
                received: None,
                input_errors: None,
                grads: None,
            }
        }
    }

    impl SequenceEncoder<Tensor> for Doubling {
        fn forward(&mut self, input: &Tensor) -> PureResult<Tensor> {
            input.concat_cols(input)?.scale(self.factor)
        }

        fn backward(&mut self, output_errors: &Tensor) -> PureResult<()> {
            let (left, right) = output_errors.split_cols(output_errors.cols() / 2)?;
            self.received = Some(output_errors.clone());
            self.input_errors = Some(left.add(&right)?.scale(self.factor)?);
            let mut grads = GradientSet::new();
            grads.insert(self.name, output_errors.clone())?;
            self.grads = Some(grads);
            Ok(())
        }

        fn input_errors(&self, copy: bool) -> PureResult<Cow<'_, Tensor>> {
            self.input_errors
                .as_ref()
                .map(|errors| lend(errors, copy))
                .ok_or(TensorError::InvalidValue { label: "doubling" })
        }

        fn params_errors(&self, copy: bool) -> PureResult<Cow<'_, GradientSet>> {
            self.grads
                .as_ref()
                .map(|grads| lend(grads, copy))
                .ok_or(TensorError::InvalidValue { label: "doubling" })
        }
    }

    /// Heads stage that keeps the width: `y = x * factor`.
    struct Scaling {
        factor: f32,
        received: Option<Tensor>,
        input_errors: Option<Tensor>,
    }

    impl SequenceEncoder<Tensor> for Scaling {
        fn forward(&mut self, input: &Tensor) -> PureResult<Tensor> {
            input.scale(self.factor)
        }

        fn backward(&mut self, output_errors: &Tensor) -> PureResult<()> {
            self.received = Some(output_errors.clone());
            self.input_errors = Some(output_errors.scale(self.factor)?);
            Ok(())
        }

        fn input_errors(&self, copy: bool) -> PureResult<Cow<'_, Tensor>> {
            self.input_errors
                .as_ref()
                .map(|errors| lend(errors, copy))
                .ok_or(TensorError::InvalidValue { label: "scaling" })
        }

        fn params_errors(&self, _copy: bool) -> PureResult<Cow<'_, GradientSet>> {
            Ok(Cow::Owned(GradientSet::new()))
        }
    }

    fn mock_encoder() -> LssEncoder<IdTokens, Doubling, Scaling> {
        let root = share(RootEmbedding::new(4, Some(1)).unwrap());
        LssEncoder::with_stages(
            7,
            StageWidths {
                token_encoding_size: 2,
                context_vectors_size: 4,
            },
            root,
            IdTokens::default(),
            Doubling::new("context", 1.0),
            Scaling {
                factor: 2.0,
                received: None,
                input_errors: None,
            },
        )
    }

    fn sentence() -> ParsingSentence {
        ParsingSentence::new(vec![ParsingToken::new(3, "a"), ParsingToken::new(1, "b")]).unwrap()
    }

    #[test]
    fn encode_chains_the_stages() {
        let sentence = sentence();
        let mut encoder = mock_encoder();
        let lss = encoder.encode(&sentence).unwrap();
        assert_eq!(lss.token_encoding(3).unwrap(), &[3.0, 3.0]);
        assert_eq!(lss.context_vector(1).unwrap(), &[1.0; 4]);
        assert_eq!(lss.latent_head(3).unwrap(), &[6.0; 4]);
        assert_eq!(lss.virtual_root().len(), 4);
        assert_eq!(encoder.id(), 7);
    }

    #[test]
    fn errors_merge_additively_at_each_seam() {
        let sentence = sentence();
        let mut encoder = mock_encoder();
        encoder.encode(&sentence).unwrap();
        let heads = Tensor::from_vec(2, 4, vec![1.0; 8]).unwrap();
        let context = Tensor::from_vec(2, 4, vec![0.5; 8]).unwrap();
        let tokens = Tensor::from_vec(2, 2, vec![0.25; 4]).unwrap();
        encoder
            .propagate_errors(
                &OutputErrors::new(2)
                    .with_latent_heads(heads.clone())
                    .with_context_vectors(context)
                    .with_tokens_encodings(tokens),
            )
            .unwrap();
        assert_eq!(encoder.heads_encoder().received.as_ref(), Some(&heads));
        // 0.5 explicit + 2.0 * 1.0 from the heads stage
        assert_eq!(
            encoder.context_encoder().received.as_ref().unwrap().data(),
            &[2.5; 8]
        );
        // 0.25 explicit + (2.5 + 2.5) from the context stage
        assert_eq!(
            encoder.tokens_encoder().received.as_ref().unwrap().data(),
            &[5.25; 4]
        );
        let params = encoder.collect_parameter_errors(false).unwrap();
        assert!(matches!(params.tokens_encoder_params, Cow::Borrowed(_)));
        assert!(params.context_encoder_params.contains("context"));
        let owned = encoder.collect_parameter_errors(true).unwrap();
        assert!(matches!(owned.context_encoder_params, Cow::Owned(_)));
    }

    #[test]
    fn missing_slots_are_zero() {
        let sentence = sentence();
        let mut encoder = mock_encoder();
        encoder.encode(&sentence).unwrap();
        encoder
            .propagate_errors(
                &OutputErrors::new(2)
                    .with_context_vectors(Tensor::from_vec(2, 4, vec![1.0; 8]).unwrap()),
            )
            .unwrap();
        assert_eq!(
            encoder.heads_encoder().received.as_ref().unwrap().squared_l2_norm(),
            0.0
        );
        assert_eq!(
            encoder.tokens_encoder().received.as_ref().unwrap().data(),
            &[2.0; 4]
        );
    }

    #[test]
    fn lifecycle_is_enforced() {
        let sentence = sentence();
        let mut encoder = mock_encoder();
        let errors = OutputErrors::new(2);
        assert!(matches!(
            encoder.propagate_errors(&errors),
            Err(LssError::Lifecycle(_))
        ));
        encoder.encode(&sentence).unwrap();
        assert!(matches!(
            encoder.collect_parameter_errors(false),
            Err(LssError::Lifecycle(_))
        ));
        encoder.propagate_errors(&errors).unwrap();
        assert!(matches!(
            encoder.propagate_errors(&errors),
            Err(LssError::Lifecycle(_))
        ));
        encoder.encode(&sentence).unwrap();
        assert!(encoder.collect_parameter_errors(false).is_err());
        assert!(matches!(
            encoder.input_errors(true),
            Err(LssError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn malformed_errors_are_rejected_before_any_stage_runs() {
        let sentence = sentence();
        let mut encoder = mock_encoder();
        encoder.encode(&sentence).unwrap();
        let wrong_width =
            OutputErrors::new(2).with_latent_heads(Tensor::zeros(2, 3).unwrap());
        assert!(matches!(
            encoder.propagate_errors(&wrong_width),
            Err(LssError::ErrorsShape {
                slot: "latent_heads",
                ..
            })
        ));
        assert!(encoder.heads_encoder().received.is_none());
        assert!(matches!(
            encoder.propagate_errors(&OutputErrors::new(3)),
            Err(LssError::SequenceLength { .. })
        ));
        // the cycle is still open after a rejected payload
        encoder.propagate_errors(&OutputErrors::new(2)).unwrap();
    }

    #[test]
    fn empty_sentence_is_rejected() {
        let empty = ParsingSentence::new(Vec::new()).unwrap();
        let mut encoder = mock_encoder();
        assert!(matches!(
            encoder.encode(&empty),
            Err(LssError::EmptySentence)
        ));
    }
}
