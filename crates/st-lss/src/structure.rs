// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{LssError, LssResult};
use crate::language::{ParsingSentence, TokenId};
use once_cell::sync::OnceCell;
use st_tensor::{Tensor, TensorError};

/// Encodings of one sentence: a row per token in each sequence plus the
/// virtual root, addressed by id `-1` in scored arcs.
#[derive(Clone, Debug)]
pub struct LatentSyntacticStructure<'s> {
    sentence: &'s ParsingSentence,
    tokens_encodings: Tensor,
    context_vectors: Tensor,
    latent_heads: Tensor,
    virtual_root: Tensor,
    latent_syntactic_encodings: OnceCell<Tensor>,
}

impl<'s> LatentSyntacticStructure<'s> {
    pub fn new(
        sentence: &'s ParsingSentence,
        tokens_encodings: Tensor,
        context_vectors: Tensor,
        latent_heads: Tensor,
        virtual_root: Tensor,
    ) -> LssResult<Self> {
        let size = sentence.len();
        for (slot, tensor) in [
            ("tokens_encodings", &tokens_encodings),
            ("context_vectors", &context_vectors),
            ("latent_heads", &latent_heads),
        ] {
            if tensor.rows() != size {
                return Err(LssError::SequenceLength {
                    slot,
                    expected: size,
                    got: tensor.rows(),
                });
            }
        }
        if virtual_root.rows() != 1 {
            return Err(LssError::SequenceLength {
                slot: "virtual_root",
                expected: 1,
                got: virtual_root.rows(),
            });
        }
        if latent_heads.cols() != context_vectors.cols() {
            return Err(TensorError::ShapeMismatch {
                left: context_vectors.shape(),
                right: latent_heads.shape(),
            }
            .into());
        }
        if virtual_root.cols() != context_vectors.cols() {
            return Err(TensorError::ShapeMismatch {
                left: context_vectors.shape(),
                right: virtual_root.shape(),
            }
            .into());
        }
        Ok(Self {
            sentence,
            tokens_encodings,
            context_vectors,
            latent_heads,
            virtual_root,
            latent_syntactic_encodings: OnceCell::new(),
        })
    }

    pub fn sentence(&self) -> &'s ParsingSentence {
        self.sentence
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.sentence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentence.is_empty()
    }

    pub fn tokens_encodings(&self) -> &Tensor {
        &self.tokens_encodings
    }

    pub fn context_vectors(&self) -> &Tensor {
        &self.context_vectors
    }

    pub fn latent_heads(&self) -> &Tensor {
        &self.latent_heads
    }

    pub fn virtual_root(&self) -> &[f32] {
        self.virtual_root.row(0)
    }

    /// Row `i` is `[context_vectors[i] | latent_heads[i]]`, computed once.
    pub fn latent_syntactic_encodings(&self) -> LssResult<&Tensor> {
        self.latent_syntactic_encodings
            .get_or_try_init(|| self.context_vectors.concat_cols(&self.latent_heads))
            .map_err(LssError::from)
    }

    pub fn token_encoding(&self, id: TokenId) -> LssResult<&[f32]> {
        Ok(self.tokens_encodings.row(self.sentence.token_index(id)?))
    }

    pub fn context_vector(&self, id: TokenId) -> LssResult<&[f32]> {
        Ok(self.context_vectors.row(self.sentence.token_index(id)?))
    }

    pub fn latent_head(&self, id: TokenId) -> LssResult<&[f32]> {
        Ok(self.latent_heads.row(self.sentence.token_index(id)?))
    }

    pub fn latent_syntactic_encoding(&self, id: TokenId) -> LssResult<&[f32]> {
        let index = self.sentence.token_index(id)?;
        Ok(self.latent_syntactic_encodings()?.row(index))
    }

    /// Copy with unit-length context vectors, latent heads and root.
    /// Token encodings are shared with `self`.
    pub fn normalized(&self) -> LatentSyntacticStructure<'s> {
        LatentSyntacticStructure {
            sentence: self.sentence,
            tokens_encodings: self.tokens_encodings.clone(),
            context_vectors: self.context_vectors.normalize_rows(),
            latent_heads: self.latent_heads.normalize_rows(),
            virtual_root: self.virtual_root.normalize_rows(),
            latent_syntactic_encodings: OnceCell::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ParsingToken;
    use approx::assert_relative_eq;

    fn sentence() -> ParsingSentence {
        ParsingSentence::new(vec![ParsingToken::new(4, "to"), ParsingToken::new(2, "be")]).unwrap()
    }

    fn structure(sentence: &ParsingSentence) -> LatentSyntacticStructure<'_> {
        LatentSyntacticStructure::new(
            sentence,
            Tensor::from_rows(&[[1.0f32], [2.0]]).unwrap(),
            Tensor::from_rows(&[[3.0f32, 4.0], [0.0, 2.0]]).unwrap(),
            Tensor::from_rows(&[[1.0f32, 0.0], [0.5, 0.5]]).unwrap(),
            Tensor::from_rows(&[[0.0f32, 5.0]]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn lookups_go_through_the_id_map() {
        let sentence = sentence();
        let lss = structure(&sentence);
        assert_eq!(lss.context_vector(2).unwrap(), &[0.0, 2.0]);
        assert_eq!(lss.token_encoding(4).unwrap(), &[1.0]);
        assert_eq!(lss.latent_head(4).unwrap(), &[1.0, 0.0]);
        assert!(lss.latent_head(3).is_err());
    }

    #[test]
    fn latent_syntactic_encodings_concatenate_and_cache() {
        let sentence = sentence();
        let lss = structure(&sentence);
        let first = lss.latent_syntactic_encodings().unwrap() as *const Tensor;
        assert_eq!(lss.latent_syntactic_encoding(4).unwrap(), &[3.0, 4.0, 1.0, 0.0]);
        assert_eq!(lss.latent_syntactic_encoding(2).unwrap(), &[0.0, 2.0, 0.5, 0.5]);
        let second = lss.latent_syntactic_encodings().unwrap() as *const Tensor;
        assert_eq!(first, second);
    }

    #[test]
    fn normalized_copy_leaves_original_untouched() {
        let sentence = sentence();
        let lss = structure(&sentence);
        let norm = lss.normalized();
        assert_relative_eq!(norm.context_vector(4).unwrap()[0], 0.6, epsilon = 1e-6);
        assert_relative_eq!(norm.virtual_root()[1], 1.0, epsilon = 1e-6);
        assert_eq!(lss.context_vector(4).unwrap(), &[3.0, 4.0]);
        assert_eq!(lss.virtual_root(), &[0.0, 5.0]);
    }

    #[test]
    fn mismatched_rows_are_rejected() {
        let sentence = sentence();
        let err = LatentSyntacticStructure::new(
            &sentence,
            Tensor::zeros(1, 1).unwrap(),
            Tensor::zeros(2, 2).unwrap(),
            Tensor::zeros(2, 2).unwrap(),
            Tensor::zeros(1, 2).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LssError::SequenceLength {
                slot: "tokens_encodings",
                ..
            }
        ));
    }
}
