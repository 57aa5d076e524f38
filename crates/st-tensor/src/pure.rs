// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Pure Rust dense tensor used by the sequence encoders.
//!
//! A [`Tensor`] is a non-empty row-major matrix. Sequences are laid out along
//! the row axis (one row per token), which keeps every encoder stage a plain
//! `(steps, width)` transformation.

use core::fmt;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use spiral_config::determinism;
use std::error::Error;
use std::sync::Arc;

/// Result alias used throughout the pure module.
pub type PureResult<T> = Result<T, TensorError>;

/// Errors emitted by tensor utilities and the layers built on top of them.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorError {
    /// A tensor constructor received an invalid shape.
    InvalidDimensions { rows: usize, cols: usize },
    /// Data provided to a constructor or operator does not match the tensor shape.
    DataLength { expected: usize, got: usize },
    /// An operator was asked to combine tensors of incompatible shapes.
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    /// Learning rate must be positive for optimizers.
    NonPositiveLearningRate { rate: f32 },
    /// Computation received an empty input which would otherwise trigger a panic.
    EmptyInput(&'static str),
    /// Attempted to load or update a parameter that was missing from the state dict.
    MissingParameter { name: String },
    /// Numeric guard detected a non-finite value that would otherwise propagate NaNs.
    NonFiniteValue { label: &'static str, value: f32 },
    /// Generic configuration or lifecycle violation.
    InvalidValue { label: &'static str },
    /// The component cannot provide the requested quantity.
    UnsupportedOperation { label: &'static str },
    /// Filesystem failure while persisting or restoring tensors.
    IoError { message: String },
    /// Snapshot could not be encoded or decoded.
    SerializationError { message: String },
}

impl fmt::Display for TensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorError::InvalidDimensions { rows, cols } => {
                write!(
                    f,
                    "invalid tensor dimensions ({rows} x {cols}); both axes must be non-zero"
                )
            }
            TensorError::DataLength { expected, got } => {
                write!(f, "data length mismatch: expected {expected}, got {got}")
            }
            TensorError::ShapeMismatch { left, right } => {
                write!(
                    f,
                    "shape mismatch: left={:?}, right={:?} cannot be combined",
                    left, right
                )
            }
            TensorError::NonPositiveLearningRate { rate } => {
                write!(f, "learning rate must be positive, got {rate}")
            }
            TensorError::EmptyInput(label) => {
                write!(f, "{label} must not be empty for this computation")
            }
            TensorError::MissingParameter { name } => {
                write!(f, "missing parameter '{name}'")
            }
            TensorError::NonFiniteValue { label, value } => {
                write!(f, "non-finite value detected for {label}: {value}")
            }
            TensorError::InvalidValue { label } => {
                write!(f, "invalid value: {label}")
            }
            TensorError::UnsupportedOperation { label } => {
                write!(f, "unsupported operation: {label}")
            }
            TensorError::IoError { message } => write!(f, "io error: {message}"),
            TensorError::SerializationError { message } => {
                write!(f, "serialization error: {message}")
            }
        }
    }
}

impl Error for TensorError {}

/// A simple 2D tensor backed by a reference-counted row-major buffer.
///
/// Clones share the buffer; the first mutation of a shared tensor copies it.
#[derive(Clone, Debug)]
pub struct Tensor {
    data: Arc<Vec<f32>>,
    rows: usize,
    cols: usize,
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.cols == other.cols && self.data == other.data
    }
}

impl Tensor {
    fn seedable_rng(seed: Option<u64>, label: &str) -> StdRng {
        determinism::rng_from_optional(seed, label)
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> PureResult<Self> {
        Self::from_vec(rows, cols, vec![0.0; rows * cols])
    }

    /// Create a tensor from raw data. The provided vector must match
    /// `rows * cols` elements.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let expected = rows * cols;
        if expected != data.len() {
            return Err(TensorError::DataLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            data: Arc::new(data),
            rows,
            cols,
        })
    }

    /// Stacks equally sized row vectors.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> PureResult<Self> {
        let Some(first) = rows.first() else {
            return Err(TensorError::EmptyInput("Tensor::from_rows"));
        };
        let cols = first.as_ref().len();
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(TensorError::DataLength {
                    expected: cols,
                    got: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Self::from_vec(rows.len(), cols, data)
    }

    /// Construct a tensor by sampling a uniform distribution in `[min, max)`.
    ///
    /// `label` names the stream handed out by `spiral_config::determinism`, so
    /// two parameters built from the same seed still draw different values.
    pub fn random_uniform(
        rows: usize,
        cols: usize,
        min: f32,
        max: f32,
        seed: Option<u64>,
        label: &str,
    ) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        if !(min < max) {
            return Err(TensorError::InvalidValue {
                label: "random_uniform_bounds",
            });
        }
        let mut rng = Self::seedable_rng(seed, label);
        let distribution = Uniform::new(min, max);
        let data = (0..rows * cols)
            .map(|_| distribution.sample(&mut rng))
            .collect();
        Self::from_vec(rows, cols, data)
    }

    /// Glorot (Xavier) uniform initialisation in `±sqrt(6 / (rows + cols))`.
    pub fn glorot_uniform(
        rows: usize,
        cols: usize,
        seed: Option<u64>,
        label: &str,
    ) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let bound = (6.0 / (rows + cols) as f32).sqrt();
        Self::random_uniform(rows, cols, -bound, bound, seed, label)
    }

    /// Construct a tensor by applying a generator function to each coordinate.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> PureResult<Self>
    where
        F: FnMut(usize, usize) -> f32,
    {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self::from_vec(rows, cols, data)
    }

    /// Returns the `(rows, cols)` pair of the tensor.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of rows (sequence steps).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (vector width).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of elements stored in the tensor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false: tensors with a zero axis cannot be built.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a read-only view of the underlying buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns a mutable view of the underlying buffer.
    pub fn data_mut(&mut self) -> &mut [f32] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Returns row `index`.
    ///
    /// # Panics
    /// When `index >= rows`.
    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    /// Mutable access to row `index`.
    ///
    /// # Panics
    /// When `index >= rows`.
    pub fn row_mut(&mut self, index: usize) -> &mut [f32] {
        let cols = self.cols;
        &mut self.data_mut()[index * cols..(index + 1) * cols]
    }

    /// Iterates over rows in order.
    pub fn iter_rows(&self) -> impl DoubleEndedIterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.cols)
    }

    fn guard_same_shape(&self, other: &Tensor) -> PureResult<()> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(())
    }

    /// Element-wise addition.
    pub fn add(&self, other: &Tensor) -> PureResult<Tensor> {
        self.guard_same_shape(other)?;
        let data = self.data.iter().zip(other.data.iter()).map(|(a, b)| a + b).collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Element-wise subtraction.
    pub fn sub(&self, other: &Tensor) -> PureResult<Tensor> {
        self.guard_same_shape(other)?;
        let data = self.data.iter().zip(other.data.iter()).map(|(a, b)| a - b).collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Returns a new tensor where every element is scaled by `value`.
    pub fn scale(&self, value: f32) -> PureResult<Tensor> {
        let data = self.data.iter().map(|a| a * value).collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Element-wise product (Hadamard) between two tensors of identical shape.
    pub fn hadamard(&self, other: &Tensor) -> PureResult<Tensor> {
        self.guard_same_shape(other)?;
        let data = self.data.iter().zip(other.data.iter()).map(|(a, b)| a * b).collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Add a scaled tensor to this tensor (`self += scale * other`).
    pub fn add_scaled(&mut self, other: &Tensor, scale: f32) -> PureResult<()> {
        self.guard_same_shape(other)?;
        let data = Arc::make_mut(&mut self.data);
        for (a, b) in data.iter_mut().zip(other.data.iter()) {
            *a += scale * b;
        }
        Ok(())
    }

    /// Add the provided row vector to every row (`self[row] += bias`).
    pub fn add_row_inplace(&mut self, bias: &[f32]) -> PureResult<()> {
        if bias.len() != self.cols {
            return Err(TensorError::DataLength {
                expected: self.cols,
                got: bias.len(),
            });
        }
        let cols = self.cols;
        for row in Arc::make_mut(&mut self.data).chunks_exact_mut(cols) {
            for (value, b) in row.iter_mut().zip(bias) {
                *value += b;
            }
        }
        Ok(())
    }

    /// Applies `f` to every element, returning a new tensor.
    pub fn map<F>(&self, f: F) -> PureResult<Tensor>
    where
        F: FnMut(&f32) -> f32,
    {
        Tensor::from_vec(self.rows, self.cols, self.data.iter().map(f).collect())
    }

    /// Matrix product `self (m×k) · other (k×n)`.
    pub fn matmul(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.cols != other.rows {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let (m, k, n) = (self.rows, self.cols, other.cols);
        let mut out = vec![0.0f32; m * n];
        for i in 0..m {
            let lhs = &self.data[i * k..(i + 1) * k];
            let dst = &mut out[i * n..(i + 1) * n];
            for (p, &a) in lhs.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                let rhs = &other.data[p * n..(p + 1) * n];
                for (d, &b) in dst.iter_mut().zip(rhs) {
                    *d += a * b;
                }
            }
        }
        Tensor::from_vec(m, n, out)
    }

    /// Returns the transpose of the tensor.
    pub fn transpose(&self) -> Tensor {
        let mut data = vec![0.0f32; self.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        Tensor {
            data: Arc::new(data),
            rows: self.cols,
            cols: self.rows,
        }
    }

    /// Returns the sum over rows for each column.
    pub fn sum_axis0(&self) -> Vec<f32> {
        let mut sums = vec![0.0; self.cols];
        for row in self.iter_rows() {
            for (s, v) in sums.iter_mut().zip(row) {
                *s += v;
            }
        }
        sums
    }

    /// Joins `self` and `other` side by side: row `i` of the result is
    /// `self[i] ++ other[i]`.
    pub fn concat_cols(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.rows != other.rows {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let cols = self.cols + other.cols;
        let mut data = Vec::with_capacity(self.rows * cols);
        for (lhs, rhs) in self.iter_rows().zip(other.iter_rows()) {
            data.extend_from_slice(lhs);
            data.extend_from_slice(rhs);
        }
        Tensor::from_vec(self.rows, cols, data)
    }

    /// Splits the columns at `at`, the inverse of [`Tensor::concat_cols`].
    pub fn split_cols(&self, at: usize) -> PureResult<(Tensor, Tensor)> {
        if at == 0 || at >= self.cols {
            return Err(TensorError::InvalidDimensions {
                rows: self.rows,
                cols: at,
            });
        }
        let right_cols = self.cols - at;
        let mut left = Vec::with_capacity(self.rows * at);
        let mut right = Vec::with_capacity(self.rows * right_cols);
        for row in self.iter_rows() {
            left.extend_from_slice(&row[..at]);
            right.extend_from_slice(&row[at..]);
        }
        Ok((
            Tensor::from_vec(self.rows, at, left)?,
            Tensor::from_vec(self.rows, right_cols, right)?,
        ))
    }

    /// Returns a copy with the row order reversed.
    pub fn reverse_rows(&self) -> Tensor {
        let mut data = Vec::with_capacity(self.len());
        for row in self.iter_rows().rev() {
            data.extend_from_slice(row);
        }
        Tensor {
            data: Arc::new(data),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Returns a copy where every row has unit L2 norm. All-zero rows stay zero.
    pub fn normalize_rows(&self) -> Tensor {
        let mut data = Vec::with_capacity(self.len());
        for row in self.iter_rows() {
            data.extend(normalize_l2(row));
        }
        Tensor {
            data: Arc::new(data),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Computes the squared L2 norm of the tensor.
    pub fn squared_l2_norm(&self) -> f32 {
        self.data.iter().map(|v| v * v).sum()
    }

    /// Fails with [`TensorError::NonFiniteValue`] on the first NaN or infinity.
    pub fn ensure_finite(&self, label: &'static str) -> PureResult<()> {
        match self.data.iter().find(|v| !v.is_finite()) {
            Some(&value) => Err(TensorError::NonFiniteValue { label, value }),
            None => Ok(()),
        }
    }
}

/// Dot product accumulated in `f64`.
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

/// Euclidean norm accumulated in `f64`.
pub fn l2_norm(values: &[f32]) -> f64 {
    dot(values, values).sqrt()
}

/// Scales `values` to unit length. A zero vector is returned unchanged.
pub fn normalize_l2(values: &[f32]) -> Vec<f32> {
    let norm = l2_norm(values);
    if norm == 0.0 {
        return values.to_vec();
    }
    values.iter().map(|&v| (f64::from(v) / norm) as f32).collect()
}

/// Cosine similarity clamped to `[-1, 1]`. Zero vectors have similarity 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let denom = l2_norm(a) * l2_norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    (dot(a, b) / denom).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_axes_are_rejected() {
        assert_eq!(
            Tensor::zeros(0, 3).unwrap_err(),
            TensorError::InvalidDimensions { rows: 0, cols: 3 }
        );
        assert!(matches!(
            Tensor::from_vec(2, 2, vec![1.0; 3]),
            Err(TensorError::DataLength { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn matmul_matches_manual_product() {
        let a = Tensor::from_vec(2, 3, vec![1.0, 2.0, 3.0, -1.0, 0.0, 2.0]).unwrap();
        let b = Tensor::from_vec(3, 2, vec![0.5, 1.0, -1.0, 0.0, 2.0, 1.0]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), (2, 2));
        assert_eq!(c.data(), &[4.5, 4.0, 3.5, 1.0]);
        assert!(a.matmul(&a).is_err());
    }

    #[test]
    fn concat_and_split_are_inverse() {
        let left = Tensor::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let right = Tensor::from_vec(2, 1, vec![5.0, 6.0]).unwrap();
        let joined = left.concat_cols(&right).unwrap();
        assert_eq!(joined.row(1), &[3.0, 4.0, 6.0]);
        let (l, r) = joined.split_cols(2).unwrap();
        assert_eq!(l, left);
        assert_eq!(r, right);
    }

    #[test]
    fn reverse_rows_flips_sequence_order() {
        let t = Tensor::from_rows(&[[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]]).unwrap();
        let r = t.reverse_rows();
        assert_eq!(r.row(0), &[5.0, 6.0]);
        assert_eq!(r.reverse_rows(), t);
    }

    #[test]
    fn normalized_rows_have_unit_length() {
        let t = Tensor::from_rows(&[[3.0f32, 4.0], [0.0, 0.0]]).unwrap();
        let n = t.normalize_rows();
        assert!((l2_norm(n.row(0)) - 1.0).abs() < 1e-6);
        assert_eq!(n.row(1), &[0.0, 0.0]);
    }

    #[test]
    fn cosine_similarity_is_bounded_and_handles_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!((cosine_similarity(&[1.0, 0.0], &[-3.0, 0.0]) + 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn shared_buffers_copy_on_write() {
        let a = Tensor::zeros(1, 2).unwrap();
        let mut b = a.clone();
        b.data_mut()[0] = 1.0;
        assert_eq!(a.data(), &[0.0, 0.0]);
        assert_eq!(b.data(), &[1.0, 0.0]);
    }

    #[test]
    fn glorot_respects_bound_and_seed() {
        let a = Tensor::glorot_uniform(4, 2, Some(3), "w").unwrap();
        let b = Tensor::glorot_uniform(4, 2, Some(3), "w").unwrap();
        assert_eq!(a, b);
        let bound = (6.0f32 / 6.0).sqrt();
        assert!(a.data().iter().all(|v| v.abs() <= bound));
    }
}
