use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Mul;

fn default_denormalizer() -> f32 {
    1.0
}

/// A dense vector with negative-filter dimensions and a denormalizer.
///
/// Negative-filter dimensions hold a sentinel ("no match") instead of a real
/// magnitude: arithmetic skips them and normalization passes them through.
/// The denormalizer records what the vector was last divided by so that
/// [`Vector::denormalize`] can undo it exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawVector")]
pub struct Vector {
    data: Vec<f32>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    negative_filter_indices: BTreeSet<usize>,
    #[serde(default = "default_denormalizer")]
    denormalizer: f32,
}

/// Wire form of [`Vector`]; filter indices are checked on the way in.
#[derive(Deserialize)]
struct RawVector {
    data: Vec<f32>,
    #[serde(default)]
    negative_filter_indices: Vec<i64>,
    #[serde(default = "default_denormalizer")]
    denormalizer: f32,
}

impl TryFrom<RawVector> for Vector {
    type Error = Error;

    fn try_from(raw: RawVector) -> Result<Self> {
        let mut vector = Vector::with_negative_filter(raw.data, raw.negative_filter_indices)?;
        vector.denormalizer = raw.denormalizer;
        Ok(vector)
    }
}

impl Vector {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f32>) -> Self {
        Self {
            data,
            negative_filter_indices: BTreeSet::new(),
            denormalizer: 1.0,
        }
    }

    #[inline]
    #[must_use]
    pub fn from_slice(data: &[f32]) -> Self {
        Self::new(data.to_vec())
    }

    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[inline]
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self::new(vec![0.0; dim])
    }

    /// Create a vector whose `indices` are negative-filter dimensions.
    ///
    /// Fails when there are more indices than dimensions or any index
    /// falls outside `[0, dim)`.
    pub fn with_negative_filter(data: Vec<f32>, indices: impl IntoIterator<Item = i64>) -> Result<Self> {
        let indices: Vec<i64> = indices.into_iter().collect();
        let dim = data.len();
        if indices.len() > dim {
            return Err(Error::InvalidNegativeFilter(format!(
                "{} filter indices for a vector of dimension {}",
                indices.len(),
                dim
            )));
        }
        let mut negative_filter_indices = BTreeSet::new();
        for index in indices {
            if index < 0 || index as usize >= dim {
                return Err(Error::InvalidNegativeFilter(format!(
                    "index {} is out of range for dimension {}",
                    index, dim
                )));
            }
            negative_filter_indices.insert(index as usize);
        }
        Ok(Self {
            data,
            negative_filter_indices,
            denormalizer: 1.0,
        })
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn negative_filter_indices(&self) -> &BTreeSet<usize> {
        &self.negative_filter_indices
    }

    #[inline]
    pub fn is_filtered(&self, index: usize) -> bool {
        self.negative_filter_indices.contains(&index)
    }

    #[inline]
    pub fn denormalizer(&self) -> f32 {
        self.denormalizer
    }

    /// L2 norm over the non-filtered dimensions.
    pub fn norm(&self) -> f32 {
        self.data
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.is_filtered(*i))
            .map(|(_, x)| x * x)
            .sum::<f32>()
            .sqrt()
    }

    /// Copy with every filtered dimension set to zero and no filter indices.
    #[must_use]
    pub fn without_negative_filter(&self) -> Self {
        let data = self
            .data
            .iter()
            .enumerate()
            .map(|(i, x)| if self.is_filtered(i) { 0.0 } else { *x })
            .collect();
        Self::new(data)
    }

    /// Elementwise sum. The empty vector is the identity on both sides.
    ///
    /// A dimension stays filtered only if both inputs filtered it; a filtered
    /// entry on one side counts as zero against a real value on the other.
    pub fn aggregate(&self, other: &Vector) -> Result<Vector> {
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Ok(other.clone());
        }
        if self.dim() != other.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                actual: other.dim(),
            });
        }

        let mut negative_filter_indices = BTreeSet::new();
        let data = (0..self.dim())
            .map(|i| match (self.is_filtered(i), other.is_filtered(i)) {
                (true, true) => {
                    negative_filter_indices.insert(i);
                    self.data[i]
                }
                (true, false) => other.data[i],
                (false, true) => self.data[i],
                (false, false) => self.data[i] + other.data[i],
            })
            .collect();

        Ok(Vector {
            data,
            negative_filter_indices,
            denormalizer: 1.0,
        })
    }

    /// Divide the non-filtered entries by `length`.
    ///
    /// No-op for an empty vector or when `length` is 0 or 1. The divisor is
    /// composed into the denormalizer.
    #[must_use]
    pub fn normalize(&self, length: f32) -> Vector {
        if self.is_empty() || length == 0.0 || length == 1.0 {
            return self.clone();
        }
        Vector {
            data: self.map_unfiltered(|x| x / length),
            negative_filter_indices: self.negative_filter_indices.clone(),
            denormalizer: self.denormalizer * length,
        }
    }

    /// Undo the recorded normalization and reset the denormalizer to 1.
    #[must_use]
    pub fn denormalize(&self) -> Vector {
        let denormalizer = self.denormalizer;
        if self.is_empty() || denormalizer == 0.0 || denormalizer == 1.0 {
            return Vector {
                denormalizer: 1.0,
                ..self.clone()
            };
        }
        Vector {
            data: self.map_unfiltered(|x| x * denormalizer),
            negative_filter_indices: self.negative_filter_indices.clone(),
            denormalizer: 1.0,
        }
    }

    /// Overwrite every filtered dimension with `value`.
    #[must_use]
    pub fn replace_negative_filters(&self, value: f32) -> Vector {
        let mut data = self.data.clone();
        for &i in &self.negative_filter_indices {
            data[i] = value;
        }
        Vector {
            data,
            negative_filter_indices: self.negative_filter_indices.clone(),
            denormalizer: self.denormalizer,
        }
    }

    /// Take the filtered dimensions (indices and sentinel values) of `source`.
    pub fn apply_negative_filter(&self, source: &Vector) -> Result<Vector> {
        if self.dim() != source.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                actual: source.dim(),
            });
        }
        let mut data = self.data.clone();
        for &i in &source.negative_filter_indices {
            data[i] = source.data[i];
        }
        Ok(Vector {
            data,
            negative_filter_indices: source.negative_filter_indices.clone(),
            denormalizer: self.denormalizer,
        })
    }

    /// Join vectors end to end, shifting each part's filter indices by its offset.
    #[must_use]
    pub fn concatenate(parts: &[Vector]) -> Vector {
        let mut data = Vec::with_capacity(parts.iter().map(Vector::dim).sum());
        let mut negative_filter_indices = BTreeSet::new();
        for part in parts {
            let offset = data.len();
            negative_filter_indices.extend(part.negative_filter_indices.iter().map(|i| i + offset));
            data.extend_from_slice(&part.data);
        }
        Vector {
            data,
            negative_filter_indices,
            denormalizer: 1.0,
        }
    }

    /// Partition into consecutive parts of the given lengths.
    ///
    /// Filter indices are re-based on each part's start and every part keeps
    /// this vector's denormalizer.
    pub fn split(&self, lengths: &[usize]) -> Result<Vec<Vector>> {
        let total: usize = lengths.iter().sum();
        if total < self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                actual: total,
            });
        }

        let mut parts = Vec::with_capacity(lengths.len());
        let mut start = 0;
        for &length in lengths {
            let from = start.min(self.dim());
            let to = (start + length).min(self.dim());
            let negative_filter_indices = self
                .negative_filter_indices
                .range(from..to)
                .map(|i| i - from)
                .collect();
            parts.push(Vector {
                data: self.data[from..to].to_vec(),
                negative_filter_indices,
                denormalizer: self.denormalizer,
            });
            start += length;
        }
        Ok(parts)
    }

    /// Weight, concatenate and normalize parts so that all-zero parts do not
    /// shrink the magnitude of the result.
    ///
    /// The result is normalized by `sqrt(sum(w^2))` over the parts with
    /// non-zero content, then scaled up by `sqrt(total / non_zero)`. Empty
    /// parts are treated as zeros of their declared length.
    pub fn concatenate_with_compensation(parts: &[Vector], lengths: &[usize], weights: &[f32]) -> Result<Vector> {
        if parts.len() != lengths.len() || parts.len() != weights.len() {
            return Err(Error::DimensionMismatch {
                expected: lengths.len(),
                actual: parts.len(),
            });
        }

        let mut weighted = Vec::with_capacity(parts.len());
        let mut non_zero = 0usize;
        let mut weight_square_sum = 0.0f32;
        for ((part, &length), &weight) in parts.iter().zip(lengths).zip(weights) {
            let part = if part.is_empty() {
                Vector::zeros(length)
            } else if part.dim() != length {
                return Err(Error::DimensionMismatch {
                    expected: length,
                    actual: part.dim(),
                });
            } else {
                part * weight
            };
            if part.norm() > 0.0 {
                non_zero += 1;
                weight_square_sum += weight * weight;
            }
            weighted.push(part);
        }

        let length = if weight_square_sum > 0.0 {
            weight_square_sum.sqrt()
        } else {
            1.0
        };
        let compensation = if non_zero > 0 {
            (parts.len() as f32 / non_zero as f32).sqrt()
        } else {
            1.0
        };
        Ok(Vector::concatenate(&weighted).normalize(length / compensation))
    }

    /// Divide the non-filtered entries by `scalar`.
    pub fn try_div(&self, scalar: f32) -> Result<Vector> {
        if scalar == 0.0 {
            return Err(Error::ZeroDivision);
        }
        Ok(self * (1.0 / scalar))
    }

    #[inline]
    pub fn dot(&self, other: &Vector) -> f32 {
        self.data.iter().zip(other.data.iter()).map(|(a, b)| a * b).sum()
    }

    /// Compute cosine similarity with another vector
    #[inline]
    pub fn cosine_similarity(&self, other: &Vector) -> f32 {
        if self.dim() != other.dim() {
            return 0.0;
        }

        let norm_a = self.data.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b = other.data.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        self.dot(other) / (norm_a * norm_b)
    }

    /// Compute L2 (Euclidean) distance
    #[inline]
    pub fn l2_distance(&self, other: &Vector) -> f32 {
        if self.dim() != other.dim() {
            return f32::INFINITY;
        }

        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    fn map_unfiltered(&self, f: impl Fn(f32) -> f32) -> Vec<f32> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, x)| if self.is_filtered(i) { *x } else { f(*x) })
            .collect()
    }
}

impl PartialEq for Vector {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data && self.negative_filter_indices == other.negative_filter_indices
    }
}

impl Mul<f32> for &Vector {
    type Output = Vector;

    /// Scales the non-filtered entries; multiplying by zero yields explicit
    /// zeros, never an empty vector.
    fn mul(self, scalar: f32) -> Vector {
        if self.is_empty() || scalar == 1.0 {
            return self.clone();
        }
        let data = if scalar == 0.0 {
            self.map_unfiltered(|_| 0.0)
        } else {
            self.map_unfiltered(|x| x * scalar)
        };
        Vector {
            data,
            negative_filter_indices: self.negative_filter_indices.clone(),
            denormalizer: self.denormalizer,
        }
    }
}

impl Mul<f32> for Vector {
    type Output = Vector;

    fn mul(self, scalar: f32) -> Vector {
        &self * scalar
    }
}
