//! Combining weighted vectors and numbers.

use serde::{Deserialize, Serialize};
use spacefold_core::{Error, Result, Vector, Weighted};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregationConfig {
    /// Weighted vector sum
    #[default]
    Sum,
    /// Weighted mean of inverse-embedded numbers
    Avg,
    Min,
    Max,
}

impl AggregationConfig {
    /// Weighted sum of vectors.
    ///
    /// Items with zero weight or no content are skipped. Filtered entries count
    /// as zero; a filter sentinel is put back only where the sum is zero.
    pub fn aggregate_vectors(&self, items: &[Weighted<Vector>]) -> Result<Vector> {
        let items: Vec<&Weighted<Vector>> = items
            .iter()
            .filter(|w| w.weight != 0.0 && !w.item.is_empty())
            .collect();
        match items.as_slice() {
            [] => return Ok(Vector::empty()),
            [single] => return Ok(&single.item * single.weight),
            _ => {}
        }

        let dim = items[0].item.dim();
        let mut data = vec![0.0f32; dim];
        let mut sentinels: BTreeMap<usize, f32> = BTreeMap::new();
        for weighted in &items {
            let vector = &weighted.item;
            if vector.dim() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: vector.dim(),
                });
            }
            for (i, x) in vector.without_negative_filter().as_slice().iter().enumerate() {
                data[i] += x * weighted.weight;
            }
            for &i in vector.negative_filter_indices() {
                let value = vector.as_slice()[i];
                if let Some(previous) = sentinels.insert(i, value) {
                    if previous != value {
                        return Err(Error::InvalidNegativeFilter(format!(
                            "conflicting negative filter values {} and {} at index {}",
                            previous, value, i
                        )));
                    }
                }
            }
        }

        let mut filtered = Vec::new();
        for (&i, &sentinel) in &sentinels {
            if data[i] == 0.0 {
                data[i] = sentinel;
                filtered.push(i as i64);
            }
        }
        Vector::with_negative_filter(data, filtered)
    }

    /// Combine numbers recovered through `inverse_embed`.
    pub fn aggregate_numbers(&self, items: &[Weighted<f64>]) -> Result<f64> {
        if items.is_empty() {
            return Err(Error::InvalidInput("nothing to aggregate".to_string()));
        }
        let values = items.iter().map(|w| w.item);
        match self {
            AggregationConfig::Sum => Ok(items.iter().map(|w| w.item * w.weight as f64).sum()),
            AggregationConfig::Avg => {
                let total_weight: f64 = items.iter().map(|w| w.weight as f64).sum();
                if total_weight == 0.0 {
                    return Err(Error::ZeroDivision);
                }
                Ok(items.iter().map(|w| w.item * w.weight as f64).sum::<f64>() / total_weight)
            }
            AggregationConfig::Min => Ok(values.fold(f64::INFINITY, f64::min)),
            AggregationConfig::Max => Ok(values.fold(f64::NEG_INFINITY, f64::max)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_single() {
        let sum = AggregationConfig::Sum;
        assert!(sum.aggregate_vectors(&[]).unwrap().is_empty());
        let single = sum
            .aggregate_vectors(&[Weighted::new(Vector::new(vec![1.0, 2.0]), 2.0)])
            .unwrap();
        assert_eq!(single.as_slice(), &[2.0, 4.0]);
    }

    #[test]
    fn test_zero_weights_are_skipped() {
        let result = AggregationConfig::Sum
            .aggregate_vectors(&[
                Weighted::new(Vector::new(vec![1.0, 0.0]), 0.0),
                Weighted::new(Vector::new(vec![0.0, 1.0]), 1.0),
            ])
            .unwrap();
        assert_eq!(result.as_slice(), &[0.0, 1.0]);
    }

    #[test]
    fn test_negative_filter_restored_where_sum_is_zero() {
        let a = Vector::with_negative_filter(vec![1.0, -1.0, -1.0], [1, 2]).unwrap();
        let b = Vector::with_negative_filter(vec![-1.0, 1.0, -1.0], [0, 2]).unwrap();
        let result = AggregationConfig::Sum
            .aggregate_vectors(&[Weighted::from(a), Weighted::from(b)])
            .unwrap();
        assert_eq!(result.as_slice(), &[1.0, 1.0, -1.0]);
        assert_eq!(result.negative_filter_indices().iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_conflicting_sentinels() {
        let a = Vector::with_negative_filter(vec![1.0, -1.0], [1]).unwrap();
        let b = Vector::with_negative_filter(vec![1.0, -2.0], [1]).unwrap();
        assert!(matches!(
            AggregationConfig::Sum.aggregate_vectors(&[Weighted::from(a), Weighted::from(b)]),
            Err(Error::InvalidNegativeFilter(_))
        ));
    }

    #[test]
    fn test_numbers() {
        let items = [Weighted::new(10.0, 1.0), Weighted::new(20.0, 3.0)];
        assert_eq!(AggregationConfig::Avg.aggregate_numbers(&items).unwrap(), 17.5);
        assert_eq!(AggregationConfig::Min.aggregate_numbers(&items).unwrap(), 10.0);
        assert_eq!(AggregationConfig::Max.aggregate_numbers(&items).unwrap(), 20.0);
        assert!(matches!(
            AggregationConfig::Avg.aggregate_numbers(&[Weighted::new(1.0, 0.0)]),
            Err(Error::ZeroDivision)
        ));
    }
}
