use serde::{Deserialize, Serialize};
use spacefold_core::{Error, Result, Vector};

/// How a space scales its vectors after embedding or aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizationConfig {
    /// Divide by the L2 norm of the non-filtered dimensions
    #[default]
    L2,
    /// Divide by a fixed length
    Constant { length: f32 },
    None,
}

impl NormalizationConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            NormalizationConfig::Constant { length } if *length == 0.0 => {
                Err(Error::InvalidConfig("constant normalization length must be non-zero".to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn normalize(&self, vector: &Vector) -> Vector {
        match self {
            NormalizationConfig::L2 => vector.normalize(vector.norm()),
            NormalizationConfig::Constant { length } => vector.normalize(*length),
            NormalizationConfig::None => vector.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_records_denormalizer() {
        let v = NormalizationConfig::L2.normalize(&Vector::new(vec![3.0, 4.0]));
        assert_eq!(v.as_slice(), &[0.6, 0.8]);
        assert_eq!(v.denormalizer(), 5.0);
        assert_eq!(v.denormalize().as_slice(), &[3.0, 4.0]);
    }

    #[test]
    fn test_zero_vector_unchanged() {
        let v = NormalizationConfig::L2.normalize(&Vector::zeros(3));
        assert_eq!(v.as_slice(), &[0.0, 0.0, 0.0]);
        assert_eq!(v.denormalizer(), 1.0);
    }

    #[test]
    fn test_constant() {
        let v = NormalizationConfig::Constant { length: 2.0 }.normalize(&Vector::new(vec![2.0, 4.0]));
        assert_eq!(v.as_slice(), &[1.0, 2.0]);
        assert!(NormalizationConfig::Constant { length: 0.0 }.validate().is_err());
    }
}
