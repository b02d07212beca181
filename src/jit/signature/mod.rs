//! Call signature hashing.
//!
//! A [`HasherStrategy`] turns a call's arguments into a [`Fingerprint`].
//! Tensors contribute metadata only; every other argument contributes its
//! literal value, so changing a flag or a probability always yields a new
//! fingerprint regardless of strategy.

pub mod key;

pub use key::{ArgSignature, CacheKey, Fingerprint};

use std::fmt;
use std::str::FromStr;

use aotc_value::{ArgValue, Tensor};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::error::CacheError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HasherStrategy {
    /// Tensors are keyed by dtype, device, rank and requires-grad; extents are ignored.
    #[default]
    #[serde(alias = "dynamic", alias = "DynamicShapeHasher")]
    DynamicShape,
    /// Like `DynamicShape`, plus the exact extent of every axis.
    #[serde(alias = "static", alias = "StaticShapeHasher")]
    StaticShape,
}

impl HasherStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DynamicShape => "dynamic",
            Self::StaticShape => "static",
        }
    }

    pub fn fingerprint(self, args: &[ArgValue]) -> Result<Fingerprint, CacheError> {
        let signatures = args
            .iter()
            .enumerate()
            .map(|(index, arg)| self.signature(index, arg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Fingerprint::new(self, signatures))
    }

    // `index` is the top-level position, reported even for nested tuple members.
    fn signature(self, index: usize, arg: &ArgValue) -> Result<ArgSignature, CacheError> {
        let signature = match arg {
            ArgValue::Tensor(tensor) => self.tensor_signature(tensor),
            ArgValue::None => ArgSignature::None,
            ArgValue::Bool(value) => ArgSignature::Bool(*value),
            ArgValue::Int(value) => ArgSignature::Int(*value),
            ArgValue::Float(value) => {
                if value.is_nan() {
                    return Err(CacheError::UnhashableArgument {
                        index,
                        type_name: "f64 (NaN)",
                    });
                }
                // -0.0 == 0.0, so both must share a signature.
                let normalized = if *value == 0.0 { 0.0 } else { *value };
                ArgSignature::Float(normalized.to_bits())
            }
            ArgValue::Str(value) => ArgSignature::Str(value.clone()),
            ArgValue::Tuple(items) => ArgSignature::Tuple(
                items
                    .iter()
                    .map(|item| self.signature(index, item))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            ArgValue::Custom(value) => ArgSignature::Custom(value.clone()),
            ArgValue::Object(object) => {
                return Err(CacheError::UnhashableArgument {
                    index,
                    type_name: object.type_name(),
                });
            }
        };
        Ok(signature)
    }

    fn tensor_signature(self, tensor: &Tensor) -> ArgSignature {
        let shape = match self {
            Self::DynamicShape => None,
            Self::StaticShape => Some(tensor.shape().to_vec()),
        };
        ArgSignature::Tensor {
            dtype: tensor.dtype(),
            device: tensor.device(),
            rank: tensor.rank(),
            shape,
            requires_grad: tensor.is_requires_grad(),
        }
    }
}

impl fmt::Display for HasherStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HasherStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "dynamic" | "dynamic_shape" | "DynamicShape" | "DynamicShapeHasher" => {
                Ok(Self::DynamicShape)
            }
            "static" | "static_shape" | "StaticShape" | "StaticShapeHasher" => {
                Ok(Self::StaticShape)
            }
            other => Err(ConfigError::UnknownHasher(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aotc_value::{DType, Device};

    fn tensor(shape: &[usize]) -> ArgValue {
        ArgValue::from(Tensor::zeros(shape).requires_grad(true))
    }

    #[test]
    fn dynamic_strategy_ignores_extents() {
        let a = HasherStrategy::DynamicShape
            .fingerprint(&[tensor(&[10]), tensor(&[10])])
            .unwrap();
        let b = HasherStrategy::DynamicShape
            .fingerprint(&[tensor(&[17]), tensor(&[17])])
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dynamic_strategy_tracks_rank() {
        let a = HasherStrategy::DynamicShape
            .fingerprint(&[tensor(&[10, 20]), tensor(&[20])])
            .unwrap();
        let b = HasherStrategy::DynamicShape
            .fingerprint(&[tensor(&[10, 20]), tensor(&[10, 20])])
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn static_strategy_tracks_extents() {
        let a = HasherStrategy::StaticShape.fingerprint(&[tensor(&[10])]).unwrap();
        let b = HasherStrategy::StaticShape.fingerprint(&[tensor(&[11])]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn metadata_changes_are_structural() {
        let base = Tensor::zeros(&[4]);
        let variants = [
            base.clone().with_dtype(DType::F64),
            base.clone().on_device(Device::Cuda(0)),
            base.clone().requires_grad(true),
        ];
        for strategy in [HasherStrategy::DynamicShape, HasherStrategy::StaticShape] {
            let reference = strategy.fingerprint(&[ArgValue::from(base.clone())]).unwrap();
            for variant in &variants {
                let other = strategy.fingerprint(&[ArgValue::from(variant.clone())]).unwrap();
                assert_ne!(reference, other, "{strategy}: {variant:?}");
            }
        }
    }

    #[test]
    fn tensor_contents_never_matter() {
        let zeros = ArgValue::from(Tensor::zeros(&[3]));
        let ones = ArgValue::from(Tensor::full(&[3], 1.0));
        for strategy in [HasherStrategy::DynamicShape, HasherStrategy::StaticShape] {
            assert_eq!(
                strategy.fingerprint(std::slice::from_ref(&zeros)).unwrap(),
                strategy.fingerprint(std::slice::from_ref(&ones)).unwrap()
            );
        }
    }

    #[test]
    fn opaque_values_are_keyed_by_value() {
        for strategy in [HasherStrategy::DynamicShape, HasherStrategy::StaticShape] {
            let p3 = strategy.fingerprint(&[tensor(&[2, 2]), ArgValue::Float(0.3)]).unwrap();
            let p0 = strategy.fingerprint(&[tensor(&[2, 2]), ArgValue::Float(0.0)]).unwrap();
            assert_ne!(p3, p0);

            let on = strategy.fingerprint(&[ArgValue::Bool(true)]).unwrap();
            let off = strategy.fingerprint(&[ArgValue::Bool(false)]).unwrap();
            assert_ne!(on, off);
        }
    }

    #[test]
    fn negative_zero_matches_zero() {
        let a = HasherStrategy::StaticShape.fingerprint(&[ArgValue::Float(0.0)]).unwrap();
        let b = HasherStrategy::StaticShape.fingerprint(&[ArgValue::Float(-0.0)]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn objects_without_hash_are_rejected() {
        struct Handle;
        let err = HasherStrategy::DynamicShape
            .fingerprint(&[tensor(&[2]), ArgValue::object(Handle)])
            .unwrap_err();
        assert!(matches!(err, CacheError::UnhashableArgument { index: 1, .. }));
    }

    #[test]
    fn nan_inside_a_tuple_is_rejected_at_its_top_level_index() {
        let nested = ArgValue::Tuple(vec![ArgValue::Int(1), ArgValue::Float(f64::NAN)]);
        let err = HasherStrategy::StaticShape
            .fingerprint(&[ArgValue::Bool(true), nested])
            .unwrap_err();
        assert!(matches!(err, CacheError::UnhashableArgument { index: 1, .. }));
    }

    #[test]
    fn parses_long_hasher_names() {
        assert_eq!(
            "DynamicShapeHasher".parse::<HasherStrategy>().unwrap(),
            HasherStrategy::DynamicShape
        );
        assert_eq!("static".parse::<HasherStrategy>().unwrap(), HasherStrategy::StaticShape);
        assert!("fuzzy".parse::<HasherStrategy>().is_err());
    }
}
