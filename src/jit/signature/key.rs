use ahash::AHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use aotc_value::{DType, Device, OpaqueValue};

use super::HasherStrategy;

/// Per-argument component of a [`Fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgSignature {
    Tensor {
        dtype: DType,
        device: Device,
        rank: usize,
        /// Exact extents; `None` under the dynamic-shape strategy.
        shape: Option<Vec<usize>>,
        requires_grad: bool,
    },
    None,
    Bool(bool),
    Int(i64),
    /// Bit pattern of a normalized, non-NaN float.
    Float(u64),
    Str(Arc<str>),
    Tuple(Vec<ArgSignature>),
    Custom(OpaqueValue),
}

impl fmt::Display for ArgSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tensor {
                dtype,
                device,
                rank,
                shape,
                requires_grad,
            } => {
                match shape {
                    Some(shape) => write!(f, "{dtype}{shape:?}@{device}")?,
                    None => write!(f, "{dtype}[rank {rank}]@{device}")?,
                }
                if *requires_grad {
                    f.write_str("+grad")?;
                }
                Ok(())
            }
            Self::None => f.write_str("None"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Self::Str(value) => write!(f, "{value:?}"),
            Self::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Self::Custom(value) => write!(f, "{value:?}"),
        }
    }
}

/// Hashable summary of a call's arguments under one hasher strategy.
///
/// Equality compares the full per-argument signature; the 64-bit digest is
/// only a fast pre-check and the value fed to `Hash`.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    strategy: HasherStrategy,
    args: Arc<[ArgSignature]>,
    digest: u64,
}

impl Fingerprint {
    pub(crate) fn new(strategy: HasherStrategy, args: Vec<ArgSignature>) -> Self {
        let mut hasher = AHasher::default();
        strategy.hash(&mut hasher);
        args.hash(&mut hasher);
        let digest = hasher.finish();

        Self {
            strategy,
            args: args.into(),
            digest,
        }
    }

    pub fn strategy(&self) -> HasherStrategy {
        self.strategy
    }

    pub fn args(&self) -> &[ArgSignature] {
        &self.args
    }

    pub fn digest(&self) -> u64 {
        self.digest
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest && self.strategy == other.strategy && self.args == other.args
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.digest);
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.digest)
    }
}

/// Key of one compiled artifact inside a function cache.
///
/// The compile target is part of the key so that wrappers of the same
/// function built for different backends never share an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub backend: Arc<str>,
    pub differentiable: bool,
    pub fingerprint: Fingerprint,
}

impl CacheKey {
    pub fn new(backend: &str, differentiable: bool, fingerprint: Fingerprint) -> Self {
        Self {
            backend: Arc::from(backend),
            differentiable,
            fingerprint,
        }
    }

    pub fn to_string_key(&self) -> String {
        let args = self
            .fingerprint
            .args()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let grad = if self.differentiable { "+grad" } else { "" };
        format!(
            "{}{}_{}_<{}>_{}",
            self.backend,
            grad,
            self.fingerprint.strategy().as_str(),
            args,
            self.fingerprint
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor_sig(shape: Option<Vec<usize>>) -> ArgSignature {
        ArgSignature::Tensor {
            dtype: DType::F32,
            device: Device::Cpu,
            rank: 2,
            shape,
            requires_grad: true,
        }
    }

    #[test]
    fn digest_is_deterministic() {
        let a = Fingerprint::new(HasherStrategy::StaticShape, vec![tensor_sig(Some(vec![2, 3]))]);
        let b = Fingerprint::new(HasherStrategy::StaticShape, vec![tensor_sig(Some(vec![2, 3]))]);
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a, b);
    }

    #[test]
    fn strategy_participates_in_equality() {
        let a = Fingerprint::new(HasherStrategy::StaticShape, vec![ArgSignature::Int(1)]);
        let b = Fingerprint::new(HasherStrategy::DynamicShape, vec![ArgSignature::Int(1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn string_key_lists_arguments() {
        let fingerprint = Fingerprint::new(
            HasherStrategy::DynamicShape,
            vec![tensor_sig(None), ArgSignature::Bool(true)],
        );
        let key = CacheKey::new("nop", false, fingerprint);
        let rendered = key.to_string_key();
        assert!(rendered.starts_with("nop_dynamic_<f32[rank 2]@cpu+grad,true>_"));
    }
}
