use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Object-safe view of a value that can be compared and hashed.
trait DynOpaque: Any + Send + Sync + fmt::Debug {
    fn dyn_eq(&self, other: &dyn DynOpaque) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T> DynOpaque for T
where
    T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn dyn_eq(&self, other: &dyn DynOpaque) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// A user value that participates in signatures through its own `Eq + Hash`.
///
/// Values of different concrete types never compare equal, even if their
/// hashes happen to collide.
#[derive(Clone)]
pub struct OpaqueValue(Arc<dyn DynOpaque>);

impl OpaqueValue {
    pub fn new<T>(value: T) -> Self
    where
        T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(other.0.as_ref())
    }
}

impl Eq for OpaqueValue {}

impl Hash for OpaqueValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// A value with no equality or hash contract.
///
/// It can be passed through to a user function, but any attempt to build a
/// signature from it fails.
#[derive(Clone)]
pub struct OpaqueObject {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl OpaqueObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for OpaqueObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Record {
        name: String,
        multiplier_milli: i64,
    }

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Other(i64);

    fn hash_of(value: &OpaqueValue) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equal_records_compare_and_hash_equal() {
        let a = OpaqueValue::new(Record {
            name: "Foo".into(),
            multiplier_milli: 500,
        });
        let b = OpaqueValue::new(Record {
            name: "Foo".into(),
            multiplier_milli: 500,
        });
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn different_types_never_compare_equal() {
        assert_ne!(OpaqueValue::new(7_i64), OpaqueValue::new(Other(7)));
    }

    #[test]
    fn downcast_recovers_the_value() {
        let value = OpaqueValue::new(Other(3));
        assert_eq!(value.downcast_ref::<Other>(), Some(&Other(3)));
        assert!(value.downcast_ref::<Record>().is_none());
    }
}
