use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use aotc_value::{ArgValue, CallError};
use serde::Serialize;

/// Signature every traced function and compiled artifact shares.
pub type FunctionBody = dyn Fn(&[ArgValue]) -> Result<Vec<ArgValue>, CallError> + Send + Sync;

/// Process-unique identity of a [`UserFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FunctionId(u64);

impl FunctionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

/// A function handed to the cache for compilation.
///
/// Identity is fixed at construction: clones share it, while wrapping the
/// same closure body twice yields two distinct functions.
#[derive(Clone)]
pub struct UserFunction {
    id: FunctionId,
    name: Arc<str>,
    body: Arc<FunctionBody>,
}

impl UserFunction {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[ArgValue]) -> Result<Vec<ArgValue>, CallError> + Send + Sync + 'static,
    {
        Self {
            id: FunctionId::next(),
            name: Arc::from(name.into()),
            body: Arc::new(body),
        }
    }

    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> Arc<FunctionBody> {
        Arc::clone(&self.body)
    }

    /// Runs the function eagerly, bypassing any cache.
    pub fn call(&self, args: &[ArgValue]) -> Result<Vec<ArgValue>, CallError> {
        (self.body)(args)
    }
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFunction")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(args: &[ArgValue]) -> Result<Vec<ArgValue>, CallError> {
        Ok(args.to_vec())
    }

    #[test]
    fn clones_share_identity() {
        let f = UserFunction::new("f", identity);
        assert_eq!(f.id(), f.clone().id());
    }

    #[test]
    fn identical_bodies_get_distinct_identities() {
        let f = UserFunction::new("f", identity);
        let g = UserFunction::new("f", identity);
        assert_ne!(f.id(), g.id());
    }
}
