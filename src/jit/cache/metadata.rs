use std::time::Duration;

use aotc_value::{ArgValue, TensorMeta};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata recorded when an entry is compiled.
#[derive(Debug, Clone, Serialize)]
pub struct CacheMetadata {
    pub function: String,
    pub backend: String,
    pub created_at: DateTime<Utc>,
    pub compilation_time: Duration,
}

impl CacheMetadata {
    pub fn new(
        function: impl Into<String>,
        backend: impl Into<String>,
        compilation_time: Duration,
    ) -> Self {
        Self {
            function: function.into(),
            backend: backend.into(),
            created_at: Utc::now(),
            compilation_time,
        }
    }
}

/// What one example argument looked like when the entry was compiled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExampleArg {
    Tensor(TensorMeta),
    Value { type_name: String, repr: String },
}

impl ExampleArg {
    pub fn describe(args: &[ArgValue]) -> Vec<Self> {
        args.iter().map(Self::from_arg).collect()
    }

    fn from_arg(arg: &ArgValue) -> Self {
        match arg {
            ArgValue::Tensor(tensor) => Self::Tensor(tensor.meta().clone()),
            ArgValue::Custom(value) => Self::Value {
                type_name: value.type_name().to_string(),
                repr: format!("{value:?}"),
            },
            other => Self::Value {
                type_name: other.kind_name().to_string(),
                repr: format!("{other:?}"),
            },
        }
    }
}
