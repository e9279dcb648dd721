// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed key/value ↔ wire string conversion.
//!
//! A [`Codec`] maps a domain key to a hash field name and a domain value to a
//! string payload, and back. Field naming is domain policy (plain IDs, decimal
//! numbers, prefixed names), while value encoding is uniform JSON, so
//! [`JsonCodec`] takes the field policy as an argument.
//!
//! # Example
//!
//! ```
//! use state_mirror::{Codec, JsonCodec};
//!
//! let codec = JsonCodec::<u64, Vec<String>>::display();
//! assert_eq!(codec.field(&42).unwrap(), "42");
//! assert_eq!(codec.parse_field("42").unwrap(), 42);
//!
//! let raw = codec.encode(&vec!["a".to_string()]).unwrap();
//! assert_eq!(raw, r#"["a"]"#);
//! ```

use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("cannot build field for key: {0}")]
    Field(String),
    #[error("cannot parse field '{field}': {reason}")]
    ParseField { field: String, reason: String },
    #[error("cannot encode value: {0}")]
    Encode(String),
    #[error("cannot decode value: {0}")]
    Decode(String),
}

/// Conversion between a domain key/value pair and its wire form.
///
/// Implementations must satisfy `parse_field(field(k)) == k` and
/// `decode(encode(v)) == v` for every valid key and value.
pub trait Codec: Send + Sync {
    type Key;
    type Value;

    fn field(&self, key: &Self::Key) -> Result<String, CodecError>;
    fn parse_field(&self, field: &str) -> Result<Self::Key, CodecError>;
    fn encode(&self, value: &Self::Value) -> Result<String, CodecError>;
    fn decode(&self, raw: &str) -> Result<Self::Value, CodecError>;
}

impl<C: Codec + ?Sized> Codec for Arc<C> {
    type Key = C::Key;
    type Value = C::Value;

    fn field(&self, key: &Self::Key) -> Result<String, CodecError> {
        (**self).field(key)
    }

    fn parse_field(&self, field: &str) -> Result<Self::Key, CodecError> {
        (**self).parse_field(field)
    }

    fn encode(&self, value: &Self::Value) -> Result<String, CodecError> {
        (**self).encode(value)
    }

    fn decode(&self, raw: &str) -> Result<Self::Value, CodecError> {
        (**self).decode(raw)
    }
}

type FieldFn<K> = dyn Fn(&K) -> Result<String, CodecError> + Send + Sync;
type ParseFn<K> = dyn Fn(&str) -> Result<K, CodecError> + Send + Sync;

/// JSON value encoding with a caller-supplied field policy.
pub struct JsonCodec<K, V> {
    field_fn: Arc<FieldFn<K>>,
    parse_fn: Arc<ParseFn<K>>,
    _value: PhantomData<fn() -> V>,
}

impl<K, V> Clone for JsonCodec<K, V> {
    fn clone(&self) -> Self {
        Self {
            field_fn: self.field_fn.clone(),
            parse_fn: self.parse_fn.clone(),
            _value: PhantomData,
        }
    }
}

impl<K, V> JsonCodec<K, V> {
    pub fn new<F, P>(field_fn: F, parse_fn: P) -> Self
    where
        F: Fn(&K) -> Result<String, CodecError> + Send + Sync + 'static,
        P: Fn(&str) -> Result<K, CodecError> + Send + Sync + 'static,
    {
        Self {
            field_fn: Arc::new(field_fn),
            parse_fn: Arc::new(parse_fn),
            _value: PhantomData,
        }
    }
}

impl<K, V> JsonCodec<K, V>
where
    K: Display + FromStr + 'static,
    K::Err: Display,
{
    /// Fields are `key.to_string()`: identity for `String`, decimal for integers.
    #[must_use]
    pub fn display() -> Self {
        Self::new(
            |key: &K| Ok(key.to_string()),
            |field: &str| {
                field.parse::<K>().map_err(|e| CodecError::ParseField {
                    field: field.to_string(),
                    reason: e.to_string(),
                })
            },
        )
    }

    /// Fields are `prefix` followed by `key.to_string()`.
    #[must_use]
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        let prefix: Arc<str> = Arc::from(prefix.into());
        let parse_prefix = prefix.clone();
        Self::new(
            move |key: &K| Ok(format!("{}{}", prefix, key)),
            move |field: &str| {
                let rest = field.strip_prefix(&*parse_prefix).ok_or_else(|| {
                    CodecError::ParseField {
                        field: field.to_string(),
                        reason: format!("missing prefix '{}'", parse_prefix),
                    }
                })?;
                rest.parse::<K>().map_err(|e| CodecError::ParseField {
                    field: field.to_string(),
                    reason: e.to_string(),
                })
            },
        )
    }
}

impl<K, V> Codec for JsonCodec<K, V>
where
    V: Serialize + DeserializeOwned,
{
    type Key = K;
    type Value = V;

    fn field(&self, key: &K) -> Result<String, CodecError> {
        (self.field_fn)(key)
    }

    fn parse_field(&self, field: &str) -> Result<K, CodecError> {
        (self.parse_fn)(field)
    }

    fn encode(&self, value: &V) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, raw: &str) -> Result<V, CodecError> {
        serde_json::from_str(raw).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
