//! Typed cache keys.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;

use crate::error::{DataError, Result};

/// Key string paired with the type of value stored under it.
///
/// Callers must use one value type per key string; reading a key through a
/// different type fails with [`DataError::TypeMismatch`].
pub struct DataKey<T> {
    name: String,
    _value: PhantomData<fn() -> T>,
}

impl<T> DataKey<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _value: PhantomData,
        }
    }

    /// Builds a key from a resource prefix and its filter parameters.
    ///
    /// Filters are serialized to JSON, so each parameter combination maps
    /// to its own key. A `null` filter yields the bare prefix.
    pub fn with_params<P: Serialize + ?Sized>(prefix: &str, params: &P) -> Result<Self> {
        let encoded = serde_json::to_string(params).map_err(|err| {
            DataError::InvalidRequest(format!("Unserializable filters for {}: {}", prefix, err))
        })?;

        if encoded == "null" {
            Ok(Self::new(prefix))
        } else {
            Ok(Self::new(format!("{}?{}", prefix, encoded)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for DataKey<T> {
    fn clone(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl<T> fmt::Debug for DataKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DataKey").field(&self.name).finish()
    }
}

impl<T> fmt::Display for DataKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl<T> PartialEq for DataKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for DataKey<T> {}
