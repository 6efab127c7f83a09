use std::fmt;

use crate::client::Client;
use crate::defaults::ConfigValue;
use crate::error::{Error, Result};

/// A failed typed read: the value to use instead, and why the cached value
/// could not be used.
#[derive(Debug)]
pub struct Fallback<T> {
    pub value: T,
    pub error: Error,
}

impl<T> Fallback<T> {
    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T> fmt::Display for Fallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "using default value: {}", self.error)
    }
}

impl<T: fmt::Debug> std::error::Error for Fallback<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Typed reads of one namespace. Misses and parse failures fall back to the
/// default registered for the same type, or the type's zero value.
pub struct ConfigReader<'a> {
    client: &'a Client,
    namespace: String,
}

impl<'a> ConfigReader<'a> {
    pub(crate) fn new(client: &'a Client, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn get<T: ConfigValue>(&self, key: &str) -> Result<T, Fallback<T>> {
        let error = match self.client.cache().get(&self.namespace, key) {
            Ok(raw) => match T::parse(&raw) {
                Some(value) => return Ok(value),
                None => Error::Parse {
                    value: raw,
                    kind: T::KIND,
                },
            },
            Err(e) => e,
        };

        Err(Fallback {
            value: self.client.options().defaults.resolve(&self.namespace, key),
            error,
        })
    }

    pub fn get_string(&self, key: &str) -> Result<String, Fallback<String>> {
        self.get(key)
    }

    pub fn get_int(&self, key: &str) -> Result<i64, Fallback<i64>> {
        self.get(key)
    }

    pub fn get_float(&self, key: &str) -> Result<f64, Fallback<f64>> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, Fallback<bool>> {
        self.get(key)
    }

    /// Raw bytes of the cached value. No defaults apply.
    pub fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        self.client
            .cache()
            .get(&self.namespace, key)
            .map(String::into_bytes)
    }
}
