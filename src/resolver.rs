use crate::error::{Error, Result};

const DEFAULT_SCHEME: &str = "http://";

/// Turns the configured address into candidate base URLs, highest priority
/// first.
pub trait Resolver: Send + Sync {
    fn resolve(&self) -> Result<Vec<String>>;
}

/// Resolver for a single configured host.
#[derive(Debug, Clone)]
pub struct SingleHostResolver {
    host: String,
}

impl SingleHostResolver {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.trim().trim_end_matches('/').to_string(),
        }
    }
}

impl Resolver for SingleHostResolver {
    fn resolve(&self) -> Result<Vec<String>> {
        if self.host.is_empty() {
            return Err(Error::NoHost);
        }
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            Ok(vec![self.host.clone()])
        } else {
            Ok(vec![format!("{}{}", DEFAULT_SCHEME, self.host)])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adds_default_scheme() {
        let r = SingleHostResolver::new("127.0.0.1:8080");
        assert_eq!(r.resolve().unwrap(), vec!["http://127.0.0.1:8080"]);
    }

    #[test]
    fn test_keeps_existing_scheme() {
        let r = SingleHostResolver::new("https://meta.apollo.com/");
        assert_eq!(r.resolve().unwrap(), vec!["https://meta.apollo.com"]);
        // idempotent
        assert_eq!(r.resolve().unwrap(), r.resolve().unwrap());
    }

    #[test]
    fn test_empty_host_fails() {
        let r = SingleHostResolver::new("  ");
        assert!(matches!(r.resolve(), Err(Error::NoHost)));
    }
}
