use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error returned by a registered change handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid http status {0}")]
    InvalidStatus(u16),

    #[error("decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("resolver returned no host")]
    NoHost,

    #[error("all hosts failed: {0}")]
    AllHostsFailed(MultiError),

    #[error("same config compare with last")]
    Unchanged,

    #[error("namespace miss match: [{actual}, {expected}]")]
    NamespaceMismatch { expected: String, actual: String },

    #[error("key `{0}` not found")]
    NotFound(String),

    #[error("parse `{value}` as {kind}")]
    Parse { value: String, kind: &'static str },

    #[error("backup file {}: {source}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("initialization failed: {0}")]
    Init(MultiError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn backup(path: impl Into<PathBuf>, source: impl Into<Error>) -> Self {
        Error::Backup {
            path: path.into(),
            source: Box::new(source.into()),
        }
    }
}

/// A list of errors collected across attempts, hosts or namespaces.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<Error>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: impl Into<Error>) {
        self.errors.push(err.into());
    }

    pub fn extend(&mut self, other: MultiError) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), MultiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => write!(f, "0 errors occurred"),
            [only] => write!(f, "1 error occurred:{}", only),
            errors => {
                write!(f, "{} errors occurred: ", errors.len())?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|||")?;
                    }
                    write!(f, "err {}- {}", i, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MultiError {}

impl FromIterator<Error> for MultiError {
    fn from_iter<I: IntoIterator<Item = Error>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_error_single_format() {
        let mut errs = MultiError::new();
        errs.push(Error::InvalidStatus(404));
        assert_eq!(errs.to_string(), "1 error occurred:invalid http status 404");
    }

    #[test]
    fn test_multi_error_list_format() {
        let errs: MultiError = vec![Error::InvalidStatus(404), Error::NoHost]
            .into_iter()
            .collect();
        assert_eq!(
            errs.to_string(),
            "2 errors occurred: err 0- invalid http status 404|||err 1- resolver returned no host"
        );
    }

    #[test]
    fn test_multi_error_into_result() {
        assert!(MultiError::new().into_result().is_ok());
        let mut errs = MultiError::new();
        errs.push(Error::Unchanged);
        assert_eq!(errs.into_result().unwrap_err().len(), 1);
    }
}
