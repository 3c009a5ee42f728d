use thiserror::Error;

/// Raised when a field is present in a result document but has a shape the
/// requested computation cannot use. Absent fields never produce this error;
/// they resolve to documented defaults instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("malformed shape at {path}: {reason}")]
    MalformedShape { path: String, reason: String },
}

impl SchemaError {
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedShape {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::MalformedShape { path, .. } => path,
        }
    }
}

pub type SchemaResult<T> = Result<T, SchemaError>;
