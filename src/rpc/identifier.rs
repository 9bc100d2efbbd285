//! Namespaced method names used as registry keys and wire `method` strings.

use std::{borrow::Cow, fmt, str::FromStr};

use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "minecraft";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    namespace: Cow<'static, str>,
    path: Cow<'static, str>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,
    #[error("invalid character in namespace `{0}`")]
    InvalidNamespace(String),
    #[error("invalid character in path `{0}`")]
    InvalidPath(String),
}

impl Identifier {
    /// Identifier in the default namespace. The path is not validated, so this
    /// is meant for names spelled out in source.
    pub const fn vanilla(path: &'static str) -> Self {
        Self {
            namespace: Cow::Borrowed(DEFAULT_NAMESPACE),
            path: Cow::Borrowed(path),
        }
    }

    pub fn new(
        namespace: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<Self, IdentifierError> {
        let namespace = namespace.into();
        let path = path.into();

        if namespace.is_empty() || !namespace.chars().all(is_namespace_char) {
            return Err(IdentifierError::InvalidNamespace(namespace));
        }
        if path.is_empty() || !path.chars().all(is_path_char) {
            return Err(IdentifierError::InvalidPath(path));
        }

        Ok(Self {
            namespace: Cow::Owned(namespace),
            path: Cow::Owned(path),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Err(IdentifierError::Empty);
        }

        match value.split_once(':') {
            Some((namespace, path)) => Self::new(namespace, path),
            None => Self::new(DEFAULT_NAMESPACE, value),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

fn is_namespace_char(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-')
}

fn is_path_char(c: char) -> bool {
    is_namespace_char(c) || c == '/'
}
