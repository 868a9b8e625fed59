//! Shape identifiers.
//!
//! Every shape in a model is addressed by an absolute id of the form
//! `namespace#Name`, and every member by `namespace#Name$member`.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

/// Namespace of the built-in prelude shapes and traits.
pub const PRELUDE_NAMESPACE: &str = "smithy.api";

/// Absolute shape identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId {
    namespace: String,
    name: String,
    member: Option<String>,
}

/// Errors raised while parsing a [`ShapeId`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeIdError {
    #[error("shape id '{value}' is missing a namespace")]
    MissingNamespace { value: String },
    #[error("shape id '{value}' has an empty name")]
    EmptyName { value: String },
    #[error("shape id '{value}' contains invalid character '{ch}'")]
    InvalidCharacter { value: String, ch: char },
}

impl ShapeId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            member: None,
        }
    }

    /// Id of a shape or trait in the prelude namespace.
    pub fn prelude(name: impl Into<String>) -> Self {
        Self::new(PRELUDE_NAMESPACE, name)
    }

    pub fn parse(input: &str) -> Result<Self, ShapeIdError> {
        let (namespace, rest) = input
            .split_once('#')
            .ok_or_else(|| ShapeIdError::MissingNamespace {
                value: input.to_owned(),
            })?;
        if namespace.is_empty() {
            return Err(ShapeIdError::MissingNamespace {
                value: input.to_owned(),
            });
        }

        let (name, member) = match rest.split_once('$') {
            Some((name, member)) => (name, Some(member)),
            None => (rest, None),
        };
        if name.is_empty() || member.is_some_and(str::is_empty) {
            return Err(ShapeIdError::EmptyName {
                value: input.to_owned(),
            });
        }

        validate_segment(input, namespace, true)?;
        validate_segment(input, name, false)?;
        if let Some(member) = member {
            validate_segment(input, member, false)?;
        }

        Ok(Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            member: member.map(str::to_owned),
        })
    }

    /// Id of the member `member` within this shape.
    pub fn with_member(&self, member: impl Into<String>) -> Self {
        Self {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            member: Some(member.into()),
        }
    }

    /// The containing shape id with any member component removed.
    pub fn root(&self) -> Self {
        Self::new(self.namespace.clone(), self.name.clone())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }
}

fn validate_segment(input: &str, segment: &str, allow_dots: bool) -> Result<(), ShapeIdError> {
    for ch in segment.chars() {
        let valid = ch.is_ascii_alphanumeric() || ch == '_' || (allow_dots && ch == '.');
        if !valid {
            return Err(ShapeIdError::InvalidCharacter {
                value: input.to_owned(),
                ch,
            });
        }
    }
    Ok(())
}

impl Display for ShapeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.namespace, self.name)?;
        if let Some(member) = &self.member {
            write!(f, "${member}")?;
        }
        Ok(())
    }
}

impl FromStr for ShapeId {
    type Err = ShapeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
