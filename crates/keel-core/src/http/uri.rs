use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

/// Parsed request destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid uri '{value}': {reason}")]
pub struct UriError {
    value: String,
    reason: String,
}

impl Uri {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            username: None,
            password: None,
            host: host.into(),
            port: None,
            path: String::from("/"),
            query: None,
            fragment: None,
        }
    }

    pub fn parse(value: &str) -> Result<Self, UriError> {
        let parsed = reqwest::Url::parse(value).map_err(|error| UriError {
            value: value.to_owned(),
            reason: error.to_string(),
        })?;
        let host = parsed.host_str().ok_or_else(|| UriError {
            value: value.to_owned(),
            reason: String::from("missing host"),
        })?;

        Ok(Self {
            scheme: parsed.scheme().to_owned(),
            username: Some(parsed.username())
                .filter(|name| !name.is_empty())
                .map(str::to_owned),
            password: parsed.password().map(str::to_owned),
            host: host.to_owned(),
            port: parsed.port(),
            path: parsed.path().to_owned(),
            query: parsed.query().map(str::to_owned),
            fragment: parsed.fragment().map(str::to_owned),
        })
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|query| !query.is_empty());
        self
    }

    /// `host[:port]`, as sent in the `Host` header.
    pub fn netloc(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        }
    }

    /// Appends `name=value` (already encoded) to the query string.
    pub fn append_query(&mut self, pair: &str) {
        self.query = Some(match self.query.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{pair}"),
            _ => pair.to_owned(),
        });
    }

    /// Joins a base path with an operation path without doubling slashes.
    pub fn join_path(base: &str, path: &str) -> String {
        let base = base.trim_end_matches('/');
        match (base.is_empty(), path.starts_with('/')) {
            (true, true) => path.to_owned(),
            (true, false) => format!("/{path}"),
            (false, true) => format!("{base}{path}"),
            (false, false) => format!("{base}/{path}"),
        }
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(username) = &self.username {
            f.write_str(username)?;
            if let Some(password) = &self.password {
                write!(f, ":{password}")?;
            }
            f.write_str("@")?;
        }
        f.write_str(&self.netloc())?;
        if !self.path.starts_with('/') {
            f.write_str("/")?;
        }
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
