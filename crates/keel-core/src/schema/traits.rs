//! Known traits, the dynamic fallback, and the registry that builds them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::SchemaError;
use crate::document::Document;
use crate::error::Fault;
use crate::shape_id::{ShapeId, PRELUDE_NAMESPACE};

/// Wire representation of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimestampFormat {
    #[serde(rename = "date-time")]
    DateTime,
    #[serde(rename = "http-date")]
    HttpDate,
    #[serde(rename = "epoch-seconds")]
    EpochSeconds,
}

impl TimestampFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DateTime => "date-time",
            Self::HttpDate => "http-date",
            Self::EpochSeconds => "epoch-seconds",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "date-time" => Some(Self::DateTime),
            "http-date" => Some(Self::HttpDate),
            "epoch-seconds" => Some(Self::EpochSeconds),
            _ => None,
        }
    }
}

/// A trait applied to a shape or member.
///
/// Known traits are typed variants; anything else is carried as
/// [`Trait::Dynamic`]. Both expose the same `(id, value)` view.
#[derive(Debug, Clone, PartialEq)]
pub enum Trait {
    Default(Document),
    Required,
    Sparse,
    Sensitive,
    Streaming,
    IdempotencyToken,
    TimestampFormat(TimestampFormat),
    JsonName(String),
    MediaType(String),
    Error(Fault),
    Retryable { throttling: bool },
    Http { method: String, uri: String, code: u16 },
    HttpError(u16),
    HttpHeader(String),
    HttpLabel,
    HttpQuery(String),
    HttpQueryParams,
    HttpPrefixHeaders(String),
    HttpPayload,
    HttpResponseCode,
    EventHeader,
    EventPayload,
    Auth(Vec<ShapeId>),
    Dynamic { id: ShapeId, value: Document },
}

impl Trait {
    fn local_name(&self) -> Option<&'static str> {
        let name = match self {
            Self::Default(_) => "default",
            Self::Required => "required",
            Self::Sparse => "sparse",
            Self::Sensitive => "sensitive",
            Self::Streaming => "streaming",
            Self::IdempotencyToken => "idempotencyToken",
            Self::TimestampFormat(_) => "timestampFormat",
            Self::JsonName(_) => "jsonName",
            Self::MediaType(_) => "mediaType",
            Self::Error(_) => "error",
            Self::Retryable { .. } => "retryable",
            Self::Http { .. } => "http",
            Self::HttpError(_) => "httpError",
            Self::HttpHeader(_) => "httpHeader",
            Self::HttpLabel => "httpLabel",
            Self::HttpQuery(_) => "httpQuery",
            Self::HttpQueryParams => "httpQueryParams",
            Self::HttpPrefixHeaders(_) => "httpPrefixHeaders",
            Self::HttpPayload => "httpPayload",
            Self::HttpResponseCode => "httpResponseCode",
            Self::EventHeader => "eventHeader",
            Self::EventPayload => "eventPayload",
            Self::Auth(_) => "auth",
            Self::Dynamic { .. } => return None,
        };
        Some(name)
    }

    pub fn id(&self) -> ShapeId {
        match self {
            Self::Dynamic { id, .. } => id.clone(),
            known => ShapeId::prelude(known.local_name().unwrap_or_default()),
        }
    }

    fn matches(&self, id: &ShapeId) -> bool {
        match (self, self.local_name()) {
            (Self::Dynamic { id: own, .. }, _) => own == id,
            (_, Some(name)) => id.namespace() == PRELUDE_NAMESPACE && id.name() == name,
            _ => false,
        }
    }

    /// Document form of the trait value.
    pub fn value(&self) -> Document {
        match self {
            Self::Default(value) => value.clone(),
            Self::TimestampFormat(format) => Document::from(format.as_str()),
            Self::JsonName(value)
            | Self::MediaType(value)
            | Self::HttpHeader(value)
            | Self::HttpQuery(value)
            | Self::HttpPrefixHeaders(value) => Document::from(value.as_str()),
            Self::Error(fault) => Document::from(fault.as_str()),
            Self::Retryable { throttling } => {
                let mut map = BTreeMap::new();
                map.insert(String::from("throttling"), Document::Boolean(*throttling));
                Document::Map(map)
            }
            Self::Http { method, uri, code } => {
                let mut map = BTreeMap::new();
                map.insert(String::from("method"), Document::from(method.as_str()));
                map.insert(String::from("uri"), Document::from(uri.as_str()));
                map.insert(String::from("code"), Document::Integer(i64::from(*code)));
                Document::Map(map)
            }
            Self::HttpError(code) => Document::Integer(i64::from(*code)),
            Self::Auth(schemes) => Document::List(
                schemes
                    .iter()
                    .map(|id| Document::String(id.to_string()))
                    .collect(),
            ),
            Self::Dynamic { value, .. } => value.clone(),
            Self::Required
            | Self::Sparse
            | Self::Sensitive
            | Self::Streaming
            | Self::IdempotencyToken
            | Self::HttpLabel
            | Self::HttpQueryParams
            | Self::HttpPayload
            | Self::HttpResponseCode
            | Self::EventHeader
            | Self::EventPayload => Document::empty_map(),
        }
    }
}

/// Traits applied to one shape, at most one per id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraitMap {
    traits: Vec<Trait>,
}

impl TraitMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a trait, replacing any existing trait with the same id.
    pub fn insert(&mut self, value: Trait) {
        let id = value.id();
        match self.traits.iter_mut().find(|existing| existing.matches(&id)) {
            Some(existing) => *existing = value,
            None => self.traits.push(value),
        }
    }

    pub fn with(mut self, value: Trait) -> Self {
        self.insert(value);
        self
    }

    /// Overlays `other` on top of `self`; `other` wins on conflicts.
    pub fn merged(&self, other: &TraitMap) -> TraitMap {
        let mut merged = self.clone();
        for value in &other.traits {
            merged.insert(value.clone());
        }
        merged
    }

    /// Builds a map from raw `(id, value)` pairs through `registry`.
    pub fn from_documents<'a>(
        registry: &TraitRegistry,
        raw: impl IntoIterator<Item = (&'a ShapeId, &'a Document)>,
    ) -> Result<Self, SchemaError> {
        let mut traits = Self::new();
        for (id, value) in raw {
            if let Some(created) = registry.create(id, value)? {
                traits.insert(created);
            }
        }
        Ok(traits)
    }

    pub fn get(&self, id: &ShapeId) -> Option<&Trait> {
        self.traits.iter().find(|value| value.matches(id))
    }

    pub fn contains(&self, id: &ShapeId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trait> {
        self.traits.iter()
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    fn has(&self, predicate: impl Fn(&Trait) -> bool) -> bool {
        self.traits.iter().any(predicate)
    }

    pub fn default_value(&self) -> Option<&Document> {
        self.traits.iter().find_map(|value| match value {
            Trait::Default(document) => Some(document),
            _ => None,
        })
    }

    pub fn is_required(&self) -> bool {
        self.has(|value| matches!(value, Trait::Required))
    }

    pub fn is_sparse(&self) -> bool {
        self.has(|value| matches!(value, Trait::Sparse))
    }

    pub fn is_sensitive(&self) -> bool {
        self.has(|value| matches!(value, Trait::Sensitive))
    }

    pub fn is_streaming(&self) -> bool {
        self.has(|value| matches!(value, Trait::Streaming))
    }

    pub fn timestamp_format(&self) -> Option<TimestampFormat> {
        self.traits.iter().find_map(|value| match value {
            Trait::TimestampFormat(format) => Some(*format),
            _ => None,
        })
    }

    pub fn json_name(&self) -> Option<&str> {
        self.traits.iter().find_map(|value| match value {
            Trait::JsonName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn media_type(&self) -> Option<&str> {
        self.traits.iter().find_map(|value| match value {
            Trait::MediaType(media_type) => Some(media_type.as_str()),
            _ => None,
        })
    }

    pub fn error_fault(&self) -> Option<Fault> {
        self.traits.iter().find_map(|value| match value {
            Trait::Error(fault) => Some(*fault),
            _ => None,
        })
    }

    /// `Some(throttling)` when the shape carries the `retryable` trait.
    pub fn retryable(&self) -> Option<bool> {
        self.traits.iter().find_map(|value| match value {
            Trait::Retryable { throttling } => Some(*throttling),
            _ => None,
        })
    }

    /// `(method, uri, code)` of an operation's `http` trait.
    pub fn http(&self) -> Option<(&str, &str, u16)> {
        self.traits.iter().find_map(|value| match value {
            Trait::Http { method, uri, code } => Some((method.as_str(), uri.as_str(), *code)),
            _ => None,
        })
    }

    pub fn http_error(&self) -> Option<u16> {
        self.traits.iter().find_map(|value| match value {
            Trait::HttpError(code) => Some(*code),
            _ => None,
        })
    }

    pub fn http_header(&self) -> Option<&str> {
        self.traits.iter().find_map(|value| match value {
            Trait::HttpHeader(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn http_query(&self) -> Option<&str> {
        self.traits.iter().find_map(|value| match value {
            Trait::HttpQuery(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn http_prefix_headers(&self) -> Option<&str> {
        self.traits.iter().find_map(|value| match value {
            Trait::HttpPrefixHeaders(prefix) => Some(prefix.as_str()),
            _ => None,
        })
    }

    pub fn is_http_label(&self) -> bool {
        self.has(|value| matches!(value, Trait::HttpLabel))
    }

    pub fn is_http_query_params(&self) -> bool {
        self.has(|value| matches!(value, Trait::HttpQueryParams))
    }

    pub fn is_http_payload(&self) -> bool {
        self.has(|value| matches!(value, Trait::HttpPayload))
    }

    pub fn is_http_response_code(&self) -> bool {
        self.has(|value| matches!(value, Trait::HttpResponseCode))
    }

    pub fn is_event_header(&self) -> bool {
        self.has(|value| matches!(value, Trait::EventHeader))
    }

    pub fn is_event_payload(&self) -> bool {
        self.has(|value| matches!(value, Trait::EventPayload))
    }

    pub fn auth(&self) -> Option<&[ShapeId]> {
        self.traits.iter().find_map(|value| match value {
            Trait::Auth(schemes) => Some(schemes.as_slice()),
            _ => None,
        })
    }
}

impl FromIterator<Trait> for TraitMap {
    fn from_iter<I: IntoIterator<Item = Trait>>(iter: I) -> Self {
        let mut traits = Self::new();
        for value in iter {
            traits.insert(value);
        }
        traits
    }
}

/// Builds a typed trait from its document value.
pub type TraitConstructor = fn(&ShapeId, &Document) -> Result<Trait, SchemaError>;

/// Immutable mapping from trait id to constructor.
///
/// Ids without a constructor become [`Trait::Dynamic`]; filtered ids carry no
/// serialization behavior and are dropped.
#[derive(Debug, Clone)]
pub struct TraitRegistry {
    constructors: Arc<HashMap<ShapeId, TraitConstructor>>,
    filtered: Arc<HashSet<ShapeId>>,
}

impl TraitRegistry {
    /// Registry for the built-in prelude traits.
    pub fn standard() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TraitRegistryBuilder {
        let mut builder = TraitRegistryBuilder {
            constructors: HashMap::new(),
            filtered: HashSet::new(),
        };
        for (name, constructor) in STANDARD_CONSTRUCTORS {
            builder = builder.with_constructor(ShapeId::prelude(*name), *constructor);
        }
        for name in FILTERED_TRAITS {
            builder = builder.with_filtered(ShapeId::prelude(*name));
        }
        builder
    }

    /// Returns `None` for filtered traits.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidTrait`] when a known trait's value has
    /// the wrong shape.
    pub fn create(&self, id: &ShapeId, value: &Document) -> Result<Option<Trait>, SchemaError> {
        if self.filtered.contains(id) {
            return Ok(None);
        }
        match self.constructors.get(id) {
            Some(constructor) => constructor(id, value).map(Some),
            None => Ok(Some(Trait::Dynamic {
                id: id.clone(),
                value: value.clone(),
            })),
        }
    }
}

impl Default for TraitRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Builder for [`TraitRegistry`], seeded with the standard traits.
#[derive(Debug)]
pub struct TraitRegistryBuilder {
    constructors: HashMap<ShapeId, TraitConstructor>,
    filtered: HashSet<ShapeId>,
}

impl TraitRegistryBuilder {
    pub fn with_constructor(mut self, id: ShapeId, constructor: TraitConstructor) -> Self {
        self.constructors.insert(id, constructor);
        self
    }

    pub fn with_filtered(mut self, id: ShapeId) -> Self {
        self.filtered.insert(id);
        self
    }

    pub fn build(self) -> TraitRegistry {
        TraitRegistry {
            constructors: Arc::new(self.constructors),
            filtered: Arc::new(self.filtered),
        }
    }
}

const FILTERED_TRAITS: &[&str] = &[
    "documentation",
    "enumValue",
    "examples",
    "externalDocumentation",
    "since",
    "tags",
    "title",
    "unstable",
    "deprecated",
    "suppress",
];

const STANDARD_CONSTRUCTORS: &[(&str, TraitConstructor)] = &[
    ("default", default_trait),
    ("required", |_, _| Ok(Trait::Required)),
    ("sparse", |_, _| Ok(Trait::Sparse)),
    ("sensitive", |_, _| Ok(Trait::Sensitive)),
    ("streaming", |_, _| Ok(Trait::Streaming)),
    ("idempotencyToken", |_, _| Ok(Trait::IdempotencyToken)),
    ("timestampFormat", timestamp_format_trait),
    ("jsonName", |id, value| Ok(Trait::JsonName(string_value(id, value)?))),
    ("mediaType", |id, value| Ok(Trait::MediaType(string_value(id, value)?))),
    ("error", error_trait),
    ("retryable", retryable_trait),
    ("http", http_trait),
    ("httpError", |id, value| Ok(Trait::HttpError(status_code(id, value)?))),
    ("httpHeader", |id, value| Ok(Trait::HttpHeader(string_value(id, value)?))),
    ("httpLabel", |_, _| Ok(Trait::HttpLabel)),
    ("httpQuery", |id, value| Ok(Trait::HttpQuery(string_value(id, value)?))),
    ("httpQueryParams", |_, _| Ok(Trait::HttpQueryParams)),
    ("httpPrefixHeaders", |id, value| {
        Ok(Trait::HttpPrefixHeaders(string_value(id, value)?))
    }),
    ("httpPayload", |_, _| Ok(Trait::HttpPayload)),
    ("httpResponseCode", |_, _| Ok(Trait::HttpResponseCode)),
    ("eventHeader", |_, _| Ok(Trait::EventHeader)),
    ("eventPayload", |_, _| Ok(Trait::EventPayload)),
    ("auth", auth_trait),
];

fn default_trait(_: &ShapeId, value: &Document) -> Result<Trait, SchemaError> {
    Ok(Trait::Default(value.clone()))
}

fn timestamp_format_trait(id: &ShapeId, value: &Document) -> Result<Trait, SchemaError> {
    let format = string_value(id, value)?;
    TimestampFormat::parse(&format)
        .map(Trait::TimestampFormat)
        .ok_or_else(|| invalid(id, "unknown timestamp format"))
}

fn error_trait(id: &ShapeId, value: &Document) -> Result<Trait, SchemaError> {
    match string_value(id, value)?.as_str() {
        "client" => Ok(Trait::Error(Fault::Client)),
        "server" => Ok(Trait::Error(Fault::Server)),
        _ => Err(invalid(id, "fault must be 'client' or 'server'")),
    }
}

fn retryable_trait(_: &ShapeId, value: &Document) -> Result<Trait, SchemaError> {
    let throttling = value
        .get("throttling")
        .and_then(Document::as_bool)
        .unwrap_or(false);
    Ok(Trait::Retryable { throttling })
}

fn http_trait(id: &ShapeId, value: &Document) -> Result<Trait, SchemaError> {
    let method = value
        .get("method")
        .and_then(Document::as_str)
        .ok_or_else(|| invalid(id, "missing method"))?;
    let uri = value
        .get("uri")
        .and_then(Document::as_str)
        .ok_or_else(|| invalid(id, "missing uri"))?;
    let code = match value.get("code") {
        Some(code) => status_code(id, code)?,
        None => 200,
    };
    Ok(Trait::Http {
        method: method.to_owned(),
        uri: uri.to_owned(),
        code,
    })
}

fn auth_trait(id: &ShapeId, value: &Document) -> Result<Trait, SchemaError> {
    let schemes = value
        .as_list()
        .ok_or_else(|| invalid(id, "expected a list of scheme ids"))?;
    let mut parsed = Vec::with_capacity(schemes.len());
    for scheme in schemes {
        let raw = scheme
            .as_str()
            .ok_or_else(|| invalid(id, "scheme ids must be strings"))?;
        parsed.push(ShapeId::parse(raw).map_err(|error| invalid(id, &error.to_string()))?);
    }
    Ok(Trait::Auth(parsed))
}

fn invalid(id: &ShapeId, reason: &str) -> SchemaError {
    SchemaError::InvalidTrait {
        id: id.to_string(),
        reason: reason.to_owned(),
    }
}

fn string_value(id: &ShapeId, value: &Document) -> Result<String, SchemaError> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| invalid(id, "expected a string value"))
}

fn status_code(id: &ShapeId, value: &Document) -> Result<u16, SchemaError> {
    value
        .as_i64()
        .and_then(|code| u16::try_from(code).ok())
        .ok_or_else(|| invalid(id, "expected a status code"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_traits_become_dynamic() {
        let registry = TraitRegistry::standard();
        let id = ShapeId::parse("example.custom#audited").expect("valid id");
        let created = registry
            .create(&id, &Document::from("yes"))
            .expect("create")
            .expect("not filtered");

        assert_eq!(created.id(), id);
        assert_eq!(created.value(), Document::from("yes"));
    }

    #[test]
    fn documentation_traits_are_filtered() {
        let registry = TraitRegistry::standard();
        let created = registry
            .create(&ShapeId::prelude("documentation"), &Document::from("docs"))
            .expect("create");
        assert!(created.is_none());
    }

    #[test]
    fn known_traits_are_typed_and_share_the_generic_view() {
        let registry = TraitRegistry::standard();
        let raw = [
            (ShapeId::prelude("jsonName"), Document::from("Name")),
            (ShapeId::prelude("required"), Document::empty_map()),
            (ShapeId::prelude("timestampFormat"), Document::from("http-date")),
        ];
        let traits = TraitMap::from_documents(&registry, raw.iter().map(|(id, value)| (id, value)))
            .expect("valid traits");

        assert_eq!(traits.json_name(), Some("Name"));
        assert!(traits.is_required());
        assert_eq!(traits.timestamp_format(), Some(TimestampFormat::HttpDate));
        let generic = traits
            .get(&ShapeId::prelude("jsonName"))
            .expect("present by id");
        assert_eq!(generic.value(), Document::from("Name"));
    }

    #[test]
    fn malformed_known_traits_are_rejected() {
        let registry = TraitRegistry::standard();
        let error = registry
            .create(&ShapeId::prelude("error"), &Document::from("nobody"))
            .expect_err("invalid fault");
        assert!(matches!(error, SchemaError::InvalidTrait { .. }));
    }

    #[test]
    fn insert_replaces_traits_with_the_same_id() {
        let traits = TraitMap::new()
            .with(Trait::JsonName(String::from("a")))
            .with(Trait::JsonName(String::from("b")));
        assert_eq!(traits.len(), 1);
        assert_eq!(traits.json_name(), Some("b"));
    }
}
