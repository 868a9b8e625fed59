//! Shapes and doubles shared by the behavior tests.
//!
//! The shapes are written the way generated code writes them: static
//! schemas, member-by-member serialization and consumer-driven
//! deserialization.

#![allow(dead_code)]

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, LazyLock, Mutex};

use bytes::Bytes;
use keel_core::deserializers::{
    read_list_of, read_map_of, read_struct_into, DeserializeResult, DeserializeableShape,
    ShapeDeserializer,
};
use keel_core::event_stream::{EventFramer, EventMessage};
use keel_core::interceptor::{InputContext, OutputContext, RequestContext, ResponseContext};
use keel_core::schema::{prelude, MemberDef, ShapeType, Trait, TraitMap};
use keel_core::serializers::{
    write_list_of, write_map_of, SerializeResult, SerializeableShape, SerializeableStruct,
    ShapeSerializer,
};
use keel_core::{
    ApiError, ApiOperation, BoxError, ClientTransport, Document, Fault, HttpRequest,
    HttpResponse, Interceptor, ModeledError, RetryInfo, Schema, SerializationError, ShapeId,
    TransportError, TypeRegistry,
};
use keel_core::BoxFuture;
use time::OffsetDateTime;

pub const NAMESPACE: &str = "example.weather";

fn shape_id(name: &str) -> ShapeId {
    ShapeId::new(NAMESPACE, name)
}

fn collection(
    name: &str,
    shape_type: ShapeType,
    traits: TraitMap,
    members: Vec<MemberDef>,
) -> Schema {
    Schema::collection(shape_id(name), shape_type, traits, members).expect("valid test schema")
}

pub fn member(schema: &Schema, name: &str) -> Schema {
    schema.member(name).expect("declared member")
}

// =============================================================================
// Schemas
// =============================================================================

pub static TEMPERATURES: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "Temperatures",
        ShapeType::List,
        TraitMap::new(),
        vec![MemberDef::new("member", &prelude::DOUBLE)],
    )
});

pub static TAGS: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "Tags",
        ShapeType::List,
        TraitMap::new(),
        vec![MemberDef::new("member", &prelude::STRING)],
    )
});

pub static READINGS: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "Readings",
        ShapeType::Map,
        TraitMap::new(),
        vec![
            MemberDef::new("key", &prelude::STRING),
            MemberDef::new("value", &prelude::INTEGER),
        ],
    )
});

pub static LABELS: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "Labels",
        ShapeType::Map,
        TraitMap::new(),
        vec![
            MemberDef::new("key", &prelude::STRING),
            MemberDef::new("value", &prelude::STRING),
        ],
    )
});

pub static FORECAST: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "Forecast",
        ShapeType::Structure,
        TraitMap::new(),
        vec![
            MemberDef::new("city", &prelude::STRING).with_trait(Trait::Required),
            MemberDef::new("temperatures", &TEMPERATURES),
            MemberDef::new("readings", &READINGS),
            MemberDef::new("issuedAt", &prelude::TIMESTAMP),
            MemberDef::new("updatedOn", &prelude::TIMESTAMP).with_trait(Trait::TimestampFormat(
                keel_core::TimestampFormat::DateTime,
            )),
            MemberDef::new("rainChance", &prelude::DOUBLE)
                .with_trait(Trait::JsonName(String::from("chance_of_rain"))),
            MemberDef::new("details", &prelude::DOCUMENT),
            MemberDef::new("icon", &prelude::BLOB),
        ],
    )
});

pub static GET_FORECAST_INPUT: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "GetForecastInput",
        ShapeType::Structure,
        TraitMap::new(),
        vec![
            MemberDef::new("city", &prelude::STRING).with_trait(Trait::HttpLabel),
            MemberDef::new("units", &prelude::STRING)
                .with_trait(Trait::HttpQuery(String::from("units"))),
            MemberDef::new("tags", &TAGS).with_trait(Trait::HttpQuery(String::from("tag"))),
            MemberDef::new("filters", &LABELS).with_trait(Trait::HttpQueryParams),
            MemberDef::new("requestId", &prelude::STRING)
                .with_trait(Trait::HttpHeader(String::from("x-request-id"))),
            MemberDef::new("since", &prelude::TIMESTAMP)
                .with_trait(Trait::HttpHeader(String::from("if-modified-since"))),
            MemberDef::new("days", &prelude::INTEGER),
            MemberDef::new("note", &prelude::STRING),
        ],
    )
});

pub static GET_FORECAST_OUTPUT: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "GetForecastOutput",
        ShapeType::Structure,
        TraitMap::new(),
        vec![
            MemberDef::new("requestId", &prelude::STRING)
                .with_trait(Trait::HttpHeader(String::from("x-request-id"))),
            MemberDef::new("cacheTags", &TAGS)
                .with_trait(Trait::HttpHeader(String::from("x-cache-tags"))),
            MemberDef::new("metadata", &LABELS)
                .with_trait(Trait::HttpPrefixHeaders(String::from("x-meta-"))),
            MemberDef::new("status", &prelude::INTEGER).with_trait(Trait::HttpResponseCode),
            MemberDef::new("forecast", &FORECAST),
            MemberDef::new("summary", &prelude::STRING),
        ],
    )
});

pub static GET_FORECAST: LazyLock<Schema> = LazyLock::new(|| {
    Schema::simple(
        shape_id("GetForecast"),
        ShapeType::Operation,
        TraitMap::new().with(Trait::Http {
            method: String::from("POST"),
            uri: String::from("/forecast/{city}?view=full"),
            code: 200,
        }),
    )
});

pub static NOT_FOUND: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "NotFound",
        ShapeType::Structure,
        TraitMap::new()
            .with(Trait::Error(Fault::Client))
            .with(Trait::HttpError(404)),
        vec![MemberDef::new("message", &prelude::STRING)],
    )
});

pub static THROTTLED: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "Throttled",
        ShapeType::Structure,
        TraitMap::new()
            .with(Trait::Error(Fault::Server))
            .with(Trait::Retryable { throttling: true })
            .with(Trait::HttpError(429)),
        vec![MemberDef::new("message", &prelude::STRING)],
    )
});

pub static READING_EVENT: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "ReadingEvent",
        ShapeType::Structure,
        TraitMap::new(),
        vec![
            MemberDef::new("city", &prelude::STRING).with_trait(Trait::EventHeader),
            MemberDef::new("celsius", &prelude::DOUBLE),
        ],
    )
});

pub static ALERT_EVENT: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "AlertEvent",
        ShapeType::Structure,
        TraitMap::new(),
        vec![
            MemberDef::new("severity", &prelude::STRING).with_trait(Trait::EventHeader),
            MemberDef::new("bulletin", &prelude::BLOB).with_trait(Trait::EventPayload),
        ],
    )
});

pub static WEATHER_EVENTS: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "WeatherEvents",
        ShapeType::Union,
        TraitMap::new().with(Trait::Streaming),
        vec![
            MemberDef::new("reading", &READING_EVENT),
            MemberDef::new("alert", &ALERT_EVENT),
        ],
    )
});

pub static STREAM_WEATHER_INPUT: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "StreamWeatherInput",
        ShapeType::Structure,
        TraitMap::new(),
        vec![
            MemberDef::new("station", &prelude::STRING).with_trait(Trait::HttpLabel),
            MemberDef::new("events", &WEATHER_EVENTS).with_trait(Trait::HttpPayload),
        ],
    )
});

pub static STREAM_WEATHER_OUTPUT: LazyLock<Schema> = LazyLock::new(|| {
    collection(
        "StreamWeatherOutput",
        ShapeType::Structure,
        TraitMap::new(),
        vec![
            MemberDef::new("sessionId", &prelude::STRING)
                .with_trait(Trait::HttpHeader(String::from("x-session-id"))),
            MemberDef::new("events", &WEATHER_EVENTS).with_trait(Trait::HttpPayload),
        ],
    )
});

pub static STREAM_WEATHER: LazyLock<Schema> = LazyLock::new(|| {
    Schema::simple(
        shape_id("StreamWeather"),
        ShapeType::Operation,
        TraitMap::new().with(Trait::Http {
            method: String::from("POST"),
            uri: String::from("/stations/{station}/stream"),
            code: 200,
        }),
    )
});

pub fn get_forecast() -> ApiOperation<GetForecastInput, GetForecastOutput> {
    ApiOperation::new(
        GET_FORECAST.clone(),
        GET_FORECAST_INPUT.clone(),
        GET_FORECAST_OUTPUT.clone(),
    )
    .with_errors(TypeRegistry::new().register::<NotFound>().register::<Throttled>())
}

pub fn stream_weather() -> ApiOperation<StreamWeatherInput, StreamWeatherOutput> {
    ApiOperation::new(
        STREAM_WEATHER.clone(),
        STREAM_WEATHER_INPUT.clone(),
        STREAM_WEATHER_OUTPUT.clone(),
    )
    .with_errors(TypeRegistry::new().register::<NotFound>())
    .with_input_events(WEATHER_EVENTS.clone())
    .with_output_events(WEATHER_EVENTS.clone())
}

// =============================================================================
// Structures
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forecast {
    pub city: String,
    pub temperatures: Vec<f64>,
    pub readings: BTreeMap<String, i32>,
    pub issued_at: Option<OffsetDateTime>,
    pub updated_on: Option<OffsetDateTime>,
    pub rain_chance: Option<f64>,
    pub details: Option<Document>,
    pub icon: Option<Bytes>,
}

impl SerializeableShape for Forecast {
    fn serialize(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        serializer.write_struct(&FORECAST, self)
    }
}

impl SerializeableStruct for Forecast {
    fn schema(&self) -> &Schema {
        &FORECAST
    }

    fn serialize_members(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        serializer.write_string(&member(&FORECAST, "city"), &self.city)?;
        write_list_of(
            serializer,
            &member(&FORECAST, "temperatures"),
            &self.temperatures,
            |out, schema, value| out.write_double(schema, *value),
        )?;
        write_map_of(
            serializer,
            &member(&FORECAST, "readings"),
            self.readings.iter(),
            |out, schema, value| out.write_integer(schema, *value),
        )?;
        if let Some(value) = self.issued_at {
            serializer.write_timestamp(&member(&FORECAST, "issuedAt"), value)?;
        }
        if let Some(value) = self.updated_on {
            serializer.write_timestamp(&member(&FORECAST, "updatedOn"), value)?;
        }
        if let Some(value) = self.rain_chance {
            serializer.write_double(&member(&FORECAST, "rainChance"), value)?;
        }
        if let Some(value) = &self.details {
            serializer.write_document(&member(&FORECAST, "details"), value)?;
        }
        if let Some(value) = &self.icon {
            serializer.write_blob(&member(&FORECAST, "icon"), value)?;
        }
        Ok(())
    }
}

impl DeserializeableShape for Forecast {
    fn deserialize(deserializer: &mut dyn ShapeDeserializer) -> DeserializeResult<Self> {
        let mut forecast = Self::default();
        read_struct_into(deserializer, &FORECAST, &mut forecast, |forecast, member, de| {
            match member.member_name() {
                Some("city") => forecast.city = de.read_string(member)?,
                Some("temperatures") => {
                    forecast.temperatures =
                        read_list_of(de, member, |element, de| de.read_double(element))?;
                }
                Some("readings") => {
                    forecast.readings =
                        read_map_of(de, member, |value, de| de.read_integer(value))?;
                }
                Some("issuedAt") => forecast.issued_at = Some(de.read_timestamp(member)?),
                Some("updatedOn") => forecast.updated_on = Some(de.read_timestamp(member)?),
                Some("rainChance") => forecast.rain_chance = Some(de.read_double(member)?),
                Some("details") => forecast.details = Some(de.read_document(member)?),
                Some("icon") => forecast.icon = Some(de.read_blob(member)?),
                _ => {}
            }
            Ok(())
        })?;
        Ok(forecast)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetForecastInput {
    pub city: String,
    pub units: Option<String>,
    pub tags: Vec<String>,
    pub filters: BTreeMap<String, String>,
    pub request_id: Option<String>,
    pub since: Option<OffsetDateTime>,
    pub days: Option<i32>,
    pub note: Option<String>,
}

impl GetForecastInput {
    pub fn for_city(city: &str) -> Self {
        Self {
            city: city.to_owned(),
            ..Self::default()
        }
    }
}

impl SerializeableShape for GetForecastInput {
    fn serialize(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        serializer.write_struct(&GET_FORECAST_INPUT, self)
    }
}

impl SerializeableStruct for GetForecastInput {
    fn schema(&self) -> &Schema {
        &GET_FORECAST_INPUT
    }

    fn serialize_members(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        let schema = &*GET_FORECAST_INPUT;
        serializer.write_string(&member(schema, "city"), &self.city)?;
        if let Some(units) = &self.units {
            serializer.write_string(&member(schema, "units"), units)?;
        }
        if !self.tags.is_empty() {
            write_list_of(serializer, &member(schema, "tags"), &self.tags, |out, element, tag| {
                out.write_string(element, tag)
            })?;
        }
        if !self.filters.is_empty() {
            write_map_of(
                serializer,
                &member(schema, "filters"),
                self.filters.iter(),
                |out, value_schema, value| out.write_string(value_schema, value),
            )?;
        }
        if let Some(request_id) = &self.request_id {
            serializer.write_string(&member(schema, "requestId"), request_id)?;
        }
        if let Some(since) = self.since {
            serializer.write_timestamp(&member(schema, "since"), since)?;
        }
        if let Some(days) = self.days {
            serializer.write_integer(&member(schema, "days"), days)?;
        }
        if let Some(note) = &self.note {
            serializer.write_string(&member(schema, "note"), note)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetForecastOutput {
    pub request_id: Option<String>,
    pub cache_tags: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub status: Option<i32>,
    pub forecast: Option<Forecast>,
    pub summary: Option<String>,
}

impl DeserializeableShape for GetForecastOutput {
    fn deserialize(deserializer: &mut dyn ShapeDeserializer) -> DeserializeResult<Self> {
        let mut output = Self::default();
        read_struct_into(deserializer, &GET_FORECAST_OUTPUT, &mut output, |output, member, de| {
            match member.member_name() {
                Some("requestId") => output.request_id = Some(de.read_string(member)?),
                Some("cacheTags") => {
                    output.cache_tags =
                        read_list_of(de, member, |element, de| de.read_string(element))?;
                }
                Some("metadata") => {
                    output.metadata = read_map_of(de, member, |value, de| de.read_string(value))?;
                }
                Some("status") => output.status = Some(de.read_integer(member)?),
                Some("forecast") => output.forecast = Some(Forecast::deserialize(de)?),
                Some("summary") => output.summary = Some(de.read_string(member)?),
                _ => {}
            }
            Ok(())
        })?;
        Ok(output)
    }
}

// =============================================================================
// Modeled errors
// =============================================================================

fn read_message(
    deserializer: &mut dyn ShapeDeserializer,
    schema: &Schema,
) -> DeserializeResult<String> {
    let mut message = String::new();
    read_struct_into(deserializer, schema, &mut message, |message, member, de| {
        if member.member_name() == Some("message") {
            *message = de.read_string(member)?;
        }
        Ok(())
    })?;
    Ok(message)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotFound {
    pub message: String,
}

impl Display for NotFound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "NotFound: {}", self.message)
    }
}

impl std::error::Error for NotFound {}

impl ApiError for NotFound {
    fn code(&self) -> &str {
        "NotFound"
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn fault(&self) -> Fault {
        Fault::Client
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl DeserializeableShape for NotFound {
    fn deserialize(deserializer: &mut dyn ShapeDeserializer) -> DeserializeResult<Self> {
        Ok(Self {
            message: read_message(deserializer, &NOT_FOUND)?,
        })
    }
}

impl ModeledError for NotFound {
    fn error_schema() -> &'static Schema {
        &NOT_FOUND
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Throttled {
    pub message: String,
}

impl Display for Throttled {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Throttled: {}", self.message)
    }
}

impl std::error::Error for Throttled {}

impl ApiError for Throttled {
    fn code(&self) -> &str {
        "Throttled"
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn fault(&self) -> Fault {
        Fault::Server
    }

    fn retry_info(&self) -> RetryInfo {
        RetryInfo::throttling(None)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl DeserializeableShape for Throttled {
    fn deserialize(deserializer: &mut dyn ShapeDeserializer) -> DeserializeResult<Self> {
        Ok(Self {
            message: read_message(deserializer, &THROTTLED)?,
        })
    }
}

impl ModeledError for Throttled {
    fn error_schema() -> &'static Schema {
        &THROTTLED
    }
}

// =============================================================================
// Event stream shapes
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingEvent {
    pub city: String,
    pub celsius: f64,
}

impl SerializeableShape for ReadingEvent {
    fn serialize(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        serializer.write_struct(&READING_EVENT, self)
    }
}

impl SerializeableStruct for ReadingEvent {
    fn schema(&self) -> &Schema {
        &READING_EVENT
    }

    fn serialize_members(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        serializer.write_string(&member(&READING_EVENT, "city"), &self.city)?;
        serializer.write_double(&member(&READING_EVENT, "celsius"), self.celsius)
    }
}

impl DeserializeableShape for ReadingEvent {
    fn deserialize(deserializer: &mut dyn ShapeDeserializer) -> DeserializeResult<Self> {
        let mut event = Self::default();
        read_struct_into(deserializer, &READING_EVENT, &mut event, |event, member, de| {
            match member.member_name() {
                Some("city") => event.city = de.read_string(member)?,
                Some("celsius") => event.celsius = de.read_double(member)?,
                _ => {}
            }
            Ok(())
        })?;
        Ok(event)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertEvent {
    pub severity: String,
    pub bulletin: Bytes,
}

impl SerializeableShape for AlertEvent {
    fn serialize(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        serializer.write_struct(&ALERT_EVENT, self)
    }
}

impl SerializeableStruct for AlertEvent {
    fn schema(&self) -> &Schema {
        &ALERT_EVENT
    }

    fn serialize_members(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        serializer.write_string(&member(&ALERT_EVENT, "severity"), &self.severity)?;
        serializer.write_blob(&member(&ALERT_EVENT, "bulletin"), &self.bulletin)
    }
}

impl DeserializeableShape for AlertEvent {
    fn deserialize(deserializer: &mut dyn ShapeDeserializer) -> DeserializeResult<Self> {
        let mut event = Self::default();
        read_struct_into(deserializer, &ALERT_EVENT, &mut event, |event, member, de| {
            match member.member_name() {
                Some("severity") => event.severity = de.read_string(member)?,
                Some("bulletin") => event.bulletin = de.read_blob(member)?,
                _ => {}
            }
            Ok(())
        })?;
        Ok(event)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WeatherEvent {
    Reading(ReadingEvent),
    Alert(AlertEvent),
}

impl SerializeableShape for WeatherEvent {
    fn serialize(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        serializer.write_struct(&WEATHER_EVENTS, self)
    }
}

impl SerializeableStruct for WeatherEvent {
    fn schema(&self) -> &Schema {
        &WEATHER_EVENTS
    }

    fn serialize_members(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        match self {
            Self::Reading(event) => {
                serializer.write_struct(&member(&WEATHER_EVENTS, "reading"), event)
            }
            Self::Alert(event) => serializer.write_struct(&member(&WEATHER_EVENTS, "alert"), event),
        }
    }
}

impl DeserializeableShape for WeatherEvent {
    fn deserialize(deserializer: &mut dyn ShapeDeserializer) -> DeserializeResult<Self> {
        let mut event = None;
        read_struct_into(deserializer, &WEATHER_EVENTS, &mut event, |event, member, de| {
            match member.member_name() {
                Some("reading") => *event = Some(Self::Reading(ReadingEvent::deserialize(de)?)),
                Some("alert") => *event = Some(Self::Alert(AlertEvent::deserialize(de)?)),
                _ => {}
            }
            Ok(())
        })?;
        event.ok_or_else(|| {
            SerializationError::missing_member(WEATHER_EVENTS.id(), "event variant")
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamWeatherInput {
    pub station: String,
}

impl SerializeableShape for StreamWeatherInput {
    fn serialize(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        serializer.write_struct(&STREAM_WEATHER_INPUT, self)
    }
}

impl SerializeableStruct for StreamWeatherInput {
    fn schema(&self) -> &Schema {
        &STREAM_WEATHER_INPUT
    }

    fn serialize_members(&self, serializer: &mut dyn ShapeSerializer) -> SerializeResult {
        serializer.write_string(&member(&STREAM_WEATHER_INPUT, "station"), &self.station)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamWeatherOutput {
    pub session_id: Option<String>,
}

impl DeserializeableShape for StreamWeatherOutput {
    fn deserialize(deserializer: &mut dyn ShapeDeserializer) -> DeserializeResult<Self> {
        let mut output = Self::default();
        read_struct_into(deserializer, &STREAM_WEATHER_OUTPUT, &mut output, |output, member, de| {
            if member.member_name() == Some("sessionId") {
                output.session_id = Some(de.read_string(member)?);
            }
            Ok(())
        })?;
        Ok(output)
    }
}

/// Frames messages the way a service writes an event stream body.
pub fn framed(messages: &[EventMessage]) -> Bytes {
    let mut body = Vec::new();
    for message in messages {
        body.extend_from_slice(&EventFramer.encode(message).expect("frame fits"));
    }
    Bytes::from(body)
}

// =============================================================================
// Transport double
// =============================================================================

/// A request as the transport saw it, with its body read to the end.
#[derive(Debug, Clone)]
pub struct Sent {
    pub request: HttpRequest,
    pub body: Bytes,
}

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<Result<HttpResponse, TransportError>>,
    sent: Vec<Sent>,
}

/// Replays scripted responses in order and records every request.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: HttpResponse) -> Self {
        self.push(Ok(response));
        self
    }

    pub fn fail(self, error: TransportError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, response: Result<HttpResponse, TransportError>) {
        self.state
            .lock()
            .expect("transport lock")
            .responses
            .push_back(response);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().expect("transport lock").sent.clone()
    }
}

impl ClientTransport<HttpRequest, HttpResponse> for ScriptedTransport {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let body = request
                .body
                .collect()
                .await
                .map_err(|error| TransportError::new("request body failed").with_source(error))?;
            let mut state = self.state.lock().expect("transport lock");
            state.sent.push(Sent { request, body });
            state
                .responses
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::new("no scripted response left")))
        })
    }
}

pub fn json_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse::new(status)
        .with_header("content-type", "application/json")
        .with_body(body.to_owned())
}

// =============================================================================
// Interceptors
// =============================================================================

/// Records the name of every read hook that runs.
#[derive(Clone, Default)]
pub struct HookRecorder {
    hooks: Arc<Mutex<Vec<&'static str>>>,
}

impl HookRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hooks(&self) -> Vec<&'static str> {
        self.hooks.lock().expect("recorder lock").clone()
    }

    fn record(&self, hook: &'static str) -> Result<(), BoxError> {
        self.hooks.lock().expect("recorder lock").push(hook);
        Ok(())
    }
}

impl Interceptor<HttpRequest, HttpResponse> for HookRecorder {
    fn read_before_execution(&self, _: &InputContext) -> Result<(), BoxError> {
        self.record("read_before_execution")
    }

    fn read_before_serialization(&self, _: &InputContext) -> Result<(), BoxError> {
        self.record("read_before_serialization")
    }

    fn read_after_serialization(&self, _: &RequestContext<HttpRequest>) -> Result<(), BoxError> {
        self.record("read_after_serialization")
    }

    fn read_before_attempt(&self, _: &RequestContext<HttpRequest>) -> Result<(), BoxError> {
        self.record("read_before_attempt")
    }

    fn read_before_signing(&self, _: &RequestContext<HttpRequest>) -> Result<(), BoxError> {
        self.record("read_before_signing")
    }

    fn read_after_signing(&self, _: &RequestContext<HttpRequest>) -> Result<(), BoxError> {
        self.record("read_after_signing")
    }

    fn read_before_transmit(&self, _: &RequestContext<HttpRequest>) -> Result<(), BoxError> {
        self.record("read_before_transmit")
    }

    fn read_after_transmit(
        &self,
        _: &ResponseContext<HttpRequest, HttpResponse>,
    ) -> Result<(), BoxError> {
        self.record("read_after_transmit")
    }

    fn read_before_deserialization(
        &self,
        _: &ResponseContext<HttpRequest, HttpResponse>,
    ) -> Result<(), BoxError> {
        self.record("read_before_deserialization")
    }

    fn read_after_deserialization(
        &self,
        _: &OutputContext<HttpRequest, HttpResponse>,
    ) -> Result<(), BoxError> {
        self.record("read_after_deserialization")
    }

    fn read_after_attempt(
        &self,
        _: &OutputContext<HttpRequest, HttpResponse>,
    ) -> Result<(), BoxError> {
        self.record("read_after_attempt")
    }

    fn read_after_execution(
        &self,
        _: &OutputContext<HttpRequest, HttpResponse>,
    ) -> Result<(), BoxError> {
        self.record("read_after_execution")
    }
}
