use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::attributes::normalize_attributes;
use crate::body::normalize_body;
use crate::error::NormalizeError;
use crate::headers::{RawHeaders, find_header, header_line, normalize_headers, parse_content_type};
use crate::server_params::filter_server_params;
use crate::view::{RequestView, ResponseView};

/// Structured, JSON-ready snapshot of one message.
pub type NormalizedRecord = Map<String, Value>;

/// Accessor-shaped names that are redundant with data already in a record.
/// No [`Field`] renders under any of them; debug builds assert it in
/// [`Field::key`].
pub const IGNORED_FIELDS: [&str; 11] = [
    "get",
    "post",
    "put",
    "patch",
    "delete",
    "head",
    "options",
    "contentType",
    "mediaType",
    "mediaTypeParams",
    "params",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Request method. Example: POST
    Method,
    /// Origin-form target. Example: /search?q=actix
    RequestTarget,
    /// Absolute URI. Example: http://localhost:8080/search?q=actix
    Uri,
    /// Protocol version without prefix. Example: 1.1
    ProtocolVersion,
    /// Headers. Canonicalized on requests, raw on responses.
    Headers,
    /// Allow-listed server environment.
    ServerParams,
    /// Cookies sent with the request.
    CookieParams,
    /// Decoded query string.
    QueryParams,
    /// Body decoded by the framework, `null` when there is none.
    ParsedBody,
    /// Request attributes as plain data.
    Attributes,
    /// Size-bounded body. Omitted entirely for empty bodies.
    Body,
    /// Response status code. Example: 404
    StatusCode,
    /// Response reason phrase. Example: Not Found
    ReasonPhrase,
}

impl Field {
    pub fn key(&self) -> &'static str {
        let key = match self {
            Field::Method => "method",
            Field::RequestTarget => "requestTarget",
            Field::Uri => "uri",
            Field::ProtocolVersion => "protocolVersion",
            Field::Headers => "headers",
            Field::ServerParams => "serverParams",
            Field::CookieParams => "cookieParams",
            Field::QueryParams => "queryParams",
            Field::ParsedBody => "parsedBody",
            Field::Attributes => "attributes",
            Field::Body => "body",
            Field::StatusCode => "statusCode",
            Field::ReasonPhrase => "reasonPhrase",
        };
        debug_assert!(!IGNORED_FIELDS.contains(&key));
        key
    }

    fn render_request(&self, req: &mut RequestView) -> Result<Option<Value>, NormalizeError> {
        let value = match self {
            Field::Method => Value::from(req.method.clone()),
            Field::RequestTarget => Value::from(req.request_target.clone()),
            Field::Uri => Value::from(req.uri.clone()),
            Field::ProtocolVersion => Value::from(req.protocol_version.clone()),
            Field::Headers => Value::Object(normalize_headers(&req.headers)),
            Field::ServerParams => Value::Object(filter_server_params(&req.server_params)),
            Field::CookieParams => Value::Object(req.cookie_params.clone()),
            Field::QueryParams => Value::Object(req.query_params.clone()),
            Field::ParsedBody => req.parsed_body.clone().unwrap_or(Value::Null),
            Field::Attributes => Value::Object(normalize_attributes(&req.attributes)),
            Field::Body => {
                let content_type = request_content_type(&req.headers);
                let content_length = request_content_length(&req.headers);
                let body = normalize_body(
                    req.body.as_mut(),
                    content_type.as_deref(),
                    content_length,
                    req.parsed_body.as_ref(),
                )?;
                match body {
                    Some(body) => body.to_value(),
                    None => return Ok(None),
                }
            }
            Field::StatusCode | Field::ReasonPhrase => return Ok(None),
        };
        Ok(Some(value))
    }

    fn render_response(&self, res: &mut ResponseView) -> Result<Option<Value>, NormalizeError> {
        let value = match self {
            Field::StatusCode => Value::from(res.status_code),
            Field::ReasonPhrase => Value::from(res.reason_phrase.clone()),
            Field::ProtocolVersion => Value::from(res.protocol_version.clone()),
            Field::Headers => raw_header_map(&res.headers),
            Field::Body => {
                let content_type = find_header(&res.headers, "content-type")
                    .and_then(|values| values.first())
                    .cloned();
                let content_length = res.body_size()?;
                let body = normalize_body(
                    res.body.as_mut(),
                    content_type.as_deref(),
                    content_length,
                    None,
                )?;
                match body {
                    Some(body) => body.to_value(),
                    None => return Ok(None),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }
}

/// Media type of a request: first element of the split `Content-Type`.
fn request_content_type(headers: &RawHeaders) -> Option<String> {
    find_header(headers, "content-type")
        .map(|values| parse_content_type(&header_line(values)))
        .and_then(|parts| parts.into_iter().next())
}

/// Declared request body length.
///
/// Any numeric form with an integral, non-negative value counts (`5`, `5.0`,
/// `1e3`). Absent, fractional, negative or non-numeric values count as zero.
pub(crate) fn request_content_length(headers: &RawHeaders) -> u64 {
    find_header(headers, "content-length")
        .and_then(|values| parse_length(header_line(values).trim()))
        .unwrap_or(0)
}

fn parse_length(value: &str) -> Option<u64> {
    if let Ok(length) = value.parse::<u64>() {
        return Some(length);
    }
    let length = value.parse::<f64>().ok()?;
    if length.is_finite() && length >= 0.0 && length.fract() == 0.0 && length <= u64::MAX as f64 {
        Some(length as u64)
    } else {
        None
    }
}

fn raw_header_map(headers: &RawHeaders) -> Value {
    Value::Object(
        headers
            .iter()
            .map(|(name, values)| (name.clone(), Value::from(values.clone())))
            .collect(),
    )
}

/// Set of fields a record is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fields(HashSet<Field>);

impl Fields {
    pub fn builder() -> FieldsBuilder {
        FieldsBuilder::new()
    }

    pub fn new(fields: HashSet<Field>) -> Self {
        Fields(fields)
    }

    /// Every request field.
    pub fn request() -> Self {
        FieldsBuilder::new()
            .with_method()
            .with_request_target()
            .with_uri()
            .with_protocol_version()
            .with_headers()
            .with_server_params()
            .with_cookie_params()
            .with_query_params()
            .with_parsed_body()
            .with_attributes()
            .with_body()
            .build()
    }

    /// Every response field.
    pub fn response() -> Self {
        FieldsBuilder::new()
            .with_status_code()
            .with_reason_phrase()
            .with_protocol_version()
            .with_headers()
            .with_body()
            .build()
    }

    pub fn contains(&self, field: &Field) -> bool {
        self.0.contains(field)
    }

    /// Build a request record from the selected fields.
    ///
    /// Rendering the body rewinds and reads the body stream.
    pub fn normalize_request(&self, req: &mut RequestView) -> Result<NormalizedRecord, NormalizeError> {
        let mut record = Map::new();
        for field in &self.0 {
            if let Some(value) = field.render_request(req)? {
                record.insert(field.key().to_string(), value);
            }
        }
        Ok(record)
    }

    /// Build a response record from the selected fields.
    pub fn normalize_response(&self, res: &mut ResponseView) -> Result<NormalizedRecord, NormalizeError> {
        let mut record = Map::new();
        for field in &self.0 {
            if let Some(value) = field.render_response(res)? {
                record.insert(field.key().to_string(), value);
            }
        }
        Ok(record)
    }
}

pub struct FieldsBuilder {
    fields: HashSet<Field>,
}

impl FieldsBuilder {
    pub fn new() -> Self {
        FieldsBuilder {
            fields: HashSet::new(),
        }
    }

    pub fn build(self) -> Fields {
        Fields(self.fields)
    }

    pub fn with_method(mut self) -> Self {
        self.fields.insert(Field::Method);
        self
    }

    pub fn with_request_target(mut self) -> Self {
        self.fields.insert(Field::RequestTarget);
        self
    }

    pub fn with_uri(mut self) -> Self {
        self.fields.insert(Field::Uri);
        self
    }

    pub fn with_protocol_version(mut self) -> Self {
        self.fields.insert(Field::ProtocolVersion);
        self
    }

    pub fn with_headers(mut self) -> Self {
        self.fields.insert(Field::Headers);
        self
    }

    pub fn with_server_params(mut self) -> Self {
        self.fields.insert(Field::ServerParams);
        self
    }

    pub fn with_cookie_params(mut self) -> Self {
        self.fields.insert(Field::CookieParams);
        self
    }

    pub fn with_query_params(mut self) -> Self {
        self.fields.insert(Field::QueryParams);
        self
    }

    pub fn with_parsed_body(mut self) -> Self {
        self.fields.insert(Field::ParsedBody);
        self
    }

    pub fn with_attributes(mut self) -> Self {
        self.fields.insert(Field::Attributes);
        self
    }

    pub fn with_body(mut self) -> Self {
        self.fields.insert(Field::Body);
        self
    }

    pub fn with_status_code(mut self) -> Self {
        self.fields.insert(Field::StatusCode);
        self
    }

    pub fn with_reason_phrase(mut self) -> Self {
        self.fields.insert(Field::ReasonPhrase);
        self
    }
}

impl Default for FieldsBuilder {
    fn default() -> Self {
        FieldsBuilder::new()
    }
}

/// Normalize an inbound request with every request field.
pub fn normalize_request(req: &mut RequestView) -> Result<NormalizedRecord, NormalizeError> {
    Fields::request().normalize_request(req)
}

/// Normalize an outbound response with every response field.
pub fn normalize_response(res: &mut ResponseView) -> Result<NormalizedRecord, NormalizeError> {
    Fields::response().normalize_response(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeObject, AttributeValue, CityRecord, RequestAttributes};
    use crate::body::MAX_BODY_SIZE;
    use serde_json::json;
    use std::io::{Cursor, Seek, SeekFrom};

    #[derive(Debug)]
    struct City;

    impl CityRecord for City {
        fn to_serializable(&self) -> Map<String, Value> {
            json!({ "city": "Odesa" }).as_object().cloned().unwrap()
        }
    }

    impl AttributeObject for City {
        fn to_value(&self) -> Value {
            Value::Null
        }

        fn as_city_record(&self) -> Option<&dyn CityRecord> {
            Some(self)
        }
    }

    fn form_request() -> RequestView {
        let server_params = json!({
            "USER": "www-data",
            "SECRET_KEY": "hunter2",
            "SERVER_PORT": "443",
        });

        RequestView::new("POST", "https://example.com/login")
            .with_header("HTTP_CONTENT_TYPE", "application/x-www-form-urlencoded; charset=utf-8")
            .with_header("Content-Length", "11")
            .with_header("X_FORWARDED_FOR", "10.0.0.1")
            .with_body(Cursor::new(b"user=alice&".to_vec()))
            .with_parsed_body(json!({ "user": "alice" }))
            .with_server_params(server_params.as_object().cloned().unwrap())
            .with_attributes(
                RequestAttributes::new()
                    .with("geoIpRecord", AttributeValue::object(City))
                    .with("route", json!("login")),
            )
    }

    #[test]
    fn test_normalize_request() {
        let mut req = form_request();
        let record = normalize_request(&mut req).unwrap();

        assert_eq!(record["method"], json!("POST"));
        assert_eq!(record["uri"], json!("https://example.com/login"));
        assert_eq!(record["protocolVersion"], json!("1.1"));
        assert_eq!(
            record["headers"],
            json!({
                "Content-Type": ["application/x-www-form-urlencoded", "charset=utf-8"],
                "Content-Length": ["11"],
                "X-Forwarded-For": ["10.0.0.1"],
            })
        );
        assert_eq!(record["serverParams"], json!({ "USER": "www-data", "SERVER_PORT": "443" }));
        assert_eq!(record["attributes"], json!({ "geoIpRecord": { "city": "Odesa" }, "route": "login" }));
        assert_eq!(record["parsedBody"], json!({ "user": "alice" }));
        assert_eq!(
            record["body"],
            json!({
                "contentLength": 11,
                "contentType": "application/x-www-form-urlencoded",
                "parsed": { "user": "alice" },
                "raw": "user=alice&",
            })
        );
        for ignored in IGNORED_FIELDS {
            assert!(!record.contains_key(ignored));
        }
    }

    #[test]
    fn test_normalize_request_is_idempotent() {
        let mut req = form_request();
        let first = normalize_request(&mut req).unwrap();
        req.body.seek(SeekFrom::Start(0)).unwrap();
        let second = normalize_request(&mut req).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_get_request_has_no_body() {
        let mut req = RequestView::new("GET", "/").with_body(Cursor::new(b"junk".to_vec()));
        let record = normalize_request(&mut req).unwrap();

        assert!(!record.contains_key("body"));
        assert_eq!(record["parsedBody"], Value::Null);
        assert_eq!(record["headers"], json!({}));
    }

    #[test]
    fn test_request_content_type_without_param_is_dropped() {
        let mut req = RequestView::new("POST", "/")
            .with_header("Content-Type", "application/json")
            .with_header("Content-Length", "2")
            .with_body(Cursor::new(b"{}".to_vec()));
        let record = normalize_request(&mut req).unwrap();

        assert_eq!(record["body"], json!({ "contentLength": 2, "raw": "{}" }));
    }

    #[test]
    fn test_non_numeric_content_length_means_no_body() {
        let mut req = RequestView::new("POST", "/")
            .with_header("Content-Length", "lots")
            .with_body(Cursor::new(b"data".to_vec()));
        let record = normalize_request(&mut req).unwrap();

        assert!(!record.contains_key("body"));
    }

    #[test]
    fn test_duplicate_content_headers_resolve_like_header_map() {
        let mut req = RequestView::new("POST", "/")
            .with_header("Content-Type", "text/plain; charset=a")
            .with_header("Content-Length", "9")
            .with_header("HTTP_CONTENT_TYPE", "application/json; charset=b")
            .with_header("HTTP_CONTENT_LENGTH", "2")
            .with_body(Cursor::new(b"{}".to_vec()));
        let record = normalize_request(&mut req).unwrap();

        assert_eq!(record["headers"]["Content-Type"], json!(["application/json", "charset=b"]));
        assert_eq!(record["headers"]["Content-Length"], json!(["2"]));
        assert_eq!(
            record["body"],
            json!({ "contentLength": 2, "contentType": "application/json", "raw": "{}" })
        );
    }

    #[test]
    fn test_integral_numeric_content_length() {
        let mut req = RequestView::new("POST", "/")
            .with_header("Content-Length", "5.0")
            .with_body(Cursor::new(b"hello".to_vec()));
        let record = normalize_request(&mut req).unwrap();
        assert_eq!(record["body"], json!({ "contentLength": 5, "raw": "hello" }));

        assert_eq!(parse_length("1e3"), Some(1000));
        assert_eq!(parse_length("42"), Some(42));
        assert_eq!(parse_length("5.5"), None);
        assert_eq!(parse_length("-3"), None);
        assert_eq!(parse_length("NaN"), None);
        assert_eq!(parse_length("inf"), None);
    }

    #[test]
    fn test_multipart_request_without_parsed_form() {
        let mut req = RequestView::new("POST", "/upload")
            .with_header("Content-Type", "multipart/form-data; boundary=xyz")
            .with_header("Content-Length", "10")
            .with_body(Cursor::new(b"--xyz--\r\n\r\n".to_vec()));
        let record = normalize_request(&mut req).unwrap();

        assert_eq!(
            record["body"],
            json!({ "contentLength": 10, "contentType": "multipart/form-data" })
        );
    }

    #[test]
    fn test_normalize_response() {
        let mut res = ResponseView::new(201, "Created")
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_header("X-Request-Id", "abc")
            .with_body(Cursor::new(b"{\"id\":1}".to_vec()));
        let record = normalize_response(&mut res).unwrap();

        assert_eq!(record["statusCode"], json!(201));
        assert_eq!(record["reasonPhrase"], json!("Created"));
        assert_eq!(
            record["headers"],
            json!({
                "Content-Type": ["application/json; charset=utf-8"],
                "X-Request-Id": ["abc"],
            })
        );
        assert_eq!(
            record["body"],
            json!({
                "contentLength": 8,
                "contentType": "application/json; charset=utf-8",
                "raw": "{\"id\":1}",
            })
        );
        assert!(!record.contains_key("method"));
        assert!(!record.contains_key("serverParams"));
    }

    #[test]
    fn test_empty_response_has_no_body() {
        let mut res = ResponseView::new(204, "No Content");
        let record = normalize_response(&mut res).unwrap();

        assert!(!record.contains_key("body"));
        assert_eq!(record.len(), 4);
    }

    #[test]
    fn test_oversize_response_uses_reported_size() {
        let mut res = ResponseView::new(200, "OK")
            .with_body(Cursor::new(vec![b'a'; 16]))
            .with_body_size(5_000_000);
        let record = normalize_response(&mut res).unwrap();

        assert_eq!(record["body"]["contentLength"], json!(5_000_000));
        assert!(record["body"].get("notice").is_some());
        assert!(record["body"].get("raw").is_none());
    }

    #[test]
    fn test_oversize_response_measured_from_stream() {
        let mut res = ResponseView::new(200, "OK")
            .with_header("Content-Type", "application/octet-stream")
            .with_body(Cursor::new(vec![b'z'; MAX_BODY_SIZE as usize + 1]));
        let record = normalize_response(&mut res).unwrap();

        assert_eq!(record["body"]["contentLength"], json!(MAX_BODY_SIZE + 1));
        assert_eq!(record["body"]["contentType"], json!("application/octet-stream"));
        assert!(record["body"]["notice"].is_string());
        assert!(record["body"].get("raw").is_none());
        assert!(record["body"].get("parsed").is_none());
    }

    #[test]
    fn test_custom_fields() {
        let fields = Fields::builder().with_method().with_body().build();
        assert!(fields.contains(&Field::Method));
        assert!(!fields.contains(&Field::Headers));

        let mut req = form_request();
        let record = fields.normalize_request(&mut req).unwrap();
        assert_eq!(record.len(), 2);
        assert!(record.contains_key("method"));
        assert!(record.contains_key("body"));

        // request-only fields are skipped on responses
        let mut res = ResponseView::new(200, "OK");
        let record = fields.normalize_response(&mut res).unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn test_field_keys_avoid_ignored_names() {
        for field in Fields::request().0.iter().chain(Fields::response().0.iter()) {
            assert!(!IGNORED_FIELDS.contains(&field.key()));
        }
    }
}
