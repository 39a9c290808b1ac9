//! Request and response views handed to the normalizer.
//!
//! A view is a detached snapshot of an HTTP message: everything is owned
//! except the body stream, which is read lazily and only when the body
//! normalizer decides it may be.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use actix_http::Version;
use actix_web::HttpMessage;
use actix_web::dev::ServiceRequest;
use actix_web::http::header::HeaderMap;
use serde_json::{Map, Value};

use crate::attributes::RequestAttributes;
use crate::headers::RawHeaders;

/// Readable, seekable message body.
pub trait BodyStream: Read + Seek {}

impl<T: Read + Seek> BodyStream for T {}

/// Seek to the start and read everything.
///
/// Moves the read position of `stream` to its end; callers must not rely on
/// the position afterwards.
pub(crate) fn rewind_and_read(stream: &mut dyn BodyStream) -> io::Result<Vec<u8>> {
    stream.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(buf)
}

pub(crate) fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Version number without the `HTTP/` prefix, e.g. `1.1`.
pub(crate) fn protocol_version(version: Version) -> &'static str {
    let name = protocol_name(version);
    name.strip_prefix("HTTP/").unwrap_or(name)
}

pub(crate) fn raw_headers(headers: &HeaderMap) -> RawHeaders {
    let mut raw: RawHeaders = Vec::new();
    for (name, value) in headers {
        let value = value.to_str().unwrap_or_default().to_string();
        match raw.iter_mut().find(|(key, _)| key == name.as_str()) {
            Some((_, values)) => values.push(value),
            None => raw.push((name.as_str().to_string(), vec![value])),
        }
    }
    raw
}

/// Inbound request as seen by the normalizer.
pub struct RequestView {
    pub method: String,
    pub request_target: String,
    pub uri: String,
    pub protocol_version: String,
    pub headers: RawHeaders,
    pub server_params: Map<String, Value>,
    pub cookie_params: Map<String, Value>,
    pub query_params: Map<String, Value>,
    pub attributes: RequestAttributes,
    /// Body already decoded by the framework, e.g. form fields.
    pub parsed_body: Option<Value>,
    pub body: Box<dyn BodyStream>,
}

impl RequestView {
    /// Request with no headers, parameters or attributes and an empty body.
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        RequestView {
            method: method.into(),
            request_target: uri.clone(),
            uri,
            protocol_version: "1.1".to_string(),
            headers: Vec::new(),
            server_params: Map::new(),
            cookie_params: Map::new(),
            query_params: Map::new(),
            attributes: RequestAttributes::new(),
            parsed_body: None,
            body: Box::new(Cursor::new(Vec::new())),
        }
    }

    /// Append a header value, keeping the first-seen order of names.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(key, _)| *key == name) {
            Some((_, values)) => values.push(value),
            None => self.headers.push((name, vec![value])),
        }
        self
    }

    pub fn with_body(mut self, body: impl BodyStream + 'static) -> Self {
        self.body = Box::new(body);
        self
    }

    pub fn with_parsed_body(mut self, parsed: Value) -> Self {
        self.parsed_body = Some(parsed);
        self
    }

    pub fn with_server_params(mut self, params: Map<String, Value>) -> Self {
        self.server_params = params;
        self
    }

    pub fn with_attributes(mut self, attributes: RequestAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Snapshot an actix request. `body` holds whatever payload was buffered.
    pub fn from_service_request(
        req: &ServiceRequest,
        server_params: Map<String, Value>,
        body: impl BodyStream + 'static,
    ) -> Self {
        let query_params = url::form_urlencoded::parse(req.query_string().as_bytes())
            .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
            .collect();

        let cookie_params = req
            .cookies()
            .map(|cookies| {
                cookies
                    .iter()
                    .map(|c| (c.name().to_string(), Value::String(c.value().to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let attributes = req
            .extensions()
            .get::<RequestAttributes>()
            .cloned()
            .unwrap_or_default();

        let request_target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        RequestView {
            method: req.method().to_string(),
            request_target,
            uri: req.request().full_url().to_string(),
            protocol_version: protocol_version(req.version()).to_string(),
            headers: raw_headers(req.headers()),
            server_params,
            cookie_params,
            query_params,
            attributes,
            parsed_body: None,
            body: Box::new(body),
        }
    }
}

/// Outbound response as seen by the normalizer.
pub struct ResponseView {
    pub status_code: u16,
    pub reason_phrase: String,
    pub protocol_version: String,
    pub headers: RawHeaders,
    pub body: Box<dyn BodyStream>,
    body_size: Option<u64>,
}

impl ResponseView {
    pub fn new(status_code: u16, reason_phrase: impl Into<String>) -> Self {
        ResponseView {
            status_code,
            reason_phrase: reason_phrase.into(),
            protocol_version: "1.1".to_string(),
            headers: Vec::new(),
            body: Box::new(Cursor::new(Vec::new())),
            body_size: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(key, _)| *key == name) {
            Some((_, values)) => values.push(value),
            None => self.headers.push((name, vec![value])),
        }
        self
    }

    pub fn with_body(mut self, body: impl BodyStream + 'static) -> Self {
        self.body = Box::new(body);
        self
    }

    /// Report `size` as the body length instead of measuring the stream.
    ///
    /// Used when the stream holds only a bounded prefix of what was sent.
    pub fn with_body_size(mut self, size: u64) -> Self {
        self.body_size = Some(size);
        self
    }

    /// Byte size of the body. Measuring the stream moves it to its end.
    pub fn body_size(&mut self) -> io::Result<u64> {
        match self.body_size {
            Some(size) => Ok(size),
            None => self.body.seek(SeekFrom::End(0)),
        }
    }
}
