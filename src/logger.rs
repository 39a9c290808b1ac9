use std::{
    borrow::Cow,
    collections::HashSet,
    future::{Future, poll_fn},
    io::Cursor,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures_core::{Stream, ready};
use pin_project_lite::pin_project;
use regex::Regex;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use actix_http::error::PayloadError;
use actix_service::{Service, Transform};
use actix_utils::future::{Ready, ready};
use actix_web::HttpMessage;
use actix_web::body::{BodySize, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::{Error, Result};

use crate::body::MAX_BODY_SIZE;
use crate::headers::RawHeaders;
use crate::record::{Fields, NormalizedRecord};
use crate::server_params::collect_server_params;
use crate::view::{RequestView, ResponseView, protocol_version, raw_headers};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Middleware that logs a normalized record of every request and response.
///
/// Request bodies up to [`MAX_BODY_SIZE`] are buffered and handed back to the
/// handler unchanged. Response bodies are streamed through untouched while a
/// bounded copy is kept for the record. The record is emitted once the
/// response body is dropped.
///
/// # Examples
/// ```rust
/// use actix_web::App;
/// use actix_web_middleware_normalizer::MessageLogger;
///
/// let app = App::new()
///     .wrap(MessageLogger::default());
/// ```
pub struct MessageLogger(Rc<Inner>);

#[derive(Debug, Clone)]
struct Inner {
    request_fields: Fields,
    response_fields: Fields,
    exclude: HashSet<String>,
    exclude_regex: Vec<Regex>,
    log_target: Cow<'static, str>,
    parse_forms: bool,
}

impl MessageLogger {
    /// Create `MessageLogger` middleware with the specified record fields.
    pub fn new(request_fields: Fields, response_fields: Fields) -> MessageLogger {
        MessageLogger(Rc::new(Inner {
            request_fields,
            response_fields,
            exclude: HashSet::new(),
            exclude_regex: Vec::new(),
            log_target: Cow::Borrowed(module_path!()),
            parse_forms: true,
        }))
    }

    /// Ignore and do not log specified path.
    pub fn exclude<T: Into<String>>(mut self, path: T) -> Self {
        Rc::get_mut(&mut self.0)
            .unwrap()
            .exclude
            .insert(path.into());
        self
    }

    /// Ignore and do not log paths that match regex.
    pub fn exclude_regex<T: Into<String>>(mut self, path: T) -> Self {
        let inner = Rc::get_mut(&mut self.0).unwrap();
        inner.exclude_regex.push(Regex::new(&path.into()).unwrap());
        self
    }

    /// Sets the logging target to `target`.
    ///
    /// By default, the log target is `actix_web_middleware_normalizer::logger`.
    pub fn log_target(mut self, target: impl Into<Cow<'static, str>>) -> Self {
        let inner = Rc::get_mut(&mut self.0).unwrap();
        inner.log_target = target.into();
        self
    }

    /// Decode `application/x-www-form-urlencoded` request bodies into the
    /// parsed body. Enabled by default.
    pub fn parse_forms(mut self, enabled: bool) -> Self {
        let inner = Rc::get_mut(&mut self.0).unwrap();
        inner.parse_forms = enabled;
        self
    }
}

impl Default for MessageLogger {
    /// Create `MessageLogger` middleware logging every request and response
    /// field.
    fn default() -> Self {
        MessageLogger::new(Fields::request(), Fields::response())
    }
}

impl<S, B> Transform<S, ServiceRequest> for MessageLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<StreamLog<B>>;
    type Error = Error;
    type Transform = MessageLoggerMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MessageLoggerMiddlewareService {
            service: Rc::new(service),
            inner: Rc::clone(&self.0),
        }))
    }
}

/// Status line and headers of a response, taken before its body streams.
struct ResponseHead {
    status_code: u16,
    reason_phrase: &'static str,
    protocol_version: &'static str,
    headers: RawHeaders,
}

/// Everything needed to emit the record once the response body is done.
struct Capture {
    inner: Rc<Inner>,
    request: Option<NormalizedRecord>,
    response: ResponseHead,
}

impl Capture {
    fn finish(self, size: u64, buffer: Bytes) {
        let mut view = ResponseView::new(self.response.status_code, self.response.reason_phrase)
            .with_body(Cursor::new(buffer))
            .with_body_size(size);
        view.protocol_version = self.response.protocol_version.to_string();
        view.headers = self.response.headers;

        let response = match self.inner.response_fields.normalize_response(&mut view) {
            Ok(record) => Some(record),
            Err(err) => {
                #[cfg(feature = "log")]
                log::warn!("Failed to normalize response: {}", err);
                None
            }
        };

        #[cfg(feature = "log")]
        crate::wrapper::rust_log::log(
            log::Level::Info,
            self.inner.log_target.as_ref(),
            module_path!(),
            std::panic::Location::caller(),
            vec![("request", self.request), ("response", response)],
        );
    }
}

pin_project! {
    pub struct StreamLog<B> {
        #[pin]
        body: B,
        capture: Option<Capture>,
        size: u64,
        buffer: BytesMut,
    }

    impl<B> PinnedDrop for StreamLog<B> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(capture) = this.capture.take() {
                let buffer = std::mem::take(this.buffer).freeze();
                capture.finish(*this.size, buffer);
            }
        }
    }
}

impl<B: MessageBody> MessageBody for StreamLog<B> {
    type Error = B::Error;

    #[inline]
    fn size(&self) -> BodySize {
        self.body.size()
    }

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Bytes, Self::Error>>> {
        let this = self.project();

        match ready!(this.body.poll_next(cx)) {
            Some(Ok(chunk)) => {
                *this.size += chunk.len() as u64;
                if this.capture.is_some() {
                    let room = (MAX_BODY_SIZE as usize).saturating_sub(this.buffer.len());
                    let keep = room.min(chunk.len());
                    this.buffer.extend_from_slice(&chunk[..keep]);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(err)) => Poll::Ready(Some(Err(err))),
            None => Poll::Ready(None),
        }
    }
}

/// Logger middleware service.
pub struct MessageLoggerMiddlewareService<S> {
    inner: Rc<Inner>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MessageLoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<StreamLog<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    actix_service::forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let excluded = self.inner.exclude.contains(req.path())
            || self
                .inner
                .exclude_regex
                .iter()
                .any(|r| r.is_match(req.path()));

        let service = Rc::clone(&self.service);
        let inner = Rc::clone(&self.inner);

        Box::pin(async move {
            if excluded {
                let res = service.call(req).await?;
                return Ok(res.map_body(|_, body| StreamLog {
                    body,
                    capture: None,
                    size: 0,
                    buffer: BytesMut::new(),
                }));
            }

            let request = capture_request(&inner, &mut req, OffsetDateTime::now_utc()).await;

            let res = service.call(req).await?;

            if let Some(error) = res.response().error() {
                #[cfg(feature = "log")]
                log::debug!("Error in response: {:?}", error);
            }

            let response = ResponseHead {
                status_code: res.status().as_u16(),
                reason_phrase: res.status().canonical_reason().unwrap_or_default(),
                protocol_version: protocol_version(res.response().head().version),
                headers: raw_headers(res.headers()),
            };

            let capture = Capture {
                inner,
                request,
                response,
            };

            Ok(res.map_body(move |_, body| StreamLog {
                body,
                capture: Some(capture),
                size: 0,
                buffer: BytesMut::new(),
            }))
        })
    }
}

/// Snapshot and normalize the request, buffering its payload when it is
/// small enough to be logged.
async fn capture_request(
    inner: &Inner,
    req: &mut ServiceRequest,
    now: OffsetDateTime,
) -> Option<NormalizedRecord> {
    let server_params = collect_server_params(req, now);
    let mut view = RequestView::from_service_request(req, server_params, Cursor::new(Bytes::new()));

    let content_length = crate::record::request_content_length(&view.headers);
    if (1..=MAX_BODY_SIZE).contains(&content_length) {
        let body = match buffer_payload(req).await {
            Ok(body) => body,
            Err((body, err)) => {
                #[cfg(feature = "log")]
                log::warn!("Failed to buffer request payload: {}", err);
                body
            }
        };

        if inner.parse_forms && req.content_type() == FORM_URLENCODED {
            view.parsed_body = Some(parse_form(&body));
        }
        view.body = Box::new(Cursor::new(body));
    }

    match inner.request_fields.normalize_request(&mut view) {
        Ok(record) => Some(record),
        Err(err) => {
            #[cfg(feature = "log")]
            log::warn!("Failed to normalize request: {}", err);
            None
        }
    }
}

/// Read the whole payload and put the bytes back for the handler.
///
/// On a payload error the bytes received so far are re-injected and returned
/// alongside the error.
async fn buffer_payload(req: &mut ServiceRequest) -> Result<Bytes, (Bytes, PayloadError)> {
    let payload = req.take_payload();
    let mut payload = std::pin::pin!(payload);
    let mut buf = BytesMut::new();
    let mut failure = None;

    while let Some(chunk) = poll_fn(|cx| payload.as_mut().poll_next(cx)).await {
        match chunk {
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    let body = buf.freeze();
    req.set_payload(actix_http::Payload::from(body.clone()));

    match failure {
        Some(err) => Err((body, err)),
        None => Ok(body),
    }
}

fn parse_form(body: &[u8]) -> Value {
    let fields: Map<String, Value> = url::form_urlencoded::parse(body)
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect();
    Value::Object(fields)
}
