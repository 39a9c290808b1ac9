//! Size-bounded, privacy-filtered structured records of HTTP messages.
//!
//! The crate turns a request or response into a JSON-ready mapping that can be
//! shipped to a log sink without leaking oversized payloads, internal server
//! environment or redundant body encodings.
//!
//! # Examples:
//! ## Normalizing a message directly
//! ```rust
//! use std::io::Cursor;
//! use actix_web_middleware_normalizer::{RequestView, normalize_request};
//!
//! let mut request = RequestView::new("POST", "https://example.com/items")
//!     .with_header("HTTP_CONTENT_TYPE", "application/json; charset=utf-8")
//!     .with_header("Content-Length", "9")
//!     .with_body(Cursor::new(b"{\"id\":1}\n".to_vec()));
//!
//! let record = normalize_request(&mut request).unwrap();
//! assert_eq!(record["body"]["raw"], "{\"id\":1}\n");
//! assert_eq!(record["headers"]["Content-Type"][0], "application/json");
//! ```
//! ## Logging every exchange of an actix-web app
//! By default the middleware uses the standard `log` crate for output.
//! ```rust,no_run
//! use actix_web::{web, App, HttpServer};
//! use actix_web_middleware_normalizer::MessageLogger;
//! use structured_logger::{Builder, async_json::new_writer};
//!
//! #[actix_web::main] // or #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     Builder::new()
//!         .with_target_writer("*", new_writer(tokio::io::stdout()))
//!         .init();
//!
//!     HttpServer::new(|| {
//!         App::new()
//!             .wrap(MessageLogger::default().exclude("/health"))
//!             .route("/", web::get().to(|| async { "Hello world!" }))
//!     })
//!     .bind("127.0.0.1:8080")?;
//!     Ok(())
//! }
//! ```
//!
//! # Normalization rules
//!
//! - Header names are lower-cased, `_` becomes `-`, a leading `http-` is
//!   dropped and the result is title-cased (`HTTP_X_FORWARDED_FOR` becomes
//!   `X-Forwarded-For`). `Content-Type` is split into `[media-type, param]`.
//! - Server parameters are reduced to [`SERVER_PARAMS_ALLOW_LIST`].
//! - A `geoIpRecord` attribute implementing [`CityRecord`] is replaced with
//!   its plain-data form.
//! - Bodies over [`MAX_BODY_SIZE`] are replaced with a notice and never read.
//!   Multipart bodies the framework did not parse are reported without
//!   content.
//!
//! # Configuration
//!
//! Choose which fields end up in the records:
//!
//! ```rust
//! use actix_web_middleware_normalizer::{Fields, MessageLogger};
//!
//! let logger = MessageLogger::new(
//!     Fields::builder()
//!         .with_method()
//!         .with_uri()
//!         .with_headers()
//!         .with_body()
//!         .build(),
//!     Fields::builder()
//!         .with_status_code()
//!         .with_body()
//!         .build(),
//! )
//! .exclude_regex(r"^/assets/.*")
//! .log_target("http");
//! ```
//!
//! Request attributes are read from a [`RequestAttributes`] value in the
//! request extensions, typically inserted by an earlier middleware.
//!
//! # Feature Flags
//!
//! - `log` (default) - Emit records through the standard `log` crate

mod attributes;
mod body;
mod error;
mod headers;
mod logger;
mod record;
mod server_params;
mod view;
mod wrapper;

pub use crate::attributes::{
    AttributeObject, AttributeValue, CityRecord, GEO_IP_RECORD, RequestAttributes,
    normalize_attributes,
};
pub use crate::body::{MAX_BODY_SIZE, NormalizedBody, normalize_body};
pub use crate::error::NormalizeError;
pub use crate::headers::{RawHeaders, normalize_headers, parse_content_type};
pub use crate::logger::{MessageLogger, MessageLoggerMiddlewareService, StreamLog};
pub use crate::record::{
    Field, Fields, FieldsBuilder, IGNORED_FIELDS, NormalizedRecord, normalize_request,
    normalize_response,
};
pub use crate::server_params::{SERVER_PARAMS_ALLOW_LIST, collect_server_params, filter_server_params};
pub use crate::view::{BodyStream, RequestView, ResponseView};
#[cfg(feature = "log")]
pub use crate::wrapper::rust_log;
