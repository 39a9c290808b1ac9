use std::env;

use actix_web::dev::ServiceRequest;
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Server parameters that are allowed into a record. Everything else is
/// dropped.
pub const SERVER_PARAMS_ALLOW_LIST: [&str; 13] = [
    "USER",
    "SERVER_NAME",
    "SERVER_PORT",
    "SERVER_ADDR",
    "REMOTE_PORT",
    "FCGI_ROLE",
    "SERVER_SOFTWARE",
    "SERVER_PROTOCOL",
    "GATEWAY_INTERFACE",
    "REMOTE_ADDR",
    "REQUEST_SCHEME",
    "REQUEST_TIME_FLOAT",
    "REQUEST_TIME",
];

const SERVER_SOFTWARE: &str = "actix-web";

/// Keep only the allow-listed server parameters. Values pass through as-is.
pub fn filter_server_params(params: &Map<String, Value>) -> Map<String, Value> {
    params
        .iter()
        .filter(|(key, _)| SERVER_PARAMS_ALLOW_LIST.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Build the CGI-style server environment for an actix request.
///
/// This collects far more than survives [`filter_server_params`]: the whole
/// process environment is included, as a CGI gateway would expose it.
pub fn collect_server_params(req: &ServiceRequest, now: OffsetDateTime) -> Map<String, Value> {
    let mut params: Map<String, Value> = env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, Value::String(value.into_string().ok()?))))
        .collect();

    let info = req.connection_info();
    let (server_name, server_port) = split_host(info.host(), info.scheme());
    params.insert("SERVER_NAME".into(), server_name.into());
    params.insert("SERVER_PORT".into(), server_port.into());
    params.insert("REQUEST_SCHEME".into(), info.scheme().into());
    drop(info);

    let local = req.app_config().local_addr();
    params.insert("SERVER_ADDR".into(), local.ip().to_string().into());

    if let Some(peer) = req.peer_addr() {
        params.insert("REMOTE_ADDR".into(), peer.ip().to_string().into());
        params.insert("REMOTE_PORT".into(), peer.port().to_string().into());
    }

    params.insert(
        "SERVER_PROTOCOL".into(),
        crate::view::protocol_name(req.version()).into(),
    );
    params.insert("SERVER_SOFTWARE".into(), SERVER_SOFTWARE.into());
    params.insert("GATEWAY_INTERFACE".into(), "CGI/1.1".into());
    params.insert("REQUEST_METHOD".into(), req.method().as_str().into());
    params.insert("REQUEST_URI".into(), req.uri().to_string().into());
    params.insert("QUERY_STRING".into(), req.query_string().into());
    params.insert("REQUEST_TIME".into(), now.unix_timestamp().into());
    params.insert(
        "REQUEST_TIME_FLOAT".into(),
        Value::from(now.unix_timestamp_nanos() as f64 / 1_000_000_000.0),
    );

    for (name, value) in req.headers() {
        let key = format!("HTTP_{}", name.as_str().to_uppercase().replace('-', "_"));
        params.insert(key, value.to_str().unwrap_or_default().into());
    }

    params
}

fn split_host<'a>(host: &'a str, scheme: &str) -> (&'a str, String) {
    let default_port = if scheme == "https" { "443" } else { "80" };
    match host.rsplit_once(':') {
        Some((name, _)) if !name.ends_with(']') && name.contains(':') => {
            (host, default_port.to_string())
        }
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            (name, port.to_string())
        }
        _ => (host, default_port.to_string()),
    }
}
