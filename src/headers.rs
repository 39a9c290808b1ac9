use serde_json::{Map, Value};

/// Ordered header list as exposed by a message view: name followed by every
/// value received for it.
pub type RawHeaders = Vec<(String, Vec<String>)>;

const HTTP_PREFIX: &str = "http-";
const CONTENT_TYPE: &str = "content-type";

/// Split a `Content-Type` value of the form `"<media-type>; <param>"` into
/// `[media-type, param]`.
///
/// Anything else (no parameter, several parameters, a different separator)
/// yields an empty list. The information is dropped, not reported.
pub fn parse_content_type(value: &str) -> Vec<String> {
    let parts: Vec<&str> = value.split("; ").collect();
    if parts.len() == 2 {
        parts.into_iter().map(str::to_string).collect()
    } else {
        Vec::new()
    }
}

/// Canonical lower-case form of a header name: underscores become hyphens and
/// a leading `http-` (left over from CGI-style `HTTP_*` naming) is stripped.
pub(crate) fn canonical_name(name: &str) -> String {
    let name = name.to_lowercase().replace('_', "-");
    match name.strip_prefix(HTTP_PREFIX) {
        Some(stripped) => stripped.to_string(),
        None => name,
    }
}

/// Upper-case the first letter of every hyphen-separated word.
pub(crate) fn title_case(name: &str) -> String {
    name.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

/// Header values joined the way a single header line is rendered.
pub(crate) fn header_line(values: &[String]) -> String {
    values.join(", ")
}

/// Canonicalize header names and special-case `Content-Type`.
///
/// When two raw names collapse to the same canonical key the later entry
/// overwrites the earlier one.
pub fn normalize_headers(headers: &[(String, Vec<String>)]) -> Map<String, Value> {
    let mut normalized = Map::new();

    for (name, values) in headers {
        let name = canonical_name(name);

        let value = if name == CONTENT_TYPE {
            Value::from(parse_content_type(&header_line(values)))
        } else {
            Value::from(values.clone())
        };

        normalized.insert(title_case(&name), value);
    }

    normalized
}

/// Values of the header whose canonical name is `name` (lower-case).
///
/// Resolves duplicates like [`normalize_headers`]: the last matching entry wins.
pub(crate) fn find_header<'a>(
    headers: &'a [(String, Vec<String>)],
    name: &str,
) -> Option<&'a [String]> {
    headers
        .iter()
        .rfind(|(key, _)| canonical_name(key) == name)
        .map(|(_, values)| values.as_slice())
}
