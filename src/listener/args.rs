//! Argument extraction.
//!
//! Builds a single flat parameter mapping from a request's path parameters,
//! headers, body and query string. Later steps overwrite earlier keys, so
//! the precedence is: query > body > headers sub-map > path parameters.

use axum::body::Body;
use axum::extract::{FromRequest, Multipart};
use axum::http::{header::CONTENT_TYPE, HeaderMap, Method, Request};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// The flat argument mapping consumed by plugins and the command template.
pub type Args = Map<String, Value>;

/// Reserved key holding the lower-cased request headers as a sub-map.
pub const KEY_ARGS_HEADERS: &str = "__gwHeaders";

/// Namespace prefix for the full ordered value list of a form field.
pub const KEY_FORM_PREFIX: &str = "_form_";

/// Namespace prefix for the full ordered value list of a query parameter.
pub const KEY_QUERY_PREFIX: &str = "_query_";

/// Error type for argument extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to parse request form body: {0}")]
    FormBody(String),

    #[error("failed to parse multipart body: {0}")]
    MultipartBody(String),

    #[error("failed to parse request body: {0}")]
    JsonBody(#[from] serde_json::Error),

    #[error("request body must be a JSON object")]
    BodyShape,
}

/// Extract the flat argument mapping from one inbound request.
///
/// `path_params` come from the router's pattern matching; `body` is the
/// already-buffered request body (ignored for GET); `query` is the raw
/// query string. Urlencoded and multipart form bodies get the same
/// last-value plus `_form_` list treatment.
pub async fn extract_args(
    path_params: &[(String, String)],
    headers: &HeaderMap,
    method: &Method,
    content_type: Option<&str>,
    body: &[u8],
    query: Option<&str>,
) -> Result<Args, ExtractError> {
    let mut args = Args::new();

    // Route params, if any.
    for (key, value) in path_params {
        args.insert(key.clone(), Value::String(value.clone()));
    }

    // Headers, lower-cased, under the reserved key.
    let mut header_map = Args::new();
    for (name, value) in headers {
        header_map.insert(
            name.as_str().to_lowercase(),
            Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
        );
    }
    args.insert(KEY_ARGS_HEADERS.to_string(), Value::Object(header_map));

    // Body, for non-GET methods only.
    if method != Method::GET && !body.is_empty() {
        if is_form_content_type(content_type) {
            merge_pairs(&mut args, parse_pairs(body), KEY_FORM_PREFIX);
        } else if is_multipart_content_type(content_type) {
            let fields = parse_multipart(content_type.unwrap_or_default(), body).await?;
            merge_pairs(&mut args, fields, KEY_FORM_PREFIX);
        } else {
            let parsed: Value = serde_json::from_slice(body)?;
            match parsed {
                Value::Object(fields) => {
                    for (key, value) in fields {
                        args.insert(key, value);
                    }
                }
                _ => return Err(ExtractError::BodyShape),
            }
        }
    }

    // Always bind query, after the body, so query wins on key collision.
    if let Some(query) = query {
        merge_pairs(&mut args, parse_pairs(query.as_bytes()), KEY_QUERY_PREFIX);
    }

    Ok(args)
}

fn is_form_content_type(content_type: Option<&str>) -> bool {
    mime_type(content_type).eq_ignore_ascii_case("application/x-www-form-urlencoded")
}

fn is_multipart_content_type(content_type: Option<&str>) -> bool {
    mime_type(content_type).eq_ignore_ascii_case("multipart/form-data")
}

fn mime_type(content_type: Option<&str>) -> &str {
    content_type
        .and_then(|ct| ct.split(';').next())
        .unwrap_or("")
        .trim()
}

/// Decode a multipart body into per-field value lists, order preserved.
/// File parts are read as text like any other field.
async fn parse_multipart(
    content_type: &str,
    body: &[u8],
) -> Result<BTreeMap<String, Vec<String>>, ExtractError> {
    let multipart_err = |err: &dyn std::fmt::Display| ExtractError::MultipartBody(err.to_string());

    let request = Request::builder()
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(body.to_vec()))
        .map_err(|err| multipart_err(&err))?;
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|err| multipart_err(&err))?;

    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_err(&err))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field.text().await.map_err(|err| multipart_err(&err))?;
        grouped.entry(name).or_default().push(value);
    }
    Ok(grouped)
}

/// Decode urlencoded pairs, grouped per key with value order preserved.
fn parse_pairs(raw: &[u8]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(raw) {
        grouped
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    grouped
}

/// Assign the last value to the flat key and the full ordered list to the
/// namespaced key.
fn merge_pairs(args: &mut Args, pairs: BTreeMap<String, Vec<String>>, prefix: &str) {
    for (key, values) in pairs {
        match values.last() {
            Some(last) => {
                args.insert(key.clone(), Value::String(last.clone()));
            }
            None => {
                args.insert(key.clone(), Value::Bool(true));
            }
        }
        args.insert(
            format!("{prefix}{key}"),
            Value::Array(values.into_iter().map(Value::String).collect()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{HeaderName, HeaderValue};
    use serde_json::json;

    fn headers_with(name: &str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn query_overrides_body_overrides_path() {
        let path = vec![("name".to_string(), "from-path".to_string())];
        let headers = headers_with("name", "from-header");
        let body = b"name=from-body";

        let args = extract_args(
            &path,
            &headers,
            &Method::POST,
            Some("application/x-www-form-urlencoded"),
            body,
            Some("name=from-query"),
        )
        .await
        .unwrap();

        assert_eq!(args.get("name"), Some(&json!("from-query")));
        // The header value survives under the reserved sub-map.
        assert_eq!(
            args[KEY_ARGS_HEADERS].get("name"),
            Some(&json!("from-header"))
        );
        assert_eq!(args["_form_name"], json!(["from-body"]));
        assert_eq!(args["_query_name"], json!(["from-query"]));
    }

    #[tokio::test]
    async fn repeated_form_field_keeps_last_value_and_full_list() {
        let args = extract_args(
            &[],
            &HeaderMap::new(),
            &Method::POST,
            Some("application/x-www-form-urlencoded"),
            b"k=1&k=2",
            None,
        )
        .await
        .unwrap();

        assert_eq!(args.get("k"), Some(&json!("2")));
        assert_eq!(args.get("_form_k"), Some(&json!(["1", "2"])));
    }

    fn multipart_body(boundary: &str, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        body.into_bytes()
    }

    #[tokio::test]
    async fn multipart_fields_get_the_form_treatment() {
        let body = multipart_body("XBOUND", &[("k", "1"), ("k", "2"), ("name", "deploy")]);
        let args = extract_args(
            &[],
            &HeaderMap::new(),
            &Method::POST,
            Some("multipart/form-data; boundary=XBOUND"),
            &body,
            None,
        )
        .await
        .unwrap();

        assert_eq!(args.get("k"), Some(&json!("2")));
        assert_eq!(args.get("_form_k"), Some(&json!(["1", "2"])));
        assert_eq!(args.get("name"), Some(&json!("deploy")));
    }

    #[tokio::test]
    async fn truncated_multipart_body_is_an_error() {
        let result = extract_args(
            &[],
            &HeaderMap::new(),
            &Method::POST,
            Some("multipart/form-data; boundary=XBOUND"),
            b"--XBOUND\r\nContent-Disposition: form-data; name=\"k\"\r\n\r\n1",
            None,
        )
        .await;
        assert!(matches!(result, Err(ExtractError::MultipartBody(_))));
    }

    #[tokio::test]
    async fn get_requests_skip_the_body() {
        let args = extract_args(
            &[],
            &HeaderMap::new(),
            &Method::GET,
            Some("application/json"),
            b"{\"ignored\": true}",
            Some("q=1"),
        )
        .await
        .unwrap();

        assert!(args.get("ignored").is_none());
        assert_eq!(args.get("q"), Some(&json!("1")));
    }

    #[tokio::test]
    async fn json_body_fields_become_flat_keys() {
        let args = extract_args(
            &[],
            &HeaderMap::new(),
            &Method::POST,
            Some("application/json"),
            b"{\"name\": \"deploy\", \"count\": 3}",
            None,
        )
        .await
        .unwrap();

        assert_eq!(args.get("name"), Some(&json!("deploy")));
        assert_eq!(args.get("count"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn malformed_json_body_is_an_error() {
        let result = extract_args(
            &[],
            &HeaderMap::new(),
            &Method::POST,
            Some("application/json"),
            b"{not json",
            None,
        )
        .await;
        assert!(matches!(result, Err(ExtractError::JsonBody(_))));
    }

    #[tokio::test]
    async fn non_object_json_body_is_rejected() {
        let result = extract_args(
            &[],
            &HeaderMap::new(),
            &Method::POST,
            Some("application/json"),
            b"[1, 2]",
            None,
        )
        .await;
        assert!(matches!(result, Err(ExtractError::BodyShape)));
    }

    #[tokio::test]
    async fn header_names_are_lowercased() {
        let headers = headers_with("X-Custom-Token", "abc");
        let args = extract_args(&[], &headers, &Method::GET, None, b"", None)
            .await
            .unwrap();
        assert_eq!(
            args[KEY_ARGS_HEADERS].get("x-custom-token"),
            Some(&json!("abc"))
        );
    }

    #[tokio::test]
    async fn empty_body_is_skipped_for_non_get() {
        let args = extract_args(
            &[],
            &HeaderMap::new(),
            &Method::POST,
            Some("application/json"),
            b"",
            None,
        )
        .await
        .unwrap();
        assert_eq!(args.len(), 1); // headers sub-map only
    }
}
