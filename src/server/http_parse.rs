use super::http_types::ConsumeRequest;
use crate::domain::ServiceName;
use axum::http::{header, HeaderMap};
use strum::IntoEnumIterator;

pub(super) fn parse_service_name(service: &str) -> Option<ServiceName> {
    service.parse().ok()
}

pub(super) fn allowed_service_names() -> Vec<String> {
    ServiceName::iter().map(|s| s.to_string()).collect()
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = value.split(';').next().unwrap_or_default().trim();
    mime.eq_ignore_ascii_case("application/json")
        || mime.to_ascii_lowercase().ends_with("+json")
}

/// An empty body charges one unit; anything else must be a well-formed JSON object.
pub(super) fn parse_consume_body(headers: &HeaderMap, body: &[u8]) -> Result<ConsumeRequest, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ConsumeRequest::default());
    }
    if !is_json_content_type(headers) {
        return Err("Expected request with `Content-Type: application/json`".to_string());
    }
    serde_json::from_slice(body).map_err(|e| format!("Invalid request body: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers
    }

    #[test]
    fn empty_consume_body_charges_one_unit() {
        assert_eq!(parse_consume_body(&HeaderMap::new(), b"").unwrap().units, 1);
        assert_eq!(parse_consume_body(&json_headers(), b"  \n").unwrap().units, 1);
        assert_eq!(parse_consume_body(&json_headers(), b"{}").unwrap().units, 1);
    }

    #[test]
    fn consume_body_reads_units() {
        assert_eq!(parse_consume_body(&json_headers(), br#"{"units":5}"#).unwrap().units, 5);
    }

    #[test]
    fn consume_body_without_json_content_type_is_rejected() {
        assert!(parse_consume_body(&HeaderMap::new(), br#"{"units":5}"#).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(parse_consume_body(&headers, br#"{"units":5}"#).is_err());
    }

    #[test]
    fn malformed_consume_body_is_rejected() {
        assert!(parse_consume_body(&json_headers(), br#"{"units":"five"}"#).is_err());
        assert!(parse_consume_body(&json_headers(), b"units=5").is_err());
        assert!(parse_consume_body(&json_headers(), br#"{"units":5"#).is_err());
    }

    #[test]
    fn parse_service_name_accepts_kebab_case() {
        assert_eq!(
            parse_service_name("security-blur-face"),
            Some(ServiceName::SecurityBlurFace)
        );
    }

    #[test]
    fn parse_invalid_inputs_return_none() {
        assert!(parse_service_name("nope").is_none());
        assert!(parse_service_name("OptimizeCompress").is_none());
        assert!(parse_service_name("").is_none());
    }

    #[test]
    fn allowed_service_names_lists_full_enumeration() {
        let names = allowed_service_names();
        assert_eq!(names.len(), 12);
        assert!(names.contains(&"convert-from-jpg".to_string()));
    }
}
