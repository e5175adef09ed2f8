use super::*;

#[test]
fn base_url_trailing_slash_is_trimmed() {
    assert_eq!(normalize_base_url("http://signage.local:3000/").ok().as_deref(), Some("http://signage.local:3000"));
    assert_eq!(normalize_base_url(" https://signage.example ").ok().as_deref(), Some("https://signage.example"));
}

#[test]
fn non_http_base_url_is_rejected() {
    assert!(matches!(normalize_base_url("ws://signage.local"), Err(ApiError::InvalidBaseUrl(_))));
    assert!(matches!(normalize_base_url("signage.local"), Err(ApiError::InvalidBaseUrl(_))));
}

#[test]
fn http_source_requires_valid_base_url() {
    assert!(HttpContentSource::new(reqwest::Client::new(), "ftp://nope").is_err());
    assert!(HttpContentSource::new(reqwest::Client::new(), "http://127.0.0.1:3000").is_ok());
}

#[test]
fn status_error_names_the_path() {
    let err = ApiError::Status { status: 503, path: "/api/boards/x".into() };
    assert_eq!(err.to_string(), "server returned HTTP 503 for /api/boards/x");
}
