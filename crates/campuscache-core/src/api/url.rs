//! Joining the configured backend base URL with endpoint paths.

/// Build a full API URL from a base URL and an endpoint.
///
/// Absolute endpoints (`http://` or `https://`) are returned unchanged.
/// Relative endpoints are joined to `base` with exactly one `/`, whatever
/// slashes either side carries. An empty base yields a root-relative path.
pub fn build_api_url(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }

    let base = base.trim().trim_end_matches('/');
    let path = endpoint.trim_start_matches('/');
    format!("{}/{}", base, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://lms.example.edu";

    #[test]
    fn test_leading_slash_is_normalized() {
        assert_eq!(build_api_url(BASE, "/api/x"), build_api_url(BASE, "api/x"));
        assert_eq!(build_api_url(BASE, "api/x"), "https://lms.example.edu/api/x");
    }

    #[test]
    fn test_trailing_slash_on_base() {
        assert_eq!(
            build_api_url("https://lms.example.edu/", "/api/courses"),
            "https://lms.example.edu/api/courses"
        );
        assert_eq!(
            build_api_url("https://lms.example.edu//", "//api/courses"),
            "https://lms.example.edu/api/courses"
        );
    }

    #[test]
    fn test_absolute_endpoint_is_identity() {
        assert_eq!(build_api_url(BASE, "https://cdn.example/y"), "https://cdn.example/y");
        assert_eq!(build_api_url(BASE, "http://cdn.example/y"), "http://cdn.example/y");
    }

    #[test]
    fn test_empty_base_is_root_relative() {
        assert_eq!(build_api_url("", "api/x"), "/api/x");
        assert_eq!(build_api_url("", "/api/x"), "/api/x");
    }

    #[test]
    fn test_base_with_path_prefix() {
        assert_eq!(
            build_api_url("https://lms.example.edu/v1", "courses"),
            "https://lms.example.edu/v1/courses"
        );
    }
}
