use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Query-value encoding: everything except RFC 3986 unreserved characters.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// The sign-in page for regular sessions.
pub const LOGIN_PATH: &str = "/login";
/// The sign-in page for the admin console.
pub const ADMIN_LOGIN_PATH: &str = "/admin/login";
/// The one-time setup page for a fresh admin console.
pub const ADMIN_SETUP_PATH: &str = "/admin/setup";

/// Whether `path` is the setup page or below it.
pub fn is_setup_path(path: &str) -> bool {
    match path.strip_prefix(ADMIN_SETUP_PATH) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

/// Returns `raw` if it is a same-origin relative path, `/` otherwise.
///
/// Rejected: anything not starting with a single `/` (absolute URLs,
/// scheme-relative `//host`), backslashes (browsers read `/\host` as
/// `//host`), and control characters.
pub fn same_origin_path(raw: &str) -> &str {
    let trimmed = raw.trim();

    let acceptable = trimmed.starts_with('/')
        && !trimmed.starts_with("//")
        && !trimmed.contains('\\')
        && !trimmed.chars().any(char::is_control);

    if acceptable { trimmed } else { "/" }
}

/// Builds `<target>?redirect=<encoded original path>`.
pub fn with_return_path(target: &str, original: &str) -> String {
    format!(
        "{}?redirect={}",
        target,
        utf8_percent_encode(same_origin_path(original), QUERY_VALUE)
    )
}

/// Login redirect for a regular session.
pub fn login_redirect(original: &str) -> String {
    with_return_path(LOGIN_PATH, original)
}

/// Login redirect for the admin console.
pub fn admin_login_redirect(original: &str) -> String {
    with_return_path(ADMIN_LOGIN_PATH, original)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_path_matches_only_the_setup_page() {
        assert!(is_setup_path("/admin/setup"));
        assert!(is_setup_path("/admin/setup/step-2"));
        assert!(is_setup_path("/admin/setup?from=login"));
        assert!(!is_setup_path("/admin/setupwizard"));
        assert!(!is_setup_path("/admin/setup-old"));
        assert!(!is_setup_path("/admin"));
    }

    #[test]
    fn keeps_relative_paths() {
        assert_eq!(same_origin_path("/courses/learn-ai?lesson=3"), "/courses/learn-ai?lesson=3");
    }

    #[test]
    fn rejects_external_targets() {
        for raw in [
            "https://evil.example/phish",
            "//evil.example",
            "/\\evil.example",
            "javascript:alert(1)",
            "courses",
            "/a\r\nSet-Cookie: x=1",
            "",
        ] {
            assert_eq!(same_origin_path(raw), "/", "accepted {:?}", raw);
        }
    }

    #[test]
    fn encodes_the_return_path() {
        assert_eq!(
            login_redirect("/courses/learn-ai?lesson=3"),
            "/login?redirect=%2Fcourses%2Flearn-ai%3Flesson%3D3"
        );
        assert_eq!(login_redirect("https://evil.example"), "/login?redirect=%2F");
        assert_eq!(admin_login_redirect("/admin/otc"), "/admin/login?redirect=%2Fadmin%2Fotc");
    }
}
