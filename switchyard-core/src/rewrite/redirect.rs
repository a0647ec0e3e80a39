//! Redirect location for redirect-mode targets.

use tracing::debug;

use super::{strip_and_prepend, HOST_PLACEHOLDER, PATH_PLACEHOLDER};
use crate::domain::target::Target;
use crate::url::Url;

/// A redirect response for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// HTTP status code of the response.
    pub code: u16,
    /// Value of the `Location` header.
    pub location: Url,
}

/// Build the redirect location for `request` against `target`'s endpoint.
///
/// The endpoint may use `$path` and `$host` placeholders. A `$path` glued to
/// the host (`http://backend$path`) is moved into the path, a `/` directly in
/// front of the first `$path` is dropped, and then the first `$path` is
/// replaced by the request path after `strip_path` / `prepend_path` are
/// applied. Decoded and raw paths are rewritten side by side. The request
/// query is carried over only when the endpoint has none. An empty result
/// path becomes `/`, and the first `$host` is replaced by the request host.
///
/// Never fails: missing placeholders leave the endpoint as configured.
pub fn build_redirect_url(target: &Target, request: &Url) -> Url {
    let endpoint = target.url();
    let mut url = Url {
        scheme: endpoint.scheme.clone(),
        host: endpoint.host.clone(),
        path: endpoint.path.clone(),
        raw_path: endpoint.path.clone(),
        raw_query: endpoint.raw_query.clone(),
    };

    if let Some(host) = url.host.strip_suffix(PATH_PLACEHOLDER) {
        url.host = host.to_owned();
        url.path.insert_str(0, PATH_PLACEHOLDER);
        url.raw_path.insert_str(0, PATH_PLACEHOLDER);
    }

    collapse_separator(&mut url.path);
    collapse_separator(&mut url.raw_path);

    if url.path.contains(PATH_PLACEHOLDER) {
        let raw_request_path = if request.raw_path.is_empty() {
            &request.path
        } else {
            &request.raw_path
        };
        let replace_path = strip_and_prepend(&request.path, &target.strip_path, &target.prepend_path);
        let replace_raw_path =
            strip_and_prepend(raw_request_path, &target.strip_path, &target.prepend_path);

        url.path = url.path.replacen(PATH_PLACEHOLDER, &replace_path, 1);
        url.raw_path = url.raw_path.replacen(PATH_PLACEHOLDER, &replace_raw_path, 1);

        if url.raw_query.is_empty() && !request.raw_query.is_empty() {
            url.raw_query = request.raw_query.clone();
        }
    }

    if url.path.is_empty() {
        url.path = "/".to_owned();
    }

    if url.host.contains(HOST_PLACEHOLDER) {
        url.host = url.host.replacen(HOST_PLACEHOLDER, &request.host, 1);
    }

    debug!(
        service = %target.service,
        request = %request,
        location = %url,
        "built redirect url"
    );
    url
}

/// Drop a `/` directly in front of the first `$path`.
fn collapse_separator(path: &mut String) {
    if let Some(idx) = path.find(PATH_PLACEHOLDER) {
        if idx > 0 && path.as_bytes()[idx - 1] == b'/' {
            path.remove(idx - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::target::TargetBuilder;

    fn redirect_target(endpoint: &str) -> TargetBuilder {
        TargetBuilder::new("redirect", endpoint).redirect_code(301)
    }

    fn request(host: &str, target: &str) -> Url {
        Url::from_request(host, target).unwrap()
    }

    fn location(target: &Target, host: &str, path: &str) -> String {
        build_redirect_url(target, &request(host, path)).to_string()
    }

    #[test]
    fn host_and_path_placeholders() {
        let target = redirect_target("https://$host$path").build().unwrap();
        let url = build_redirect_url(&target, &request("example.com", "/a/b"));
        assert_eq!(url.host, "example.com");
        assert_eq!(url.path, "/a/b");
        assert_eq!(url.to_string(), "https://example.com/a/b");
    }

    #[test]
    fn placeholder_glued_to_host_moves_into_path() {
        let target = redirect_target("http://backend$path").build().unwrap();
        let url = build_redirect_url(&target, &request("example.com", "/x"));
        assert_eq!(url.host, "backend");
        assert_eq!(url.path, "/x");
    }

    #[test]
    fn separator_before_placeholder_is_collapsed() {
        let mut path = String::from("/prefix/$path");
        collapse_separator(&mut path);
        assert_eq!(path, "/prefix$path");

        let target = redirect_target("http://backend/prefix/$path").build().unwrap();
        assert_eq!(location(&target, "h", "/a"), "http://backend/prefix/a");
    }

    #[test]
    fn separator_cleanup_applies_to_raw_path() {
        let target = redirect_target("http://backend/prefix/$path").build().unwrap();
        let url = build_redirect_url(&target, &request("h", "/a%2Fb"));
        assert_eq!(url.path, "/prefix/a/b");
        assert_eq!(url.raw_path, "/prefix/a%2Fb");
        assert_eq!(url.to_string(), "http://backend/prefix/a%2Fb");
    }

    #[test]
    fn bare_repeated_placeholder_replaces_first_only() {
        let mut path = String::from("$path/$path");
        collapse_separator(&mut path);
        assert_eq!(path, "$path/$path");

        let target = redirect_target("http://backend$path/$path").build().unwrap();
        let url = build_redirect_url(&target, &request("h", "/x"));
        assert_eq!(url.host, "backend");
        assert_eq!(url.path, "/x/$path");
        assert_eq!(url.raw_path, "/x/$path");
    }

    #[test]
    fn encoded_endpoint_characters_survive() {
        let target = redirect_target("http://b/100%25/$path").build().unwrap();
        assert_eq!(location(&target, "h", "/x"), "http://b/100%25/x");

        let target = redirect_target("http://b/a%20b/$path").build().unwrap();
        assert_eq!(location(&target, "h", "/x"), "http://b/a%20b/x");
    }

    #[test]
    fn only_first_placeholder_is_replaced() {
        let target = redirect_target("http://backend/$path/$path").build().unwrap();
        let url = build_redirect_url(&target, &request("h", "/x"));
        assert_eq!(url.path, "/x/$path");
    }

    #[test]
    fn empty_path_becomes_root() {
        let target = redirect_target("http://backend").build().unwrap();
        let url = build_redirect_url(&target, &request("h", "/ignored?q=1"));
        assert_eq!(url.path, "/");
        assert_eq!(url.raw_query, "");
        assert_eq!(url.to_string(), "http://backend/");
    }

    #[test]
    fn endpoint_without_placeholder_is_static() {
        let target = redirect_target("https://static.example.com/moved")
            .build()
            .unwrap();
        assert_eq!(
            location(&target, "h", "/anything?x=1"),
            "https://static.example.com/moved"
        );
    }

    #[test]
    fn endpoint_query_wins_over_request_query() {
        let target = redirect_target("http://backend/$path?from=cfg").build().unwrap();
        assert_eq!(location(&target, "h", "/a?from=req"), "http://backend/a?from=cfg");

        let target = redirect_target("http://backend/$path").build().unwrap();
        assert_eq!(location(&target, "h", "/a?from=req&x"), "http://backend/a?from=req&x");
    }

    #[test]
    fn strip_and_prepend_apply_to_substitution() {
        let target = redirect_target("https://new.example.com$path")
            .strip_path("/old")
            .prepend_path("/v2")
            .build()
            .unwrap();
        assert_eq!(
            location(&target, "h", "/old/page"),
            "https://new.example.com/v2/page"
        );
        assert_eq!(
            location(&target, "h", "/other"),
            "https://new.example.com/v2/other"
        );
    }

    #[test]
    fn encoded_request_path_survives() {
        let target = redirect_target("http://backend/$path").build().unwrap();
        let url = build_redirect_url(&target, &request("h", "/a%2Fb"));
        assert_eq!(url.path, "/a/b");
        assert_eq!(url.raw_path, "/a%2Fb");
        assert_eq!(url.to_string(), "http://backend/a%2Fb");
    }

    #[test]
    fn strip_applies_to_raw_path_independently() {
        let target = redirect_target("http://backend/$path")
            .strip_path("/api")
            .build()
            .unwrap();
        let url = build_redirect_url(&target, &request("h", "/api/a%2Fb"));
        assert_eq!(url.path, "/a/b");
        assert_eq!(url.raw_path, "/a%2Fb");

        // "/ap%69" decodes to "/api", so only the decoded form is stripped.
        let url = build_redirect_url(&target, &request("h", "/ap%69/x"));
        assert_eq!(url.path, "/x");
        assert_eq!(url.raw_path, "/ap%69/x");
        assert_eq!(url.escaped_path(), "/x");
    }

    #[test]
    fn host_placeholder_without_path_placeholder() {
        let target = redirect_target("https://$host/static").build().unwrap();
        assert_eq!(location(&target, "example.com", "/x"), "https://example.com/static");
    }

    #[test]
    fn redirect_carries_status_code() {
        let target = redirect_target("https://$host$path").build().unwrap();
        let redirect = target.redirect(&request("example.com", "/a")).unwrap();
        assert_eq!(redirect.code, 301);
        assert_eq!(redirect.location.to_string(), "https://example.com/a");
    }
}
