//! Checks that keep raw HTML and links in article markdown from running code.

use std::sync::LazyLock;

use regex::Regex;

/// Tags that load or run content outside the widget allow-list.
const BLOCKED_TAGS: &[&str] = &[
    "script", "iframe", "frame", "frameset", "object", "embed", "applet", "base", "meta", "link",
    "form",
];

/// Schemes a browser would execute or inline.
const UNSAFE_SCHEMES: &[&str] = &["javascript:", "vbscript:", "data:"];

static OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*/?\s*([A-Za-z][A-Za-z0-9-]*)").expect("Invalid tag regex"));

static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|[\s/"'])on[a-z]+\s*="#).expect("Invalid event handler regex")
});

static URL_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:^|[\s/"'])(?:href|src|srcset|action|formaction|poster|background|xlink:href)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#,
    )
    .expect("Invalid URL attribute regex")
});

/// Whether a URL uses a scheme that would run or inline code.
///
/// Tabs and newlines are ignored the way browsers ignore them in URLs.
pub(crate) fn has_unsafe_scheme(url: &str) -> bool {
    let normalized: String = url
        .trim_start_matches(|c: char| c.is_ascii_whitespace() || c.is_ascii_control())
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect::<String>()
        .to_ascii_lowercase();
    UNSAFE_SCHEMES
        .iter()
        .any(|scheme| normalized.starts_with(scheme))
}

/// Character references that could spell out a scheme.
fn has_encoded_scheme(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    ["&#", "&colon", "&tab", "&newline"]
        .iter()
        .any(|entity| lower.contains(entity))
}

/// Reason a raw HTML fragment is rejected, if it is.
///
/// Pass a whole run of consecutive HTML events, since a block tag may be
/// split across several.
pub(crate) fn unsafe_html(raw: &str) -> Option<String> {
    for caps in OPEN_TAG.captures_iter(raw) {
        let tag = caps[1].to_ascii_lowercase();
        if BLOCKED_TAGS.contains(&tag.as_str()) {
            return Some(format!("<{tag}> is not allowed"));
        }
    }

    if EVENT_HANDLER.is_match(raw) {
        return Some("event handler attributes are not allowed".to_string());
    }

    for caps in URL_ATTRIBUTE.captures_iter(raw) {
        let value = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str());
        if has_unsafe_scheme(value) || has_encoded_scheme(value) {
            return Some(format!("URL {value:?} is not allowed"));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_unsafe_schemes() {
        assert!(has_unsafe_scheme("javascript:alert(1)"));
        assert!(has_unsafe_scheme("  JavaScript:alert(1)"));
        assert!(has_unsafe_scheme("java\tscript:alert(1)"));
        assert!(has_unsafe_scheme("data:text/html;base64,PHNjcmlwdD4="));
        assert!(has_unsafe_scheme("vbscript:msgbox"));

        assert!(!has_unsafe_scheme("https://example.com/a.png"));
        assert!(!has_unsafe_scheme("/images/javascript:notes.png"));
        assert!(!has_unsafe_scheme("#section"));
    }

    #[test]
    fn rejects_blocked_tags() {
        assert!(unsafe_html("<script>alert(1)</script>").is_some());
        assert!(unsafe_html("<IFRAME src=\"https://x.test\"></IFRAME>").is_some());
        assert!(unsafe_html("<object data=\"x.swf\"></object>").is_some());
    }

    #[test]
    fn rejects_event_handlers() {
        assert!(unsafe_html("<img src=\"/a.png\" onerror=\"alert(1)\">").is_some());
        assert!(unsafe_html("<div\nonclick='x()'>hi</div>").is_some());
        assert!(unsafe_html("<svg/onload=alert(1)>").is_some());
        assert!(unsafe_html("onerror=\"alert(1)\">").is_some());
    }

    #[test]
    fn rejects_script_urls_in_attributes() {
        assert!(unsafe_html("<a href=\"javascript:alert(1)\">x</a>").is_some());
        assert!(unsafe_html("<a href='  javascript:alert(1)'>x</a>").is_some());
        assert!(unsafe_html("<a href=javascript:alert(1)>x</a>").is_some());
        assert!(unsafe_html("<a href=\"&#106;avascript:alert(1)\">x</a>").is_some());
        assert!(unsafe_html("<img src=\"data:image/svg+xml,<svg>\">").is_some());
    }

    #[test]
    fn allows_plain_markup() {
        assert_eq!(unsafe_html("<div class=\"note\">Hello</div>"), None);
        assert_eq!(unsafe_html("<a href=\"https://example.com/?a=1&b=2\">x</a>"), None);
        assert_eq!(unsafe_html("<img src=\"/a.png\" alt=\"one\">"), None);
        assert_eq!(unsafe_html("<details><summary>More</summary>text</details>"), None);
        assert_eq!(unsafe_html("<!-- onboarding notes -->"), None);
    }
}
