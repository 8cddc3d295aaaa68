use lazy_static::lazy_static;
use regex::{Captures, Regex};
use url::Url;

use super::{escape_attr, PLACEHOLDER_IMAGE};

/// Host suffix of the object storage that uploaded media lives on.
pub const DEFAULT_STORAGE_HOST: &str = "linodeobjects.com";

/// `src` values left behind when a template stringified an image object.
const BROKEN_SOURCES: [&str; 4] = ["[object Object]", "undefined", "", "null"];

lazy_static! {
    static ref IMG_SRC_RE: Regex =
        Regex::new(r#"(?i)<img\b([^>]*?)\ssrc="([^"]*)"([^>]*)>"#).unwrap();
    static ref IMG_TAG_RE: Regex = Regex::new(r"(?i)<img\b([^>]*)>").unwrap();
    static ref ONERROR_RE: Regex = Regex::new(r"(?i)\sonerror\s*=").unwrap();
    static ref MARKDOWN_IMAGE_RE: Regex = Regex::new(r"!\[.*?\]\((.*?)\)").unwrap();
    pub(crate) static ref DEFAULT_STORAGE_URL: Regex =
        storage_url_pattern(DEFAULT_STORAGE_HOST).unwrap();
}

pub(crate) fn fallback_handler() -> String {
    format!("onerror=\"this.onerror=null; this.src='{PLACEHOLDER_IMAGE}';\"")
}

/// Matches absolute URLs on `host` (or any of its subdomains).
pub(crate) fn storage_url_pattern(host: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r#"https?://[\w.-]+\.{}/[^"'\s<>(),]+"#,
        regex::escape(host.trim_start_matches('.'))
    ))
}

/// Rewrites every `<img src>` that is a stringified non-value, and roots
/// relative paths at `/`. Tags are matched case-insensitively and written
/// back in lowercase.
pub(crate) fn repair_sources(html: &str, original: &str, storage_url: &Regex) -> String {
    IMG_SRC_RE
        .replace_all(html, |caps: &Captures<'_>| {
            let src = &caps[2];
            let mut fixed = src.to_string();

            if BROKEN_SOURCES.contains(&src) {
                fixed = match storage_url.find(original) {
                    Some(found) => escape_attr(found.as_str()),
                    None => PLACEHOLDER_IMAGE.to_string(),
                };
                tracing::debug!(broken = src, replacement = %fixed, "repaired image source");
            }

            if !fixed.starts_with('/') && Url::parse(&fixed).is_err() {
                fixed.insert(0, '/');
            }

            format!("<img{} src=\"{}\"{}>", &caps[1], fixed, &caps[3])
        })
        .into_owned()
}

/// Adds the placeholder swap to every `<img>` that has no error handler yet.
pub(crate) fn inject_fallbacks(html: &str) -> String {
    IMG_TAG_RE
        .replace_all(html, |caps: &Captures<'_>| {
            let attrs = &caps[1];
            if ONERROR_RE.is_match(attrs) {
                return caps[0].to_string();
            }
            match attrs.trim_end().strip_suffix('/') {
                Some(open) => format!("<img{} {} />", open.trim_end(), fallback_handler()),
                None => format!("<img{} {}>", attrs.trim_end(), fallback_handler()),
            }
        })
        .into_owned()
}

/// Target of the first `![alt](url)` in a document, used as a cover image.
pub fn extract_first_image_url(markdown: &str) -> Option<String> {
    MARKDOWN_IMAGE_RE
        .captures(markdown)
        .and_then(|caps| caps.get(1))
        .map(|url| url.as_str().trim().to_string())
        .filter(|url| !url.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> Regex {
        storage_url_pattern(DEFAULT_STORAGE_HOST).unwrap()
    }

    #[test]
    fn broken_source_without_storage_url_uses_placeholder() {
        let html = r#"<p><img src="undefined" alt="x" /></p>"#;
        let fixed = repair_sources(html, "![x](undefined)", &storage());
        assert_eq!(
            fixed,
            r#"<p><img src="/images/placeholder.jpg" alt="x" /></p>"#
        );
    }

    #[test]
    fn broken_source_recovers_storage_url_from_markdown() {
        let original =
            "cover: {\"url\": \"https://media.us-east-1.linodeobjects.com/posts/cover.jpg\"}";
        for broken in BROKEN_SOURCES {
            let html = format!(r#"<img src="{broken}" alt="x" />"#);
            let fixed = repair_sources(&html, original, &storage());
            assert_eq!(
                fixed,
                r#"<img src="https://media.us-east-1.linodeobjects.com/posts/cover.jpg" alt="x" />"#
            );
        }
    }

    #[test]
    fn recovered_storage_url_is_attribute_escaped() {
        let original = "https://b.linodeobjects.com/x.jpg?a=1&b=2";
        let fixed = repair_sources(r#"<img src="null" alt="x" />"#, original, &storage());
        assert_eq!(
            fixed,
            r#"<img src="https://b.linodeobjects.com/x.jpg?a=1&amp;b=2" alt="x" />"#
        );
    }

    #[test]
    fn uppercase_tags_are_repaired_and_guarded() {
        let fixed = repair_sources(r#"<IMG SRC="undefined">"#, "", &storage());
        assert_eq!(fixed, r#"<img src="/images/placeholder.jpg">"#);

        let out = inject_fallbacks(&fixed);
        assert_eq!(out.matches("onerror=\"").count(), 1);

        let guarded = r#"<IMG SRC="/a.png" ONERROR="retry()">"#;
        assert_eq!(inject_fallbacks(guarded), guarded);
    }

    #[test]
    fn storage_url_stops_at_markdown_delimiters() {
        let found = storage()
            .find("![a](https://b.linodeobjects.com/x/y.png)")
            .map(|m| m.as_str().to_string());
        assert_eq!(found.as_deref(), Some("https://b.linodeobjects.com/x/y.png"));
    }

    #[test]
    fn relative_paths_are_rooted() {
        let fixed = repair_sources(r#"<img src="img/a.png" alt="" />"#, "", &storage());
        assert_eq!(fixed, r#"<img src="/img/a.png" alt="" />"#);
    }

    #[test]
    fn absolute_and_rooted_paths_are_kept() {
        for src in ["/a.png", "https://cdn.example.com/a.png", "data:image/png;base64,AA"] {
            let html = format!(r#"<img src="{src}" alt="" />"#);
            assert_eq!(repair_sources(&html, "", &storage()), html);
        }
    }

    #[test]
    fn data_modal_src_is_not_rewritten() {
        let html = r#"<img src="logo.png" alt="Logo" data-modal-src="logo.png" />"#;
        let fixed = repair_sources(html, "", &storage());
        assert_eq!(
            fixed,
            r#"<img src="/logo.png" alt="Logo" data-modal-src="logo.png" />"#
        );
    }

    #[test]
    fn fallback_is_added_once() {
        let html = r#"<img src="/a.png" alt="a" /><img src="/b.png" onerror="x()">"#;
        let out = inject_fallbacks(html);
        assert_eq!(out.matches("onerror=\"").count(), 2);
        assert!(out.starts_with(
            r#"<img src="/a.png" alt="a" onerror="this.onerror=null; this.src='/images/placeholder.jpg';" />"#
        ));
        assert!(out.ends_with(r#"<img src="/b.png" onerror="x()">"#));
    }

    #[test]
    fn first_image_url_is_extracted() {
        let md = "intro\n\n![one](https://x/1.png) and ![two](2.png)";
        assert_eq!(
            extract_first_image_url(md).as_deref(),
            Some("https://x/1.png")
        );
        assert_eq!(extract_first_image_url("no images here"), None);
        assert_eq!(extract_first_image_url("![empty]()"), None);
    }
}
