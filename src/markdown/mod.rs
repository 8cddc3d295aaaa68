//! Markdown to HTML for posts and projects.
//!
//! Rendering runs a fixed pipeline over raw author markdown:
//!
//! 1. shortcode expansion (`{gallery}`, `{gallery:N}`, then `{modal}`)
//! 2. GitHub-flavoured markdown parsing, single newlines as hard breaks
//! 3. `<img src>` repair for stringified image objects and relative paths
//! 4. a placeholder `onerror` handler on every image that lacks one
//!
//! The shortcode patterns match markdown image syntax, not HTML, so the
//! pipeline must only ever see a document once. [`RawMarkdown`] and
//! [`RenderedHtml`] are separate types to keep rendered output from being fed
//! back in.

mod images;
mod shortcode;

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
};

use regex::Regex;
use thiserror::Error;
use tracing::{error, trace};

pub use images::{extract_first_image_url, DEFAULT_STORAGE_HOST};
pub use shortcode::{GalleryShortcode, ModalShortcode, ShortcodeExpander, DEFAULT_GALLERY_COLUMNS};

pub const PLACEHOLDER_IMAGE: &str = "/images/placeholder.jpg";
pub const RENDER_ERROR_HTML: &str = "<p>Error parsing content</p>";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("markdown parse failed: {0}")]
    Parse(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid storage host pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Author-written markdown that has not been through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMarkdown(String);

impl RawMarkdown {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RawMarkdown {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for RawMarkdown {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// Output of [`MarkdownRenderer::render`]. Deliberately not convertible back
/// into [`RawMarkdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedHtml(String);

impl RenderedHtml {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RenderedHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The markdown-to-HTML step of the pipeline.
pub trait MarkdownParser: Send + Sync {
    fn to_html(&self, markdown: &str) -> Result<String, RenderError>;
}

/// GFM via comrak. Raw HTML is passed through so expanded shortcodes survive.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComrakParser;

impl MarkdownParser for ComrakParser {
    fn to_html(&self, markdown: &str) -> Result<String, RenderError> {
        let mut options = comrak::Options::default();
        options.extension.strikethrough = true;
        options.extension.table = true;
        options.extension.autolink = true;
        options.extension.tasklist = true;
        options.extension.footnotes = true;
        options.render.hardbreaks = true;
        options.render.unsafe_ = true;
        Ok(comrak::markdown_to_html(markdown, &options))
    }
}

pub struct MarkdownRenderer {
    expanders: Vec<Box<dyn ShortcodeExpander>>,
    parser: Box<dyn MarkdownParser>,
    storage_url: Regex,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self {
            expanders: vec![Box::new(GalleryShortcode), Box::new(ModalShortcode)],
            parser: Box::new(ComrakParser),
            storage_url: images::DEFAULT_STORAGE_URL.clone(),
        }
    }

    pub fn with_parser(mut self, parser: impl MarkdownParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Replaces the shortcode stages. They run in the given order.
    pub fn with_expanders(mut self, expanders: Vec<Box<dyn ShortcodeExpander>>) -> Self {
        self.expanders = expanders;
        self
    }

    /// Host suffix used to recover image URLs for broken `src` values.
    pub fn with_storage_host(mut self, host: &str) -> Result<Self, RenderError> {
        self.storage_url = images::storage_url_pattern(host)?;
        Ok(self)
    }

    /// Never fails: a broken document renders as [`RENDER_ERROR_HTML`].
    pub fn render(&self, markdown: &RawMarkdown) -> RenderedHtml {
        if markdown.as_str().is_empty() {
            return RenderedHtml::default();
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(markdown.as_str())));
        match outcome {
            Ok(Ok(html)) => RenderedHtml(html),
            Ok(Err(err)) => {
                error!(error = %err, "failed to render markdown");
                RenderedHtml(RENDER_ERROR_HTML.to_string())
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(panic = %message, "markdown renderer panicked");
                RenderedHtml(RENDER_ERROR_HTML.to_string())
            }
        }
    }

    fn run(&self, original: &str) -> Result<String, RenderError> {
        let mut text = original.to_string();
        for expander in &self.expanders {
            text = expander.expand(&text)?;
            trace!(stage = expander.name(), output = %preview(&text), "shortcodes expanded");
        }

        let html = self.parser.to_html(&text)?;
        trace!(output = %preview(&html), "markdown parsed");

        let html = images::repair_sources(&html, original, &self.storage_url);
        Ok(images::inject_fallbacks(&html))
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MarkdownRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkdownRenderer")
            .field(
                "expanders",
                &self.expanders.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .field("storage_url", &self.storage_url.as_str())
            .finish_non_exhaustive()
    }
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub(crate) fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(md: &str) -> String {
        MarkdownRenderer::new()
            .render(&RawMarkdown::from(md))
            .into_string()
    }

    fn img_tags(html: &str) -> Vec<&str> {
        html.match_indices("<img")
            .map(|(start, _)| {
                let end = start + html[start..].find('>').unwrap() + 1;
                &html[start..end]
            })
            .collect()
    }

    struct FailingParser;

    impl MarkdownParser for FailingParser {
        fn to_html(&self, _markdown: &str) -> Result<String, RenderError> {
            Err(RenderError::Parse("unexpected token".into()))
        }
    }

    struct PanickingParser;

    impl MarkdownParser for PanickingParser {
        fn to_html(&self, _markdown: &str) -> Result<String, RenderError> {
            panic!("parser blew up");
        }
    }

    #[test]
    fn empty_input_renders_empty() {
        assert_eq!(render(""), "");
    }

    #[test]
    fn renders_gfm_with_hard_breaks() {
        let html = render("line one\nline two\n\n~~gone~~\n\n| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("line one<br />"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("<table>"));
    }

    #[test]
    fn gallery_becomes_single_container() {
        let html = render("![Team Photos{gallery:2}](a.jpg, b.jpg, c.jpg)");
        assert_eq!(html.matches("class=\"markdown-gallery\"").count(), 1);
        assert!(html.contains("data-columns=\"2\""));
        assert!(html.contains(r#"data-images='[{"src":"a.jpg"},{"src":"b.jpg"},{"src":"c.jpg"}]'"#));
    }

    #[test]
    fn unmarked_multi_url_image_is_plain_markdown() {
        let html = render("![Team Photos](a.jpg, b.jpg, c.jpg)");
        assert!(!html.contains("markdown-gallery"));
        assert!(html.contains("Team Photos"));
    }

    #[test]
    fn modal_image_keeps_source_in_data_attribute() {
        let html = render("![Logo{modal}](logo.png)");
        let tags = img_tags(&html);
        assert_eq!(tags.len(), 1);
        assert!(tags[0].contains(" alt=\"Logo\""));
        assert!(tags[0].contains("data-modal-src=\"logo.png\""));
        assert!(tags[0].contains("data-modal=\"true\""));
    }

    #[test]
    fn undefined_source_falls_back_to_placeholder() {
        let html = render("![broken](undefined)");
        assert!(html.contains("src=\"/images/placeholder.jpg\""));
    }

    #[test]
    fn broken_source_prefers_storage_url_from_document() {
        let md = "![a](null)\n\nsee https://bucket.eu-central-1.linodeobjects.com/uploads/a.jpg";
        let html = render(md);
        let tags = img_tags(&html);
        assert!(tags[0]
            .contains("src=\"https://bucket.eu-central-1.linodeobjects.com/uploads/a.jpg\""));
    }

    #[test]
    fn custom_storage_host_is_used_for_recovery() {
        let renderer = MarkdownRenderer::new()
            .with_storage_host("cdn.example.org")
            .unwrap();
        let html = renderer
            .render(&RawMarkdown::from(
                "![a](undefined) https://media.cdn.example.org/p/1.png",
            ))
            .into_string();
        assert!(html.contains("src=\"https://media.cdn.example.org/p/1.png\""));
    }

    #[test]
    fn every_image_has_exactly_one_fallback() {
        let md = "![plain](a.png)\n\n![Logo{modal}](logo.png)\n\n<img src=\"/c.png\" onerror=\"retry()\">";
        let html = render(md);
        let tags = img_tags(&html);
        assert_eq!(tags.len(), 3);
        for tag in tags {
            assert_eq!(tag.matches(" onerror=\"").count(), 1, "{tag}");
        }
    }

    #[test]
    fn relative_image_paths_are_rooted() {
        let html = render("![pic](images/pic.png)");
        assert!(html.contains("src=\"/images/pic.png\""));
    }

    #[test]
    fn parser_error_yields_placeholder_paragraph() {
        let renderer = MarkdownRenderer::new().with_parser(FailingParser);
        assert_eq!(
            renderer.render(&RawMarkdown::from("# hi")).as_str(),
            RENDER_ERROR_HTML
        );
    }

    #[test]
    fn parser_panic_yields_placeholder_paragraph() {
        let renderer = MarkdownRenderer::new().with_parser(PanickingParser);
        assert_eq!(
            renderer.render(&RawMarkdown::from("# hi")).as_str(),
            RENDER_ERROR_HTML
        );
    }

    #[test]
    fn expanders_can_be_replaced() {
        let renderer = MarkdownRenderer::new().with_expanders(vec![Box::new(ModalShortcode)]);
        let html = renderer
            .render(&RawMarkdown::from("![Team{gallery}](a.jpg)"))
            .into_string();
        assert!(!html.contains("markdown-gallery"));
    }
}
