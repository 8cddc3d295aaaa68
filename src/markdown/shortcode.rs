use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::trace;

use super::{escape_attr, RenderError, PLACEHOLDER_IMAGE};

pub const DEFAULT_GALLERY_COLUMNS: u32 = 3;

lazy_static! {
    static ref GALLERY_RE: Regex =
        Regex::new(r"!\[([^\]]*?)\{gallery(?::(\d+))?\}([^\]]*)\]\(([^)]+)\)").unwrap();
    static ref MODAL_RE: Regex =
        Regex::new(r"!\[([^\]]*?)\{modal\}([^\]]*)\]\(([^)]+)\)").unwrap();
}

/// A pre-parse rewrite of custom image syntax into literal HTML.
///
/// Expanders run over raw markdown, in the order the renderer holds them,
/// before the markdown parser sees the text.
pub trait ShortcodeExpander: Send + Sync {
    fn name(&self) -> &'static str;
    fn expand(&self, markdown: &str) -> Result<String, RenderError>;
}

/// `![Title{gallery:N}](a.jpg, b.jpg)` becomes a placeholder container that
/// client-side script turns into a grid.
#[derive(Debug, Default, Clone, Copy)]
pub struct GalleryShortcode;

/// `![Alt{modal}](url)` becomes a preview-sized image that opens a lightbox.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModalShortcode;

#[derive(Debug, Serialize)]
struct GalleryImage<'a> {
    src: &'a str,
}

impl ShortcodeExpander for GalleryShortcode {
    fn name(&self) -> &'static str {
        "gallery"
    }

    fn expand(&self, markdown: &str) -> Result<String, RenderError> {
        try_replace_all(&GALLERY_RE, markdown, |caps| {
            let title = format!("{}{}", &caps[1], &caps[3]);
            let title = title.trim();
            let columns = caps
                .get(2)
                .and_then(|raw| raw.as_str().parse::<u32>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_GALLERY_COLUMNS);
            let images: Vec<GalleryImage<'_>> = caps[4]
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(|src| GalleryImage { src })
                .collect();
            trace!(title, columns, count = images.len(), "expanding gallery shortcode");

            let images_json = serde_json::to_string(&images)?
                .replace('&', "&amp;")
                .replace('\'', "&apos;");

            let mut html = format!(
                "<div class=\"markdown-gallery\" data-gallery=\"true\" data-images='{images_json}' data-columns=\"{columns}\">\n"
            );
            if !title.is_empty() {
                html.push_str(&format!(
                    "<h4 class=\"gallery-title\">{}</h4>\n",
                    escape_attr(title)
                ));
            }
            html.push_str("</div>");
            Ok(html)
        })
    }
}

impl ShortcodeExpander for ModalShortcode {
    fn name(&self) -> &'static str {
        "modal"
    }

    fn expand(&self, markdown: &str) -> Result<String, RenderError> {
        try_replace_all(&MODAL_RE, markdown, |caps| {
            let alt = format!("{}{}", &caps[1], &caps[2]);
            let alt = escape_attr(alt.trim());
            let url = escape_attr(caps[3].trim());
            trace!(%alt, %url, "expanding modal shortcode");

            Ok(format!(
                "<img src=\"{url}\" alt=\"{alt}\" class=\"markdown-image markdown-modal-image cursor-pointer hover:opacity-90 hover:scale-105 transition-all duration-300 rounded-lg shadow-md max-w-sm mx-auto block\" style=\"max-height: 300px; object-fit: cover;\" data-modal=\"true\" data-modal-src=\"{url}\" data-modal-alt=\"{alt}\" onerror=\"this.onerror=null; this.src='{PLACEHOLDER_IMAGE}';\" />"
            ))
        })
    }
}

/// `Regex::replace_all` with a replacement that can fail.
fn try_replace_all<F>(re: &Regex, text: &str, mut replace: F) -> Result<String, RenderError>
where
    F: FnMut(&Captures<'_>) -> Result<String, RenderError>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&replace(&caps)?);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}
