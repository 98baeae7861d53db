use ammonia::Builder;
use comrak::{markdown_to_html, Options};
use std::collections::HashSet;

/// Tags allowed in post bodies and forum descriptions on top of ammonia's
/// defaults.
const CONTENT_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "pre", "code", "blockquote", "hr", "table", "thead",
    "tbody", "tr", "th", "td", "img", "input", "del", "s", "details", "summary", "sup", "sub",
];

/// Signatures are shown under every post, so block-level and media tags are
/// stripped.
const SIGNATURE_DENIED_TAGS: &[&str] = &["img", "h1", "h2", "h3", "table", "pre", "hr"];

fn comrak_options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.extension.superscript = true;
    // ammonia sanitizes whatever raw HTML comrak lets through
    options.render.unsafe_ = true;
    options
}

fn sanitizer() -> Builder<'static> {
    let mut builder = Builder::default();
    builder.add_tags(CONTENT_TAGS.iter().copied());
    builder.add_tag_attributes("a", &["href", "title"]);
    builder.add_tag_attributes("img", &["src", "alt", "title"]);
    builder.add_tag_attributes("code", &["class"]);
    builder.add_tag_attributes("input", &["type", "checked", "disabled"]);
    builder.add_tag_attributes("td", &["align"]);
    builder.add_tag_attributes("th", &["align"]);
    builder.url_schemes(["http", "https", "mailto"].into_iter().collect::<HashSet<_>>());
    builder.link_rel(Some("noopener noreferrer nofollow"));
    builder
}

/// Render post content or a forum description to sanitized HTML.
pub fn render_markdown(raw: &str) -> String {
    let html = markdown_to_html(raw, &comrak_options());
    sanitizer().clean(&html).to_string()
}

/// Render a member signature with a reduced tag set.
pub fn render_signature(raw: &str) -> String {
    let html = markdown_to_html(raw, &comrak_options());
    let mut builder = sanitizer();
    builder.rm_tags(SIGNATURE_DENIED_TAGS.iter().copied());
    builder.clean(&html).to_string()
}
