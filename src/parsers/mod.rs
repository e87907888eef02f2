pub mod html;
pub mod text;


use regex::Regex;
use std::sync::LazyLock;

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?[a-zA-Z][a-zA-Z0-9]*(\s[^<>]*)?/?>").expect("tag pattern is valid")
});

/// Format of a job description as delivered by the feed or the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionFormat {
    Html,
    Plain,
}

impl DescriptionFormat {
    /// Guess the format from the content itself
    pub fn detect(content: &str) -> Self {
        if TAG.is_match(content) {
            ::log::trace!("Description classified as HTML");
            DescriptionFormat::Html
        } else {
            DescriptionFormat::Plain
        }
    }
}

/// Turn a raw description into paragraph text suitable for the resume generator
pub fn clean_description(raw: &str) -> String {
    let text = match DescriptionFormat::detect(raw) {
        DescriptionFormat::Html => html::html_to_text(raw),
        DescriptionFormat::Plain => raw.to_string(),
    };
    text::normalize_paragraphs(&text)
}
