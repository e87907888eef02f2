//! Paragraph-preserving whitespace normalization.
//!
//! Paragraphs are separated by exactly one blank line, lines inside a
//! paragraph are joined with single spaces, and runs of whitespace collapse.
//! The output is stable: normalizing it again returns it unchanged.

/// Normalize text into paragraphs separated by a single blank line
pub fn normalize_paragraphs(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    split_into_paragraphs(text)
        .iter()
        .map(|paragraph| join_paragraph(paragraph))
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Splits text into paragraphs based on empty lines
pub fn split_into_paragraphs(text: &str) -> Vec<Vec<&str>> {
    let mut paragraphs: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(trimmed);
        }
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
}

/// Joins the lines of one paragraph and collapses whitespace
pub fn join_paragraph(lines: &[&str]) -> String {
    lines
        .iter()
        .flat_map(|line| line.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}
