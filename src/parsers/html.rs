use scraper::{ElementRef, Html, Selector};

const TITLE_SELECTORS: &[&str] = &["h1", "[data-hook='job-title']"];

const EMPLOYER_SELECTORS: &[&str] = &[
    "a[href*='/stu/employers/']",
    "a[href*='/e/']",
    "[data-hook='employer-name']",
];

const DESCRIPTION_SELECTORS: &[&str] = &[
    "[data-testid='job-description']",
    "[data-hook='job-description']",
    "main",
];

/// Elements that start a new paragraph when flattened to text
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "ul", "ol", "li", "h1", "h2", "h3", "h4", "h5", "h6",
    "table", "tr", "blockquote", "pre", "header", "footer",
];

/// What can be read off a job page without interacting with it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPageContent {
    pub title: Option<String>,
    pub employer: Option<String>,
    /// Description flattened to paragraph text
    pub description: Option<String>,
}

/// Extracts title, employer and description from a job page
pub fn extract_job_page(html: &str) -> JobPageContent {
    let doc = Html::parse_document(html);

    let content = JobPageContent {
        title: first_text(&doc, TITLE_SELECTORS),
        employer: first_text(&doc, EMPLOYER_SELECTORS),
        description: first_element(&doc, DESCRIPTION_SELECTORS)
            .map(element_text)
            .map(|text| super::text::normalize_paragraphs(&text))
            .filter(|text| !text.is_empty()),
    };

    ::log::debug!(
        "Job page: title={:?} employer={:?} description={} chars",
        content.title,
        content.employer,
        content.description.as_ref().map_or(0, |d| d.len())
    );
    content
}

/// Collects every link on the page whose href contains `needle`, in document order
pub fn links_containing(html: &str, needle: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let links = doc
        .select(&selector)
        .filter_map(|e| e.value().attr("href"))
        .filter(|href| href.contains(needle))
        .map(|s| s.to_string())
        .collect::<Vec<String>>();

    ::log::debug!("Found {} links containing {}", links.len(), needle);
    links
}

/// Rails-style CSRF token the portal expects on API calls
pub fn csrf_token(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("meta[name='csrf-token']").ok()?;
    doc.select(&selector)
        .filter_map(|e| e.value().attr("content"))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

/// Flattens an HTML fragment into text, with blank lines between block elements
pub fn html_to_text(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    element_text(doc.root_element())
}

fn element_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            let name = child.value().name();
            match name {
                "script" | "style" | "noscript" | "template" => continue,
                "br" => {
                    out.push('\n');
                    continue;
                }
                _ => {}
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                out.push_str("\n\n");
            }
            collect_text(child, out);
            if block {
                out.push_str("\n\n");
            }
        }
    }
}

fn first_element<'a>(doc: &'a Html, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|selector_str| {
        let selector = Selector::parse(selector_str).ok()?;
        doc.select(&selector).next()
    })
}

/// Trimmed, whitespace-collapsed text of the first non-empty match
fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    for selector_str in selectors {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        for element in doc.select(&selector) {
            let text = element
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}
