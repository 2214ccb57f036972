use std::sync::LazyLock;

use anyhow::anyhow;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Parse raw page bytes; invalid UTF-8 is replaced rather than rejected.
pub fn parse_document(body: &[u8]) -> Html {
    Html::parse_document(&String::from_utf8_lossy(body))
}

pub fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {:?}: {:?}", css, e))
}

/// Every element of the document in document order (parents before children).
pub fn elements(doc: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    doc.tree.root().descendants().filter_map(ElementRef::wrap)
}

/// Text content with surrounding whitespace trimmed.
pub fn raw_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Text content trimmed, with inner whitespace runs collapsed to one space.
pub fn normalized_text(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RE.replace_all(s.trim(), " ").into_owned()
}
