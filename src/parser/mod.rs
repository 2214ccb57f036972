pub mod extract;
pub mod markup;

use extract::{CardSelectors, Extraction};
use tracing::info;

/// Two passes: raw bytes → document tree → event records.
pub fn process_page(body: &[u8], selectors: &CardSelectors) -> Extraction {
    let doc = markup::parse_document(body);
    let extraction = extract::extract_events(&doc, selectors);
    info!(
        "Found {} event cards",
        extraction.outcomes.len() + extraction.skipped
    );
    extraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::CardLayout;

    #[test]
    fn every_card_is_an_outcome_or_skipped() {
        let html = std::fs::read("tests/fixtures/programacao.html").unwrap();
        let selectors = CardSelectors::compile(&CardLayout::default()).unwrap();
        let ex = process_page(&html, &selectors);
        assert_eq!(ex.outcomes.len() + ex.skipped, 6);
    }
}
