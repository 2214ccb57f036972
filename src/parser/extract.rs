use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::markup;
use crate::error::ExtractionError;

pub const UNKNOWN_CATEGORY: &str = "Unknown";
pub const NO_IMAGE: &str = "No image";
pub const LOCATION: &str = "Rio de Janeiro";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub name: String,
    pub category: String,
    pub date_text: String,
    pub location: String,
    pub image_ref: String,
}

/// Where the pieces of an event live in the listing markup.
#[derive(Debug, Clone)]
pub struct CardLayout {
    pub card: String,
    pub title: String,
    pub date: String,
    pub category_container: String,
    pub category_label: String,
    pub image_marker: String,
    pub location: String,
}

impl Default for CardLayout {
    fn default() -> Self {
        Self {
            card: "div.card-evento__content".into(),
            title: "h4.titulo".into(),
            date: "p.data".into(),
            category_container: "div.tipo".into(),
            category_label: "p".into(),
            image_marker: "img.attachment-medium_large.size-medium_large.wp-post-image".into(),
            location: LOCATION.into(),
        }
    }
}

pub struct CardSelectors {
    pub card: Selector,
    title: Selector,
    date: Selector,
    category_container: Selector,
    category_label: Selector,
    image_marker: Selector,
    location: String,
}

impl CardSelectors {
    pub fn compile(layout: &CardLayout) -> anyhow::Result<Self> {
        Ok(Self {
            card: markup::selector(&layout.card)?,
            title: markup::selector(&layout.title)?,
            date: markup::selector(&layout.date)?,
            category_container: markup::selector(&layout.category_container)?,
            category_label: markup::selector(&layout.category_label)?,
            image_marker: markup::selector(&layout.image_marker)?,
            location: layout.location.clone(),
        })
    }
}

/// One outcome per event card that carried both a title and a date.
#[derive(Debug, Default)]
pub struct Extraction {
    pub outcomes: Vec<Result<EventRecord, ExtractionError>>,
    /// Cards without a title or date element.
    pub skipped: usize,
}

impl Extraction {
    pub fn records(&self) -> impl Iterator<Item = &EventRecord> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = &ExtractionError> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }

    pub fn into_parts(self) -> (Vec<EventRecord>, Vec<ExtractionError>) {
        let mut records = Vec::new();
        let mut errors = Vec::new();
        for outcome in self.outcomes {
            match outcome {
                Ok(r) => records.push(r),
                Err(e) => errors.push(e),
            }
        }
        (records, errors)
    }
}

/// Walk the document once. The category container and image marker seen most
/// recently before a card are the ones attributed to it.
pub fn extract_events(doc: &Html, sel: &CardSelectors) -> Extraction {
    let mut extraction = Extraction::default();
    let mut category: Option<String> = None;
    // Outer None: no marker seen yet. Inner None: marker without src.
    let mut image: Option<Option<&str>> = None;

    for el in markup::elements(doc) {
        if sel.category_container.matches(&el) {
            category = Some(category_label(el, &sel.category_label));
        }
        if sel.image_marker.matches(&el) {
            image = Some(el.value().attr("src"));
        }
        if !sel.card.matches(&el) {
            continue;
        }

        let (Some(title), Some(date)) = (el.select(&sel.title).next(), el.select(&sel.date).next())
        else {
            debug!("Skipping event card without title or date");
            extraction.skipped += 1;
            continue;
        };

        let outcome = build_record(title, date, category.as_deref(), image, &sel.location);
        if let Err(e) = &outcome {
            warn!("{}", e);
        }
        extraction.outcomes.push(outcome);
    }

    info!(
        "Extracted {} events ({} errors, {} skipped cards)",
        extraction.records().count(),
        extraction.errors().count(),
        extraction.skipped
    );
    extraction
}

fn category_label(container: ElementRef, label: &Selector) -> String {
    container
        .select(label)
        .next()
        .map(markup::normalized_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
}

fn build_record(
    title: ElementRef,
    date: ElementRef,
    category: Option<&str>,
    image: Option<Option<&str>>,
    location: &str,
) -> Result<EventRecord, ExtractionError> {
    let name = markup::normalized_text(title);
    if name.is_empty() {
        return Err(ExtractionError::new("event card has an empty title"));
    }

    let image_ref = match image {
        None => NO_IMAGE.to_string(),
        Some(Some(src)) => src.to_string(),
        Some(None) => {
            return Err(ExtractionError::new(format!(
                "image preceding {:?} has no src attribute",
                name
            )))
        }
    };

    Ok(EventRecord {
        name,
        category: category.unwrap_or(UNKNOWN_CATEGORY).to_string(),
        date_text: markup::raw_text(date),
        location: location.to_string(),
        image_ref,
    })
}
