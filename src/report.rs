use std::fmt;
use std::time::Duration;

use anyhow::Result;
use rusqlite::Connection;
use serde::{Serialize, Serializer};

use crate::db::{self, Counts, EventRow, MetadataRow};
use crate::parser::extract::LOCATION;
use crate::pipeline::RunSummary;

const SOONEST_LIMIT: usize = 2;
const OPEN_AIR: &str = "open air";
const CINEMA: &str = "cinema";

/// The canned read-back queries, in print order.
#[derive(Debug, Serialize)]
pub struct Report {
    pub all_events: Vec<EventRow>,
    pub soonest: Vec<EventRow>,
    pub in_location: Vec<EventRow>,
    pub open_air: Vec<EventRow>,
    pub cinema: Vec<EventRow>,
    pub metadata: Vec<MetadataRow>,
}

impl Report {
    pub fn collect(conn: &Connection) -> Result<Self> {
        Ok(Self {
            all_events: db::all_events(conn)?,
            soonest: db::soonest_events(conn, SOONEST_LIMIT)?,
            in_location: db::events_in_location(conn, LOCATION)?,
            open_air: db::events_with_category(conn, OPEN_AIR)?,
            cinema: db::events_with_category(conn, CINEMA)?,
            metadata: db::event_metadata(conn)?,
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        event_section(f, "All events with date, location and category", &self.all_events)?;
        event_section(f, "Two events starting soonest", &self.soonest)?;
        event_section(f, &format!("Events in {}", LOCATION), &self.in_location)?;
        event_section(f, "Open air events", &self.open_air)?;
        event_section(f, "Cinema events", &self.cinema)?;

        writeln!(f, "\nMetadata per event:\n")?;
        if self.metadata.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for m in &self.metadata {
            writeln!(f, "  {} | {}", m.name, m.metadata_value)?;
        }
        Ok(())
    }
}

fn event_section(f: &mut fmt::Formatter<'_>, title: &str, rows: &[EventRow]) -> fmt::Result {
    writeln!(f, "\n{}:\n", title)?;
    if rows.is_empty() {
        writeln!(f, "  (none)")?;
    }
    for r in rows {
        writeln!(
            f,
            "  {} | {} | {} | {}",
            r.name, r.date_text, r.location, r.category
        )?;
    }
    Ok(())
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\nFinal report:")?;
        writeln!(f, "Events extracted: {}", self.extracted)?;
        writeln!(f, "Events stored: {}", self.inserted)?;
        writeln!(f, "New events: {}", self.new_events)?;
        writeln!(f, "Skipped cards: {}", self.skipped)?;

        if self.errors.is_empty() {
            return writeln!(f, "\nNo errors found.");
        }
        writeln!(f, "\nErrors found:")?;
        for (i, e) in self.errors.iter().enumerate() {
            writeln!(f, " {:>2}. {}", i + 1, e)?;
        }
        Ok(())
    }
}

/// Everything one command writes to stdout.
#[derive(Serialize)]
pub struct Output<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<&'a Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<&'a RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<&'a Counts>,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
}

impl Output<'_> {
    /// One JSON document, nothing before or after it.
    pub fn render_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for Output<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(report) = self.report {
            write!(f, "{}", report)?;
        }
        if let Some(summary) = self.summary {
            write!(f, "{}", summary)?;
        }
        if let Some(c) = self.counts {
            writeln!(f, "Events:   {}", c.events)?;
            writeln!(f, "Details:  {}", c.details)?;
            writeln!(f, "Metadata: {}", c.metadata)?;
        }
        writeln!(f, "\nTotal execution time: {}", format_duration(self.elapsed))
    }
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractionError, FetchError, RunError};
    use crate::parser::extract::EventRecord;

    fn store_with(events: &[(&str, &str, &str)]) -> Connection {
        let conn = db::connect_in_memory().unwrap();
        db::ensure_schema(&conn).unwrap();
        for (name, category, date) in events {
            let record = EventRecord {
                name: name.to_string(),
                category: category.to_string(),
                date_text: date.to_string(),
                location: LOCATION.to_string(),
                image_ref: "http://x/img.jpg".to_string(),
            };
            db::upsert(&conn, &record).unwrap();
        }
        conn
    }

    #[test]
    fn round_trip_through_all_events() {
        let conn = store_with(&[("Jazz Night", "Música", "2024-05-01")]);
        let report = Report::collect(&conn).unwrap();
        assert_eq!(
            report.all_events,
            vec![EventRow {
                name: "Jazz Night".into(),
                date_text: "2024-05-01".into(),
                location: "Rio de Janeiro".into(),
                category: "Música".into(),
            }]
        );
        assert_eq!(
            report.metadata,
            vec![MetadataRow {
                name: "Jazz Night".into(),
                metadata_value: "http://x/img.jpg".into(),
            }]
        );
    }

    #[test]
    fn soonest_orders_by_date_text() {
        let conn = store_with(&[
            ("A", "Música", "2024-05-01"),
            ("B", "Música", "2024-01-10"),
            ("C", "Música", "2024-03-20"),
        ]);
        let report = Report::collect(&conn).unwrap();
        let dates: Vec<&str> = report.soonest.iter().map(|r| r.date_text.as_str()).collect();
        assert_eq!(dates, vec!["2024-01-10", "2024-03-20"]);
    }

    #[test]
    fn category_filters() {
        let conn = store_with(&[
            ("Mostra Kurosawa", "Cinema", "2024-02-10"),
            ("Jazz no CCBB", "Música", "2024-01-15"),
        ]);
        let report = Report::collect(&conn).unwrap();
        assert!(report.open_air.is_empty());
        assert_eq!(report.cinema.len(), 1);
        assert_eq!(report.cinema[0].name, "Mostra Kurosawa");
        assert_eq!(report.in_location.len(), 2);
    }

    #[test]
    fn text_marks_empty_sections() {
        let conn = store_with(&[("Jazz Night", "Música", "2024-05-01")]);
        let text = Report::collect(&conn).unwrap().to_string();
        assert!(text.contains("Open air events:\n\n  (none)"));
        assert!(text.contains("  Jazz Night | 2024-05-01 | Rio de Janeiro | Música"));
        assert!(text.contains("  Jazz Night | http://x/img.jpg"));
    }

    #[test]
    fn summary_without_errors() {
        let summary = RunSummary {
            extracted: 3,
            inserted: 3,
            new_events: 2,
            ..Default::default()
        };
        let text = summary.to_string();
        assert!(text.contains("Events extracted: 3"));
        assert!(text.contains("Events stored: 3"));
        assert!(text.contains("New events: 2"));
        assert!(text.contains("No errors found."));
    }

    #[test]
    fn summary_lists_errors() {
        let summary = RunSummary {
            errors: vec![RunError::from(ExtractionError::new("event card has an empty title"))],
            ..Default::default()
        };
        let text = summary.to_string();
        assert!(text.contains("Errors found:"));
        assert!(text.contains("  1. failed to process event card: event card has an empty title"));
        assert!(!text.contains("No errors found."));
    }

    #[test]
    fn json_output_is_a_single_document() {
        let conn = store_with(&[("Jazz Night", "Música", "2024-05-01")]);
        let report = Report::collect(&conn).unwrap();
        let summary = RunSummary {
            extracted: 1,
            inserted: 1,
            errors: vec![RunError::from(FetchError::Status {
                status: 503,
                url: "http://x/".into(),
            })],
            ..Default::default()
        };
        let output = Output {
            report: Some(&report),
            summary: Some(&summary),
            counts: None,
            elapsed: Duration::from_millis(1500),
        };

        let json = output.render_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["report"]["all_events"][0]["name"], "Jazz Night");
        assert_eq!(value["report"]["open_air"].as_array().unwrap().len(), 0);
        assert_eq!(value["report"]["metadata"][0]["metadata_value"], "http://x/img.jpg");
        assert_eq!(value["summary"]["extracted"], 1);
        assert_eq!(value["summary"]["errors"][0], "unexpected status 503 from http://x/");
        assert_eq!(value["elapsed_secs"], 1.5);
        assert!(value.get("counts").is_none());
        assert!(!json.contains("Total execution time"));
    }

    #[test]
    fn stats_output_as_json_and_text() {
        let conn = store_with(&[("Jazz Night", "Música", "2024-05-01")]);
        let counts = db::counts(&conn).unwrap();
        let output = Output {
            report: None,
            summary: None,
            counts: Some(&counts),
            elapsed: Duration::from_secs(2),
        };

        let value: serde_json::Value = serde_json::from_str(&output.render_json().unwrap()).unwrap();
        assert_eq!(value["counts"]["events"], 1);
        assert!(value.get("report").is_none());

        let text = output.to_string();
        assert!(text.contains("Events:   1"));
        assert!(text.ends_with("Total execution time: 2.00s\n"));
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }
}
