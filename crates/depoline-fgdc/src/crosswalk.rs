//! FGDC fields to a Zenodo deposition payload

use chrono::{Datelike, NaiveDate};
use depoline_core::{Payload, RecordDescriptor, TransformError, Transformed};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::parser::FgdcRecord;

const VAGUE_DATES: &[&str] = &["varies", "unknown", "not specified", "present", "none"];
const STATUS_DATES: &[&str] = &["planned", "unpublished", "unpublished material", "in work"];
const ORGANIZATION_MARKERS: &[&str] = &[
    "noaa",
    "national oceanic",
    "university of",
    "institute",
    "center",
    "centre",
    "laboratory",
    "department",
    "ministry",
    "agency",
    "organization",
    "secretariat",
    "commission",
    "corporation",
    "inc.",
    "ltd.",
    "corp.",
];
const DEFAULT_LICENSE: &str = "cc-zero";

/// Crosswalk settings that do not come from the source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrosswalkOptions {
    /// Zenodo community identifier attached to every deposition.
    pub community: Option<String>,
    /// Publisher note prepended to `notes`.
    pub publisher_note: Option<String>,
}

/// Normalize an FGDC date (`YYYY`, `YYYYMM`, `YYYYMMDD`, ranges, lists) to ISO 8601.
///
/// Ranges and lists use their first date. Status words such as
/// "unpublished" map to January 1st of `current_year`.
pub fn normalize_date(raw: &str, current_year: i32) -> Option<String> {
    let s = raw.trim();
    let lower = s.to_lowercase();
    if s.is_empty() || VAGUE_DATES.contains(&lower.as_str()) {
        return None;
    }
    if STATUS_DATES.contains(&lower.as_str()) {
        return Some(format!("{current_year}-01-01"));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.format("%Y-%m-%d").to_string());
    }

    let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
    let date = match digits.len() {
        8 => NaiveDate::parse_from_str(&digits, "%Y%m%d").ok(),
        6 => NaiveDate::parse_from_str(&format!("{digits}01"), "%Y%m%d").ok(),
        4 => NaiveDate::from_ymd_opt(digits.parse().ok()?, 1, 1),
        _ => None,
    };
    date.filter(|d| (1000..=9999).contains(&d.year()))
        .map(|d| d.format("%Y-%m-%d").to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    pub name: String,
    pub organization: bool,
}

pub fn is_organization(name: &str) -> bool {
    let lower = name.to_lowercase();
    ORGANIZATION_MARKERS.iter().any(|m| lower.contains(m))
}

/// `Family, Given` for people; organizations verbatim.
pub fn format_creator(origin: &str) -> Creator {
    let origin = origin.trim();
    if is_organization(origin) {
        return Creator {
            name: origin.to_string(),
            organization: true,
        };
    }
    let name = match origin.split_once(',') {
        Some((family, given)) if !given.trim().is_empty() => {
            format!("{}, {}", family.trim(), given.trim())
        }
        _ => {
            let words: Vec<&str> = origin.split_whitespace().collect();
            match words.split_last() {
                Some((family, given)) if !given.is_empty() => {
                    format!("{family}, {}", given.join(" "))
                }
                _ => {
                    log::debug!("creator name kept as-is: {origin}");
                    origin.to_string()
                }
            }
        }
    };
    Creator {
        name,
        organization: false,
    }
}

/// Split `"A and B"` originators into separate creators.
fn creators(originators: &[String]) -> Vec<Creator> {
    let mut out: Vec<Creator> = Vec::new();
    for origin in originators {
        let parts: Vec<&str> = if is_organization(origin) {
            vec![origin.as_str()]
        } else {
            origin.split(" and ").collect()
        };
        for part in parts.into_iter().filter(|p| !p.trim().is_empty()) {
            let c = format_creator(part);
            if !out.iter().any(|o| o.name == c.name) {
                out.push(c);
            }
        }
    }
    out
}

fn detect_license(use_constraints: Option<&str>) -> &'static str {
    let Some(text) = use_constraints else {
        return DEFAULT_LICENSE;
    };
    let lower = text.to_lowercase().replace(['-', '_'], " ");
    if lower.contains("cc by") || lower.contains("creative commons attribution") {
        "cc-by-4.0"
    } else {
        DEFAULT_LICENSE
    }
}

/// Build the deposition payload and the matching descriptor.
pub fn crosswalk(
    record: &FgdcRecord,
    options: &CrosswalkOptions,
    current_year: i32,
) -> Result<Transformed, TransformError> {
    let title = record.title.clone().ok_or(TransformError::Missing("title"))?;
    let creators = creators(&record.originators);
    if creators.is_empty() {
        return Err(TransformError::Missing("originator"));
    }
    let publication_date = record
        .pubdate
        .as_deref()
        .and_then(|d| normalize_date(d, current_year))
        .or_else(|| {
            let fallback = record
                .metadata_date
                .as_deref()
                .and_then(|d| normalize_date(d, current_year))?;
            log::debug!("'{title}': using metadata date as publication date");
            Some(fallback)
        })
        .ok_or(TransformError::Missing("publication date"))?;

    let description = record
        .abstract_text
        .clone()
        .or_else(|| record.purpose.clone())
        .or_else(|| record.supplemental.clone())
        .unwrap_or_else(|| format!("Dataset: {title}"));

    let mut keywords = record.theme_keywords.clone();
    for place in &record.place_keywords {
        if !keywords.contains(place) {
            keywords.push(place.clone());
        }
    }

    let mut notes: Vec<String> = options.publisher_note.iter().cloned().collect();
    if !record.online_links.is_empty() {
        notes.push(format!("Online linkage: {}", record.online_links.join(", ")));
    }

    let mut metadata = json!({
        "title": title,
        "upload_type": "dataset",
        "publication_date": publication_date,
        "creators": creators
            .iter()
            .map(|c| json!({ "name": c.name }))
            .collect::<Vec<_>>(),
        "description": description,
        "access_right": "open",
        "license": detect_license(record.use_constraints.as_deref()),
        "keywords": keywords,
    });
    if !notes.is_empty() {
        metadata["notes"] = Value::String(notes.join("\n\n"));
    }
    if let Some(community) = &options.community {
        metadata["communities"] = json!([{ "identifier": community }]);
    }

    let body = json!({ "metadata": metadata }).to_string();
    let payload = Payload::from_json(body).map_err(|e| TransformError::Parse(e.to_string()))?;
    let descriptor = RecordDescriptor {
        title,
        abstract_text: Some(description),
        creators: creators.into_iter().map(|c| c.name).collect(),
        keywords,
        doi: None,
    };
    Ok(Transformed {
        payload,
        descriptor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FgdcRecord {
        FgdcRecord {
            title: Some("Salmon weir counts".into()),
            abstract_text: Some("Daily counts.".into()),
            originators: vec!["Jane Smith and Ken Doe".into()],
            pubdate: Some("199706".into()),
            theme_keywords: vec!["salmon".into()],
            place_keywords: vec!["Yukon".into(), "salmon".into()],
            ..FgdcRecord::default()
        }
    }

    #[test]
    fn dates() {
        assert_eq!(normalize_date("2003", 2026).as_deref(), Some("2003-01-01"));
        assert_eq!(normalize_date("200302", 2026).as_deref(), Some("2003-02-01"));
        assert_eq!(normalize_date("20030215", 2026).as_deref(), Some("2003-02-15"));
        assert_eq!(normalize_date("2003-02-15", 2026).as_deref(), Some("2003-02-15"));
        assert_eq!(normalize_date("1950-1980", 2026).as_deref(), Some("1950-01-01"));
        assert_eq!(normalize_date("19970101-20021231", 2026).as_deref(), Some("1997-01-01"));
        assert_eq!(normalize_date("1991, 1992", 2026).as_deref(), Some("1991-01-01"));
        assert_eq!(normalize_date("Unpublished", 2026).as_deref(), Some("2026-01-01"));
        assert_eq!(normalize_date("Unknown", 2026), None);
        assert_eq!(normalize_date("20031340", 2026), None);
    }

    #[test]
    fn creator_names() {
        assert_eq!(format_creator("Jane Q. Smith").name, "Smith, Jane Q.");
        assert_eq!(format_creator("Smith,Jane").name, "Smith, Jane");
        assert_eq!(format_creator("Plato").name, "Plato");
        let org = format_creator("Alaska Fisheries Science Center");
        assert!(org.organization);
        assert_eq!(org.name, "Alaska Fisheries Science Center");
    }

    #[test]
    fn builds_payload() {
        let options = CrosswalkOptions {
            community: Some("pices".into()),
            publisher_note: Some("Migrated from the PICES metadata archive.".into()),
        };
        let t = crosswalk(&record(), &options, 2026).unwrap();
        let body: Value = serde_json::from_str(t.payload.body()).unwrap();
        let m = &body["metadata"];
        assert_eq!(m["upload_type"], "dataset");
        assert_eq!(m["access_right"], "open");
        assert_eq!(m["license"], "cc-zero");
        assert_eq!(m["publication_date"], "1997-06-01");
        assert_eq!(m["creators"][0]["name"], "Smith, Jane");
        assert_eq!(m["creators"][1]["name"], "Doe, Ken");
        assert_eq!(m["keywords"], json!(["salmon", "Yukon"]));
        assert_eq!(m["communities"][0]["identifier"], "pices");
        assert_eq!(m["notes"], "Migrated from the PICES metadata archive.");
        assert_eq!(t.descriptor.creators, ["Smith, Jane", "Doe, Ken"]);
        assert_eq!(t.descriptor.abstract_text.as_deref(), Some("Daily counts."));
    }

    #[test]
    fn missing_title_fails() {
        let r = FgdcRecord {
            title: None,
            ..record()
        };
        assert!(matches!(
            crosswalk(&r, &CrosswalkOptions::default(), 2026),
            Err(TransformError::Missing("title"))
        ));
    }

    #[test]
    fn metadata_date_fallback() {
        let r = FgdcRecord {
            pubdate: Some("Unknown".into()),
            metadata_date: Some("20040301".into()),
            ..record()
        };
        let t = crosswalk(&r, &CrosswalkOptions::default(), 2026).unwrap();
        let body: Value = serde_json::from_str(t.payload.body()).unwrap();
        assert_eq!(body["metadata"]["publication_date"], "2004-03-01");
    }

    #[test]
    fn description_falls_back_to_title() {
        let r = FgdcRecord {
            abstract_text: None,
            ..record()
        };
        let t = crosswalk(&r, &CrosswalkOptions::default(), 2026).unwrap();
        assert_eq!(t.descriptor.abstract_text.as_deref(), Some("Dataset: Salmon weir counts"));
    }

    #[test]
    fn license_detection() {
        assert_eq!(detect_license(Some("CC-BY 4.0")), "cc-by-4.0");
        assert_eq!(detect_license(Some("None")), "cc-zero");
        assert_eq!(detect_license(None), "cc-zero");
    }
}
