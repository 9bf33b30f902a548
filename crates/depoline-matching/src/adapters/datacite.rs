//! DataCite works search

use std::time::Duration;

use depoline_core::{CallError, RecordDescriptor};
use serde::Deserialize;

use super::{AdapterConfig, PoliteClient};
use crate::registry::{CandidateRecord, RegistryAdapter};

pub const DATACITE_URL: &str = "https://api.datacite.org/works";

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Vec<Work>,
}

#[derive(Deserialize)]
struct Work {
    id: Option<String>,
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Deserialize, Default)]
struct Attributes {
    doi: Option<String>,
    url: Option<String>,
    #[serde(default)]
    titles: Vec<Title>,
    #[serde(default)]
    creators: Vec<Creator>,
    #[serde(default)]
    descriptions: Vec<Description>,
}

#[derive(Deserialize)]
struct Title {
    title: Option<String>,
}

#[derive(Deserialize)]
struct Creator {
    name: Option<String>,
}

#[derive(Deserialize)]
struct Description {
    description: Option<String>,
}

impl Work {
    fn into_candidate(self) -> Option<CandidateRecord> {
        let a = self.attributes;
        let title = a.titles.into_iter().find_map(|t| t.title)?;
        Some(CandidateRecord {
            identifier: a.doi.clone().or(self.id),
            doi: a.doi,
            title,
            abstract_text: a.descriptions.into_iter().find_map(|d| d.description),
            creators: a.creators.into_iter().filter_map(|c| c.name).collect(),
            url: a.url,
        })
    }
}

fn parse(body: &str) -> Result<Vec<CandidateRecord>, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(body)?;
    Ok(envelope
        .data
        .into_iter()
        .filter_map(Work::into_candidate)
        .collect())
}

/// `title:"..." creator.name:"..." <abstract prefix>`
fn build_query(descriptor: &RecordDescriptor) -> String {
    let mut parts = vec![format!("title:\"{}\"", descriptor.title.replace('"', ""))];
    for creator in descriptor.creators.iter().filter(|c| !c.is_empty()) {
        parts.push(format!("creator.name:\"{}\"", creator.replace('"', "")));
    }
    if let Some(abstract_text) = descriptor.abstract_text.as_deref() {
        parts.push(abstract_text.chars().take(120).collect());
    }
    parts.join(" ")
}

pub struct DataCiteAdapter {
    config: AdapterConfig,
    client: PoliteClient,
}

impl DataCiteAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        let client = PoliteClient::new(config.pause);
        Self { config, client }
    }

    pub fn with_defaults() -> Self {
        Self::new(AdapterConfig {
            base_url: DATACITE_URL.to_string(),
            rows: 25,
            pause: Duration::from_secs(1),
        })
    }
}

impl RegistryAdapter for DataCiteAdapter {
    fn name(&self) -> &str {
        "datacite"
    }

    fn search(&self, descriptor: &RecordDescriptor) -> Result<Vec<CandidateRecord>, CallError> {
        let query = [
            ("query", build_query(descriptor)),
            ("page[size]", self.config.rows.clamp(1, 100).to_string()),
        ];
        let response = self.client.get(self.name(), &self.config.base_url, &query)?;
        parse(&response.body).map_err(|e| CallError::Transient {
            status: Some(response.status),
            message: format!("unexpected datacite response: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_includes_creators_and_abstract_prefix() {
        let d = RecordDescriptor {
            title: "Kelp \"forest\" survey".into(),
            abstract_text: Some("x".repeat(200)),
            creators: vec!["Smith, J.".into(), String::new()],
            ..RecordDescriptor::default()
        };
        let q = build_query(&d);
        assert!(q.starts_with("title:\"Kelp forest survey\" creator.name:\"Smith, J.\" "));
        assert_eq!(q.matches('x').count(), 120);
    }

    #[test]
    fn parses_works() {
        let body = r#"{"data":[
            {"id":"10.5061/dryad.1","attributes":{"doi":"10.5061/dryad.1",
              "titles":[{"title":"Salmon counts"}],"creators":[{"name":"Doe, A."}],
              "descriptions":[{"description":"Weir counts"}],"url":"https://datadryad.org/x"}},
            {"id":"no-title","attributes":{"titles":[]}}
        ]}"#;
        let hits = parse(body).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doi.as_deref(), Some("10.5061/dryad.1"));
        assert_eq!(hits[0].abstract_text.as_deref(), Some("Weir counts"));
        assert_eq!(hits[0].creators, ["Doe, A."]);
    }

    #[test]
    fn empty_response() {
        assert!(parse(r#"{"data":[]}"#).unwrap().is_empty());
    }
}
