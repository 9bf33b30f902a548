//! Crossref works search (`query.bibliographic`)

use std::time::Duration;

use depoline_core::{CallError, RecordDescriptor};
use serde::Deserialize;

use super::{AdapterConfig, PoliteClient};
use crate::registry::{CandidateRecord, RegistryAdapter};

pub const CROSSREF_URL: &str = "https://api.crossref.org/works";

#[derive(Deserialize)]
struct Envelope {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Deserialize)]
struct Item {
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<Author>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
}

#[derive(Deserialize)]
struct Author {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

impl Author {
    fn display(&self) -> Option<String> {
        let parts: Vec<&str> = [self.given.as_deref(), self.family.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            self.name.clone()
        } else {
            Some(parts.join(" "))
        }
    }
}

impl Item {
    fn into_candidate(self) -> Option<CandidateRecord> {
        let title = self.title.into_iter().find(|t| !t.trim().is_empty())?;
        let doi = self.doi.filter(|d| !d.is_empty());
        Some(CandidateRecord {
            identifier: doi
                .as_ref()
                .map(|d| format!("https://doi.org/{d}"))
                .or_else(|| self.url.clone()),
            doi,
            title,
            abstract_text: self.abstract_text,
            creators: self.author.iter().filter_map(Author::display).collect(),
            url: self.url,
        })
    }
}

fn parse(body: &str) -> Result<Vec<CandidateRecord>, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(body)?;
    Ok(envelope
        .message
        .items
        .into_iter()
        .filter_map(Item::into_candidate)
        .collect())
}

pub struct CrossrefAdapter {
    config: AdapterConfig,
    client: PoliteClient,
    /// Contact address for Crossref's polite pool.
    mailto: Option<String>,
}

impl CrossrefAdapter {
    pub fn new(config: AdapterConfig, mailto: Option<String>) -> Self {
        let client = PoliteClient::new(config.pause);
        Self {
            config,
            client,
            mailto,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            AdapterConfig {
                base_url: CROSSREF_URL.to_string(),
                rows: 20,
                pause: Duration::from_secs(1),
            },
            None,
        )
    }
}

impl RegistryAdapter for CrossrefAdapter {
    fn name(&self) -> &str {
        "crossref"
    }

    fn search(&self, descriptor: &RecordDescriptor) -> Result<Vec<CandidateRecord>, CallError> {
        let mut query = vec![
            ("query.bibliographic", descriptor.title.clone()),
            ("rows", self.config.rows.clamp(1, 100).to_string()),
        ];
        if let Some(mailto) = &self.mailto {
            query.push(("mailto", mailto.clone()));
        }
        log::debug!(
            "crossref search title='{}'",
            descriptor.title.chars().take(60).collect::<String>()
        );
        let response = self.client.get(self.name(), &self.config.base_url, &query)?;
        parse(&response.body).map_err(|e| CallError::Transient {
            status: Some(response.status),
            message: format!("unexpected crossref response: {e}"),
        })
    }
}
