//! Zenodo deposition API client

use depoline_core::http::{self, HttpResponse};
use depoline_core::{
    CallError, CatalogClient, Deposit, Environment, Payload, RelatedIdentifier, RemoteRecord,
    SearchQuery,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::token::{api_url, load_token};

/// Deposition as returned by `deposit/depositions`.
#[derive(Debug, Deserialize)]
struct Deposition {
    id: u64,
    #[serde(default)]
    state: String,
    doi: Option<String>,
    #[serde(default)]
    links: Links,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    html: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    title: String,
    description: Option<String>,
    #[serde(default)]
    creators: Vec<Creator>,
    #[serde(default)]
    keywords: Vec<String>,
    doi: Option<String>,
    prereserve_doi: Option<PrereserveDoi>,
}

#[derive(Debug, Deserialize)]
struct Creator {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PrereserveDoi {
    doi: Option<String>,
}

impl Deposition {
    /// Minted DOI if any, else the reserved one.
    fn doi(&self) -> Option<String> {
        [
            self.doi.as_deref(),
            self.metadata.doi.as_deref(),
            self.metadata.prereserve_doi.as_ref().and_then(|p| p.doi.as_deref()),
        ]
        .into_iter()
        .flatten()
        .find(|d| !d.is_empty())
        .map(String::from)
    }

    fn into_deposit(self) -> Deposit {
        Deposit {
            remote_id: self.id.to_string(),
            persistent_identifier: self.doi(),
            state: self.state,
        }
    }

    fn into_remote(self) -> RemoteRecord {
        let doi = self.doi();
        RemoteRecord {
            remote_id: self.id.to_string(),
            title: self.metadata.title,
            description: self.metadata.description,
            creators: self.metadata.creators.into_iter().map(|c| c.name).collect(),
            keywords: self.metadata.keywords,
            doi,
            url: self.links.html,
            state: Some(self.state).filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<FieldError>,
}

#[derive(Deserialize)]
struct FieldError {
    field: Option<String>,
    message: Option<String>,
}

/// Human-readable reason from an error response: `message - field: msg; ...`.
pub fn error_reason(status: u16, body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return format!("HTTP {status}: {}", http::truncate_body(body, 300));
    };
    let Some(message) = parsed.message else {
        return format!("HTTP {status}: {}", http::truncate_body(body, 300));
    };
    let details: Vec<String> = parsed
        .errors
        .into_iter()
        .map(|e| match (e.field, e.message) {
            (Some(f), Some(m)) => format!("{f}: {m}"),
            (None, Some(m)) => m,
            (Some(f), None) => f,
            (None, None) => "unspecified error".to_string(),
        })
        .collect();
    if details.is_empty() {
        message
    } else {
        format!("{message} - {}", details.join("; "))
    }
}

/// Request body for create/update with curator-approved links merged into
/// `metadata.related_identifiers`.
pub fn request_body(payload: &Payload) -> Result<String, CallError> {
    if payload.related_identifiers.is_empty() {
        return Ok(payload.body().to_string());
    }
    let invalid = |message: &str| CallError::Validation {
        status: 400,
        message: message.to_string(),
    };
    let mut body: Value =
        serde_json::from_str(payload.body()).map_err(|_| invalid("payload body is not valid JSON"))?;
    let root = body
        .as_object_mut()
        .ok_or_else(|| invalid("payload body is not a JSON object"))?;
    let metadata = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| invalid("payload metadata is not a JSON object"))?;
    let related = metadata
        .entry("related_identifiers")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| invalid("related_identifiers is not a list"))?;
    for link in &payload.related_identifiers {
        let present = related
            .iter()
            .any(|r| r.get("identifier").and_then(Value::as_str) == Some(link.identifier.as_str()));
        if !present {
            related.push(related_value(link));
        }
    }
    Ok(body.to_string())
}

fn related_value(link: &RelatedIdentifier) -> Value {
    let mut v = Map::new();
    v.insert("identifier".into(), Value::String(link.identifier.clone()));
    v.insert("relation".into(), Value::String(link.relation.clone()));
    if let Some(scheme) = &link.scheme {
        v.insert("scheme".into(), Value::String(scheme.clone()));
    }
    Value::Object(v)
}

/// Elasticsearch-style title query with quotes stripped from the title.
fn title_query(title: &str) -> String {
    format!("title:\"{}\"", title.replace(['"', '\\'], " ").trim())
}

pub struct ZenodoClient {
    api_url: String,
    token: String,
}

impl ZenodoClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Client for `env` with the token from its environment variable.
    pub fn from_env(env: Environment) -> anyhow::Result<Self> {
        let token = load_token(env)?;
        log::debug!("zenodo client for {env} at {}", api_url(env));
        Ok(Self::new(api_url(env), token))
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.api_url)
    }

    fn execute(&self, request: reqwest::RequestBuilder) -> Result<HttpResponse, CallError> {
        let request = request
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json");
        let response = http::send(request)?;
        if response.is_success() {
            Ok(response)
        } else {
            let reason = error_reason(response.status, &response.body);
            Err(response.into_error(reason))
        }
    }

    fn send_json(&self, request: reqwest::RequestBuilder, body: String) -> Result<HttpResponse, CallError> {
        self.execute(
            request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body),
        )
    }
}

impl CatalogClient for ZenodoClient {
    fn create(&self, payload: &Payload) -> Result<Deposit, CallError> {
        let body = request_body(payload)?;
        let request = http::http_client().post(self.url("deposit/depositions"));
        let deposition: Deposition = self.send_json(request, body)?.json()?;
        log::debug!("created deposition {}", deposition.id);
        Ok(deposition.into_deposit())
    }

    fn update(&self, remote_id: &str, payload: &Payload) -> Result<Deposit, CallError> {
        let body = request_body(payload)?;
        let request = http::http_client().put(self.url(&format!("deposit/depositions/{remote_id}")));
        let deposition: Deposition = self.send_json(request, body)?.json()?;
        Ok(deposition.into_deposit())
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<RemoteRecord>, CallError> {
        let params = [
            ("q", title_query(&query.title)),
            ("size", query.max_results.clamp(1, 100).to_string()),
        ];
        let request = http::http_client()
            .get(self.url("deposit/depositions"))
            .query(&params);
        let hits: Vec<Deposition> = self.execute(request)?.json()?;
        Ok(hits.into_iter().map(Deposition::into_remote).collect())
    }

    fn get(&self, remote_id: &str) -> Result<RemoteRecord, CallError> {
        let request = http::http_client().get(self.url(&format!("deposit/depositions/{remote_id}")));
        let deposition: Deposition = self.execute(request)?.json()?;
        Ok(deposition.into_remote())
    }

    fn publish(&self, remote_id: &str) -> Result<Deposit, CallError> {
        let request = http::http_client().post(self.url(&format!(
            "deposit/depositions/{remote_id}/actions/publish"
        )));
        let deposition: Deposition = self.execute(request)?.json()?;
        Ok(deposition.into_deposit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_reason_with_field_errors() {
        let body = r#"{"status":400,"message":"Validation error.",
            "errors":[{"field":"metadata.creators","message":"Missing data for required field."},
                      {"message":"Bad date"}]}"#;
        assert_eq!(
            error_reason(400, body),
            "Validation error. - metadata.creators: Missing data for required field.; Bad date"
        );
    }

    #[test]
    fn error_reason_message_only() {
        assert_eq!(error_reason(403, r#"{"message":"Permission denied."}"#), "Permission denied.");
    }

    #[test]
    fn error_reason_non_json() {
        assert_eq!(error_reason(502, "<html>Bad Gateway</html>"), "HTTP 502: <html>Bad Gateway</html>");
    }

    #[test]
    fn body_unchanged_without_links() {
        let p = Payload::from_json(r#"{"metadata":{"title":"T"}}"#.into()).unwrap();
        assert_eq!(request_body(&p).unwrap(), r#"{"metadata":{"title":"T"}}"#);
    }

    #[test]
    fn links_merged_without_duplicates() {
        let p = Payload::from_json(
            r#"{"metadata":{"title":"T","related_identifiers":[{"identifier":"10.1/a","relation":"cites"}]}}"#
                .into(),
        )
        .unwrap()
        .with_related_identifiers(vec![
            RelatedIdentifier {
                identifier: "10.1/a".into(),
                relation: "isAlternativeIdentifierOf".into(),
                scheme: Some("doi".into()),
            },
            RelatedIdentifier {
                identifier: "10.1/b".into(),
                relation: "isAlternativeIdentifierOf".into(),
                scheme: Some("doi".into()),
            },
        ]);
        let body: Value = serde_json::from_str(&request_body(&p).unwrap()).unwrap();
        let related = body["metadata"]["related_identifiers"].as_array().unwrap();
        assert_eq!(related.len(), 2);
        assert_eq!(related[0]["relation"], "cites");
        assert_eq!(related[1]["identifier"], "10.1/b");
        assert_eq!(related[1]["scheme"], "doi");
    }

    #[test]
    fn links_on_non_object_body_rejected() {
        let p = Payload::from_json("[1,2]".into())
            .unwrap()
            .with_related_identifiers(vec![RelatedIdentifier {
                identifier: "x".into(),
                relation: "isAlternativeIdentifierOf".into(),
                scheme: None,
            }]);
        assert!(matches!(request_body(&p), Err(CallError::Validation { .. })));
    }

    #[test]
    fn deposition_prefers_minted_doi() {
        let d: Deposition = serde_json::from_str(
            r#"{"id":42,"state":"done","doi":"10.5281/zenodo.42",
                "metadata":{"title":"T","prereserve_doi":{"doi":"10.5281/zenodo.41"}}}"#,
        )
        .unwrap();
        let deposit = d.into_deposit();
        assert_eq!(deposit.remote_id, "42");
        assert_eq!(deposit.persistent_identifier.as_deref(), Some("10.5281/zenodo.42"));
    }

    #[test]
    fn draft_uses_reserved_doi() {
        let d: Deposition = serde_json::from_str(
            r#"{"id":7,"state":"unsubmitted","doi":"",
                "links":{"html":"https://sandbox.zenodo.org/deposit/7"},
                "metadata":{"title":"Kelp","creators":[{"name":"Doe, A."}],"keywords":["kelp"],
                            "prereserve_doi":{"doi":"10.5072/zenodo.7"}}}"#,
        )
        .unwrap();
        let remote = d.into_remote();
        assert_eq!(remote.doi.as_deref(), Some("10.5072/zenodo.7"));
        assert_eq!(remote.creators, ["Doe, A."]);
        assert_eq!(remote.state.as_deref(), Some("unsubmitted"));
        assert_eq!(remote.url.as_deref(), Some("https://sandbox.zenodo.org/deposit/7"));
    }

    #[test]
    fn title_query_strips_quotes() {
        assert_eq!(title_query("A \"quoted\" title"), "title:\"A  quoted  title\"");
    }

    #[test]
    fn trailing_slash_trimmed() {
        let c = ZenodoClient::new("https://example.org/api/", "t");
        assert_eq!(c.url("deposit/depositions"), "https://example.org/api/deposit/depositions");
    }
}
