//! XNAT REST identity backend
//!
//! Resolves a session to its subject label in two requests:
//!
//! 1. `GET {url}/data/projects/{project}/experiments/{session}?format=json`
//!    gives the subject accession id (`items[0].data_fields.subject_ID`)
//! 2. `GET {url}/data/projects/{project}/subjects/{subject_ID}?format=json`
//!    gives the subject label (`items[0].data_fields.label`)

use crate::credentials::XnatCredentials;
use crate::error::IdentityError;
use crate::identity::IdentityResolver;
use log::debug;
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::time::Duration;

/// Request timeout for REST calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for REST calls
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Subject lookup through the XNAT REST API
pub struct XnatResolver {
    client: Client,
    base: Url,
    username: String,
    password: String,
}

impl XnatResolver {
    /// Create a resolver for the server named in `credentials`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(credentials: &XnatCredentials) -> Result<Self, IdentityError> {
        let base = Url::parse(&credentials.url)
            .map_err(|e| IdentityError::InvalidUrl(format!("{}: {e}", credentials.url)))?;
        if base.cannot_be_a_base() {
            return Err(IdentityError::InvalidUrl(credentials.url.clone()));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
    }

    /// REST URL for `/data/projects/{project}/{kind}/{id}?format=json`
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot take path segments.
    pub fn resource_url(&self, project: &str, kind: &str, id: &str) -> Result<Url, IdentityError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| IdentityError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(["data", "projects", project, kind, id]);
        url.query_pairs_mut().append_pair("format", "json");
        Ok(url)
    }

    /// GET a JSON resource; `Ok(None)` on 404
    fn get_json(&self, url: Url) -> Result<Option<Value>, IdentityError> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .send()?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json()?)),
            status => Err(IdentityError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }
}

impl IdentityResolver for XnatResolver {
    fn name(&self) -> &'static str {
        "xnat"
    }

    fn lookup(&mut self, project: &str, session: &str) -> Result<Option<String>, IdentityError> {
        let url = self.resource_url(project, "experiments", session)?;
        let Some(accession) = self.get_json(url)?.as_ref().and_then(subject_id) else {
            return Ok(None);
        };

        let url = self.resource_url(project, "subjects", &accession)?;
        Ok(self.get_json(url)?.as_ref().and_then(subject_label))
    }
}

/// `items[0].data_fields.{field}` of an XNAT JSON payload
fn data_field(payload: &Value, field: &str) -> Option<String> {
    payload
        .get("items")?
        .get(0)?
        .get("data_fields")?
        .get(field)?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Subject accession id of an experiment payload
#[must_use]
pub fn subject_id(experiment: &Value) -> Option<String> {
    data_field(experiment, "subject_ID")
}

/// Label of a subject payload
#[must_use]
pub fn subject_label(subject: &Value) -> Option<String> {
    data_field(subject, "label")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver(url: &str) -> XnatResolver {
        XnatResolver::new(&XnatCredentials {
            url: url.to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_subject_id() {
        let payload = json!({
            "items": [{
                "meta": {"xsi:type": "xnat:mrSessionData"},
                "data_fields": {
                    "ID": "XNAT_E00042",
                    "label": "test001_MR_1",
                    "project": "burcs",
                    "subject_ID": "XNAT_S00017"
                }
            }]
        });
        assert_eq!(subject_id(&payload).as_deref(), Some("XNAT_S00017"));
    }

    #[test]
    fn test_subject_label() {
        let payload = json!({
            "items": [{"data_fields": {"ID": "XNAT_S00017", "label": "test001"}}]
        });
        assert_eq!(subject_label(&payload).as_deref(), Some("test001"));
    }

    #[test]
    fn test_malformed_payloads() {
        assert_eq!(subject_id(&json!({})), None);
        assert_eq!(subject_id(&json!({"items": []})), None);
        assert_eq!(subject_id(&json!({"items": [{"data_fields": {}}]})), None);
        assert_eq!(subject_id(&json!({"items": [{"data_fields": {"subject_ID": 7}}]})), None);
        assert_eq!(subject_label(&json!({"items": [{"data_fields": {"label": ""}}]})), None);
    }

    #[test]
    fn test_resource_url() {
        let xnat = resolver("https://xnat.example.org");
        let url = xnat.resource_url("burcs", "experiments", "test001_MR_1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://xnat.example.org/data/projects/burcs/experiments/test001_MR_1?format=json"
        );
    }

    #[test]
    fn test_resource_url_with_prefix_and_escaping() {
        let xnat = resolver("https://example.org/xnat/");
        let url = xnat.resource_url("my proj", "subjects", "a/b").unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.org/xnat/data/projects/my%20proj/subjects/a%2Fb?format=json"
        );
    }

    #[test]
    fn test_invalid_url() {
        let result = XnatResolver::new(&XnatCredentials {
            url: "not a url".to_string(),
            username: String::new(),
            password: String::new(),
        });
        assert!(matches!(result, Err(IdentityError::InvalidUrl(_))));
    }
}
