use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Input for a LinkedIn content-search actor. The actor scrapes the given
/// search results URL and returns at most `max_results` posts.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedInSearchInput {
    #[serde(rename = "searchUrl")]
    pub search_url: String,
    #[serde(rename = "maxResults")]
    pub max_results: u32,
}

/// A single LinkedIn post from the actor's dataset.
/// Actors in this family disagree on field names, so everything is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkedInPost {
    pub urn: Option<String>,
    pub id: Option<String>,
    pub url: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "authorName")]
    pub author_name: Option<String>,
    #[serde(rename = "authorProfileUrl")]
    pub author_profile_url: Option<String>,
    #[serde(rename = "authorHeadline")]
    pub author_headline: Option<String>,
    #[serde(rename = "postedAtISO")]
    pub posted_at_iso: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(rename = "postedAtTimestamp")]
    pub posted_at_timestamp: Option<i64>,
}

impl LinkedInPost {
    /// Stable identifier, preferring the activity URN.
    pub fn external_id(&self) -> Option<&str> {
        self.urn
            .as_deref()
            .or(self.id.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Publication time from whichever field the actor populated.
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        if let Some(iso) = self.posted_at_iso.as_deref() {
            if let Ok(dt) = DateTime::parse_from_rfc3339(iso) {
                return Some(dt.with_timezone(&Utc));
            }
        }
        self.posted_at_timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Public handle from a profile URL like "https://www.linkedin.com/in/jane-doe/".
    pub fn author_handle(&self) -> Option<String> {
        let url = self.author_profile_url.as_deref()?;
        let idx = url.find("/in/")?;
        let handle = url[idx + 4..]
            .split(['/', '?'])
            .next()
            .unwrap_or_default();
        (!handle.is_empty()).then(|| handle.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(json: serde_json::Value) -> LinkedInPost {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn external_id_prefers_urn() {
        let p = post(serde_json::json!({"urn": "urn:li:activity:1", "id": "1"}));
        assert_eq!(p.external_id(), Some("urn:li:activity:1"));

        let p = post(serde_json::json!({"id": "42"}));
        assert_eq!(p.external_id(), Some("42"));

        let p = post(serde_json::json!({"urn": ""}));
        assert_eq!(p.external_id(), None);
    }

    #[test]
    fn posted_at_falls_back_to_millis() {
        let p = post(serde_json::json!({"postedAtTimestamp": 1_700_000_000_000i64}));
        assert_eq!(p.posted_at().unwrap().timestamp(), 1_700_000_000);

        let p = post(serde_json::json!({"postedAtISO": "2024-05-01T10:00:00Z"}));
        assert_eq!(p.posted_at().unwrap().timestamp(), 1_714_557_600);
    }

    #[test]
    fn handle_from_profile_url() {
        let p = post(serde_json::json!({
            "authorProfileUrl": "https://www.linkedin.com/in/jane-doe/?trk=abc"
        }));
        assert_eq!(p.author_handle().as_deref(), Some("jane-doe"));

        let p = post(serde_json::json!({"authorProfileUrl": "https://www.linkedin.com/company/acme"}));
        assert_eq!(p.author_handle(), None);
    }
}
