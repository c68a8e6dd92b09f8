//! Google Admin Directory client over `ureq`.
//!
//! Calls are blocking and run on tokio's blocking pool. Every HTTP failure is
//! classified into a [`DirectoryError`]; retry decisions are left to the sync.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use roster_core::types::{Group, GroupId, Member, User, UserId};
use roster_core::{DirectoryClient, DirectoryError};

const DIRECTORY_API: &str = "https://admin.googleapis.com/admin/directory/v1";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const PAGE_SIZE: &str = "200";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `errors[].reason` values that mean "rate limited" on a 403.
const QUOTA_REASONS: &[&str] = &["quotaExceeded", "rateLimitExceeded", "userRateLimitExceeded"];

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: String,
}

/// Directory client authenticated with a bearer token.
pub struct GoogleDirectory {
    agent: ureq::Agent,
    token: String,
}

impl GoogleDirectory {
    pub fn new(token: String) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self { agent, token }
    }

    async fn get(
        &self,
        url: String,
        query: Vec<(String, String)>,
    ) -> Result<Value, DirectoryError> {
        let agent = self.agent.clone();
        let token = self.token.clone();
        tokio::task::spawn_blocking(move || get_json(&agent, &token, &url, &query))
            .await
            .map_err(|e| DirectoryError::Other(format!("request task failed: {e}")))?
    }

    /// Follow `nextPageToken` until the listing is exhausted.
    async fn list_all<T>(
        &self,
        url: String,
        query: Vec<(String, String)>,
        field: &'static str,
    ) -> Result<Vec<T>, DirectoryError>
    where
        T: DeserializeOwned + Send,
    {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut page_query = query.clone();
            page_query.push(("maxResults".to_string(), PAGE_SIZE.to_string()));
            if let Some(token) = &page_token {
                page_query.push(("pageToken".to_string(), token.clone()));
            }
            tracing::debug!(url = %url, page = ?page_token, "fetching page");
            let body = self.get(url.clone(), page_query).await?;
            let (page, next) = parse_page::<T>(body, field)?;
            items.extend(page);
            match next {
                Some(next) => page_token = Some(next),
                None => return Ok(items),
            }
        }
    }
}

#[async_trait]
impl DirectoryClient for GoogleDirectory {
    async fn resolve_domain(&self, identity: Option<&str>) -> Result<String, DirectoryError> {
        if let Some(domain) = identity.and_then(domain_of) {
            return Ok(domain.to_string());
        }
        let info = self.get(USERINFO_URL.to_string(), Vec::new()).await?;
        info.get("hd")
            .and_then(Value::as_str)
            .filter(|hd| !hd.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                DirectoryError::Other(
                    "credentials carry no hosted domain; set `domain` in the config".to_string(),
                )
            })
    }

    async fn list_groups(&self, domain: &str) -> Result<Vec<Group>, DirectoryError> {
        let query = vec![("domain".to_string(), domain.to_string())];
        self.list_all(format!("{DIRECTORY_API}/groups"), query, "groups")
            .await
    }

    async fn list_members(&self, group: &GroupId) -> Result<Vec<Member>, DirectoryError> {
        self.list_all(
            format!("{DIRECTORY_API}/groups/{group}/members"),
            Vec::new(),
            "members",
        )
        .await
    }

    async fn get_user(&self, user: &UserId) -> Result<User, DirectoryError> {
        let body = self
            .get(format!("{DIRECTORY_API}/users/{user}"), Vec::new())
            .await?;
        serde_json::from_value(body)
            .map_err(|e| DirectoryError::Other(format!("unexpected user payload for {user}: {e}")))
    }
}

fn get_json(
    agent: &ureq::Agent,
    token: &str,
    url: &str,
    query: &[(String, String)],
) -> Result<Value, DirectoryError> {
    let mut request = agent
        .get(url)
        .set("Authorization", &format!("Bearer {token}"));
    for (key, value) in query {
        request = request.query(key, value);
    }
    match request.call() {
        Ok(response) => response
            .into_json::<Value>()
            .map_err(|e| DirectoryError::Backend(format!("unreadable response from {url}: {e}"))),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(classify(status, &body))
        }
        Err(ureq::Error::Transport(transport)) => {
            Err(DirectoryError::Backend(transport.to_string()))
        }
    }
}

/// Map an HTTP failure onto the retry classes.
fn classify(status: u16, body: &str) -> DirectoryError {
    let parsed = serde_json::from_str::<ApiErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .map(|envelope| envelope.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "no error details".to_string());
    let rate_limited = parsed.as_ref().is_some_and(|envelope| {
        envelope
            .error
            .errors
            .iter()
            .any(|item| QUOTA_REASONS.contains(&item.reason.as_str()))
    });

    match status {
        429 => DirectoryError::QuotaExceeded(message),
        403 if rate_limited => DirectoryError::QuotaExceeded(message),
        404 => DirectoryError::NotFound(message),
        500..=599 => DirectoryError::Backend(message),
        _ => DirectoryError::Other(format!("HTTP {status}: {message}")),
    }
}

/// Items under `field` plus the next page token, if any.
fn parse_page<T: DeserializeOwned>(
    mut body: Value,
    field: &str,
) -> Result<(Vec<T>, Option<String>), DirectoryError> {
    let next = body
        .get("nextPageToken")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string);
    let items = match body.get_mut(field).map(Value::take) {
        Some(items) => serde_json::from_value(items)
            .map_err(|e| DirectoryError::Other(format!("unexpected {field} payload: {e}")))?,
        None => Vec::new(),
    };
    Ok((items, next))
}

fn domain_of(identity: &str) -> Option<&str> {
    identity
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rate_limits_are_quota_errors() {
        assert!(matches!(classify(429, ""), DirectoryError::QuotaExceeded(_)));
        let body = json!({
            "error": {
                "code": 403,
                "message": "Quota exceeded for quota metric 'Queries'",
                "errors": [{ "reason": "rateLimitExceeded" }]
            }
        })
        .to_string();
        assert_eq!(
            classify(403, &body),
            DirectoryError::QuotaExceeded("Quota exceeded for quota metric 'Queries'".into())
        );
    }

    #[test]
    fn plain_forbidden_is_not_retryable() {
        let body = json!({
            "error": { "code": 403, "message": "Not Authorized", "errors": [{ "reason": "forbidden" }] }
        })
        .to_string();
        let err = classify(403, &body);
        assert!(matches!(err, DirectoryError::Other(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn status_classes() {
        assert!(matches!(classify(404, "not json"), DirectoryError::NotFound(_)));
        assert!(matches!(classify(503, ""), DirectoryError::Backend(_)));
        assert_eq!(
            classify(400, ""),
            DirectoryError::Other("HTTP 400: no error details".into())
        );
    }

    #[test]
    fn page_items_and_token() {
        let body = json!({
            "kind": "admin#directory#members",
            "members": [
                { "id": "u1", "etag": "\"m1\"", "email": "ada@example.com", "role": "OWNER", "type": "USER" }
            ],
            "nextPageToken": "abc"
        });
        let (members, next) = parse_page::<Member>(body, "members").unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].member_type.as_deref(), Some("USER"));
        assert_eq!(next.as_deref(), Some("abc"));
    }

    #[test]
    fn empty_listing_has_no_field() {
        let body = json!({ "kind": "admin#directory#groups" });
        let (groups, next) = parse_page::<Group>(body, "groups").unwrap();
        assert!(groups.is_empty());
        assert!(next.is_none());
    }

    #[test]
    fn identity_domain() {
        assert_eq!(domain_of("admin@example.com"), Some("example.com"));
        assert_eq!(domain_of("admin@"), None);
        assert_eq!(domain_of("admin"), None);
    }

    #[tokio::test]
    async fn identity_resolves_domain_without_a_call() {
        let client = GoogleDirectory::new("unused".to_string());
        let domain = client
            .resolve_domain(Some("admin@example.com"))
            .await
            .unwrap();
        assert_eq!(domain, "example.com");
    }
}
