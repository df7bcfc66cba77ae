use std::collections::BTreeMap;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::NoExpand;
use url::Url;

use crate::core::endpoint::{placeholder_regex, ContentStyle, Endpoint, HttpMethod};
use crate::errors::RequestBuildError;
use crate::http::{BodyType, HttpRequest};

/// Candidate injection string. Sent byte-for-byte.
pub type Payload = String;

/// Body excerpts are cut to this many characters.
pub const EXCERPT_LIMIT: usize = 200;

/// Unreserved characters stay literal when a payload lands in a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Payloads chosen for one endpoint, ready to be expanded into tasks.
#[derive(Debug, Clone)]
pub struct PayloadAssignment {
    pub endpoint: Arc<Endpoint>,
    pub payloads: Vec<Payload>,
}

/// One request to send: a single payload injected into every declared
/// parameter of an endpoint, for one method.
#[derive(Debug, Clone)]
pub struct FuzzTask {
    pub id: usize,
    pub endpoint_index: usize,
    pub endpoint: Arc<Endpoint>,
    pub method: HttpMethod,
    pub payload: Payload,
    pub injected_parameters: BTreeMap<String, String>,
}

impl FuzzTask {
    /// Resolves the task against the target base URL.
    ///
    /// Parameters named by a path placeholder are substituted into the path;
    /// the rest go to the query string (GET) or the body (POST).
    pub fn to_request(&self, base: &Url) -> Result<HttpRequest, RequestBuildError> {
        let mut path = self.endpoint.path.clone();
        let mut remaining: Vec<(&str, &str)> = Vec::new();

        for (name, value) in &self.injected_parameters {
            match placeholder_regex(name) {
                Some(re) if re.is_match(&path) => {
                    let encoded = utf8_percent_encode(value, PATH_SEGMENT).to_string();
                    path = re.replace_all(&path, NoExpand(&encoded)).into_owned();
                }
                _ => remaining.push((name.as_str(), value.as_str())),
            }
        }

        let mut url = base.join(&path)?;

        match &self.method {
            HttpMethod::Get => {
                if !remaining.is_empty() {
                    url.query_pairs_mut().extend_pairs(remaining);
                }
                Ok(HttpRequest::get(url))
            }
            HttpMethod::Post => match self.endpoint.content_style {
                ContentStyle::Form => {
                    let body = url::form_urlencoded::Serializer::new(String::new())
                        .extend_pairs(remaining)
                        .finish();
                    Ok(HttpRequest::post(url, body, BodyType::FormUrlEncoded))
                }
                ContentStyle::Json => {
                    let object: BTreeMap<&str, &str> = remaining.into_iter().collect();
                    let body = serde_json::to_string(&object)?;
                    Ok(HttpRequest::post(url, body, BodyType::Json))
                }
            },
            HttpMethod::Other(verb) => Err(RequestBuildError::UnsupportedMethod(verb.clone())),
        }
    }
}

/// Expands payload assignments into tasks, one per (endpoint, method, payload).
///
/// Ids are dense and follow endpoint order, then method order, then payload
/// order, so they double as slot indices when results are regrouped.
pub fn plan_tasks(assignments: &[PayloadAssignment]) -> Vec<FuzzTask> {
    let mut tasks = Vec::new();

    for (endpoint_index, assignment) in assignments.iter().enumerate() {
        let endpoint = &assignment.endpoint;
        if endpoint.parameters.is_empty() {
            continue;
        }
        for method in endpoint.fuzzable_methods() {
            for payload in &assignment.payloads {
                let injected_parameters = endpoint
                    .parameters
                    .iter()
                    .map(|p| (p.name.clone(), payload.clone()))
                    .collect();
                tasks.push(FuzzTask {
                    id: tasks.len(),
                    endpoint_index,
                    endpoint: Arc::clone(endpoint),
                    method: method.clone(),
                    payload: payload.clone(),
                    injected_parameters,
                });
            }
        }
    }

    tasks
}

/// Outcome of one task.
///
/// The executor fills the transport fields; the classifier fills
/// `error_pattern`. A result is flagged exactly when a pattern is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuzzResult {
    pub task_id: usize,
    pub endpoint_index: usize,
    pub method: HttpMethod,
    pub url: String,
    pub payload: Payload,
    pub status_code: Option<u16>,
    pub body_excerpt: String,
    pub error_pattern: Option<String>,
}

impl FuzzResult {
    pub fn completed(task: &FuzzTask, url: &str, status_code: u16, body: &str) -> Self {
        Self::raw(task, url, Some(status_code), excerpt(body))
    }

    /// A request that never produced a usable response. The failure
    /// description takes the place of the body.
    pub fn failed(task: &FuzzTask, url: &str, status_code: Option<u16>, reason: &str) -> Self {
        Self::raw(task, url, status_code, excerpt(reason))
    }

    fn raw(task: &FuzzTask, url: &str, status_code: Option<u16>, body_excerpt: String) -> Self {
        Self {
            task_id: task.id,
            endpoint_index: task.endpoint_index,
            method: task.method.clone(),
            url: url.to_string(),
            payload: task.payload.clone(),
            status_code,
            body_excerpt,
            error_pattern: None,
        }
    }

    pub fn error_detected(&self) -> bool {
        self.error_pattern.is_some()
    }

    pub fn request_failed(&self) -> bool {
        self.status_code.is_none()
    }
}

/// First `EXCERPT_LIMIT` characters of a body.
pub fn excerpt(body: &str) -> String {
    body.chars().take(EXCERPT_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::endpoint::{ParamType, Parameter};

    fn search_endpoint() -> Arc<Endpoint> {
        Arc::new(
            Endpoint::new("/search")
                .with_method(HttpMethod::Get)
                .with_parameter(Parameter::new("q", ParamType::String)),
        )
    }

    fn assignment(endpoint: Arc<Endpoint>, payloads: &[&str]) -> PayloadAssignment {
        PayloadAssignment {
            endpoint,
            payloads: payloads.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_plan_one_task_per_method_and_payload() {
        let both = Arc::new(
            Endpoint::new("/login")
                .with_method(HttpMethod::Get)
                .with_method(HttpMethod::Post)
                .with_method(HttpMethod::Other("PUT".to_string()))
                .with_parameter(Parameter::new("user", ParamType::String))
                .with_parameter(Parameter::new("pass", ParamType::String)),
        );
        let tasks = plan_tasks(&[
            assignment(search_endpoint(), &["'", "\""]),
            assignment(both, &["'", "\"", "' OR '1'='1"]),
        ]);

        assert_eq!(tasks.len(), 2 + 2 * 3);
        let ids: Vec<usize> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
        assert!(tasks[..2].iter().all(|t| t.endpoint_index == 0));
        assert!(tasks[2..].iter().all(|t| t.endpoint_index == 1));
        assert_eq!(tasks[2].injected_parameters.len(), 2);
        assert!(tasks.iter().all(|t| t.method.is_fuzzable()));
    }

    #[test]
    fn test_plan_skips_endpoints_without_parameters() {
        let bare = Arc::new(Endpoint::new("/health").with_method(HttpMethod::Get));
        let tasks = plan_tasks(&[assignment(bare, &["'"]), assignment(search_endpoint(), &["'"])]);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].endpoint_index, 1);
        assert_eq!(tasks[0].id, 0);
    }

    #[test]
    fn test_get_request_carries_payload_in_query() {
        let tasks = plan_tasks(&[assignment(search_endpoint(), &["' OR '1'='1"])]);
        let base = Url::parse("http://localhost:5000/").unwrap();
        let req = tasks[0].to_request(&base).unwrap();

        assert_eq!(req.method, reqwest::Method::GET);
        assert_eq!(req.url.path(), "/search");
        let pairs: Vec<(String, String)> = req.url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("q".to_string(), "' OR '1'='1".to_string())]);
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_post_form_and_json_bodies() {
        let form = Arc::new(
            Endpoint::new("/login")
                .with_method(HttpMethod::Post)
                .with_parameter(Parameter::new("user", ParamType::String)),
        );
        let json = Arc::new(
            Endpoint::new("/api/login")
                .with_method(HttpMethod::Post)
                .with_parameter(Parameter::new("user", ParamType::String))
                .with_content_style(ContentStyle::Json),
        );
        let tasks = plan_tasks(&[assignment(form, &["a'b"]), assignment(json, &["a\"b"])]);
        let base = Url::parse("http://localhost/").unwrap();

        let form_req = tasks[0].to_request(&base).unwrap();
        assert_eq!(form_req.body_type, BodyType::FormUrlEncoded);
        assert_eq!(form_req.body, "user=a%27b");

        let json_req = tasks[1].to_request(&base).unwrap();
        assert_eq!(json_req.body_type, BodyType::Json);
        let value: serde_json::Value = serde_json::from_str(&json_req.body).unwrap();
        assert_eq!(value["user"], "a\"b");
    }

    #[test]
    fn test_path_placeholder_substitution() {
        let ep = Arc::new(
            Endpoint::new("/users/<int:id>/orders")
                .with_method(HttpMethod::Get)
                .with_parameter(Parameter::new("id", ParamType::Integer))
                .with_parameter(Parameter::new("sort", ParamType::String)),
        );
        let tasks = plan_tasks(&[assignment(ep, &["1 OR 1=1"])]);
        let base = Url::parse("http://localhost/").unwrap();
        let req = tasks[0].to_request(&base).unwrap();

        assert_eq!(req.url.path(), "/users/1%20OR%201%3D1/orders");
        assert_eq!(req.url.query(), Some("sort=1+OR+1%3D1"));
    }

    #[test]
    fn test_base_url_join_follows_url_resolution() {
        let tasks = plan_tasks(&[assignment(search_endpoint(), &["x"])]);
        let base = Url::parse("http://localhost:5000/app/").unwrap();
        let req = tasks[0].to_request(&base).unwrap();
        assert_eq!(req.url.path(), "/search");
    }

    #[test]
    fn test_excerpt_is_bounded_by_characters() {
        let body = "é".repeat(500);
        let cut = excerpt(&body);
        assert_eq!(cut.chars().count(), EXCERPT_LIMIT);
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn test_failed_result_has_no_status() {
        let tasks = plan_tasks(&[assignment(search_endpoint(), &["'"])]);
        let result = FuzzResult::failed(&tasks[0], "http://x/search", None, "connection refused");
        assert!(result.request_failed());
        assert!(!result.error_detected());
        assert_eq!(result.body_excerpt, "connection refused");
    }
}
