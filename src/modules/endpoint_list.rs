//! JSON endpoint lists, the interchange format other discovery tools emit:
//!
//! ```json
//! [{"path": "/search", "methods": ["GET"], "parameters": [{"name": "q", "type": "string"}]}]
//! ```
//!
//! `parameters` may also be plain names or a `{name: example}` object, and
//! the legacy `POSTJSON` verb means POST with a JSON body.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::{has_extension, EndpointExtractor};
use crate::core::endpoint::{ContentStyle, Endpoint, HttpMethod, ParamType, Parameter};
use crate::errors::ParseSkipped;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEndpoint {
    path: String,
    #[serde(default)]
    methods: Vec<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default, alias = "params")]
    parameters: Option<Value>,
    #[serde(default)]
    content_style: Option<ContentStyle>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawParameter {
    Name(String),
    Typed {
        name: String,
        #[serde(default, alias = "inferred_type", alias = "inferredType")]
        r#type: Option<String>,
    },
}

pub struct EndpointListExtractor;

impl EndpointExtractor for EndpointListExtractor {
    fn name(&self) -> &'static str {
        "endpoint-list"
    }

    fn accepts(&self, path: &Path) -> bool {
        has_extension(path, &["json"])
    }

    fn extract(&self, path: &Path, content: &str) -> Result<Vec<Endpoint>, ParseSkipped> {
        let raw: Vec<RawEndpoint> = serde_json::from_str(content)
            .map_err(|e| ParseSkipped::new(path, format!("not an endpoint list: {}", e)))?;
        Ok(raw.into_iter().filter_map(convert).collect())
    }
}

/// Parses an endpoint list from a string, outside of any source tree.
pub fn parse_endpoint_list(content: &str) -> Result<Vec<Endpoint>, serde_json::Error> {
    let raw: Vec<RawEndpoint> = serde_json::from_str(content)?;
    Ok(raw.into_iter().filter_map(convert).collect())
}

fn convert(raw: RawEndpoint) -> Option<Endpoint> {
    if raw.path.trim().is_empty() {
        return None;
    }

    let mut endpoint = Endpoint::new(raw.path.trim());
    let mut style = raw.content_style.unwrap_or_default();

    let verbs = raw.methods.iter().chain(raw.method.iter());
    let mut any_verb = false;
    for verb in verbs {
        any_verb = true;
        let upper = verb.trim().to_ascii_uppercase();
        if upper == "POSTJSON" {
            style = ContentStyle::Json;
            endpoint = endpoint.with_method(HttpMethod::Post);
        } else {
            endpoint = endpoint.with_method(HttpMethod::parse(&upper));
        }
    }
    if !any_verb {
        endpoint = endpoint.with_method(HttpMethod::Get);
    }

    for parameter in convert_parameters(raw.parameters) {
        endpoint = endpoint.with_parameter(parameter);
    }

    Some(endpoint.with_content_style(style))
}

fn convert_parameters(value: Option<Value>) -> Vec<Parameter> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<RawParameter>(item).ok())
            .map(|p| match p {
                RawParameter::Name(name) => Parameter::new(name, ParamType::Unknown),
                RawParameter::Typed { name, r#type } => Parameter::new(
                    name,
                    r#type.as_deref().map(ParamType::parse).unwrap_or_default(),
                ),
            })
            .collect(),
        // {"q": "alice", "id": 3}: the example values tell us the type.
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(name, example)| {
                let ty = match example {
                    Value::String(_) => ParamType::String,
                    Value::Number(n) if n.is_i64() || n.is_u64() => ParamType::Integer,
                    _ => ParamType::Unknown,
                };
                Parameter::new(name, ty)
            })
            .collect(),
        _ => Vec::new(),
    }
}
