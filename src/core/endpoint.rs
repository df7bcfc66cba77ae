use std::collections::BTreeSet;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// HTTP verb declared by an endpoint.
///
/// Only GET and POST have a fuzz strategy. Anything else is kept verbatim so
/// reports and logs still show what the source declared.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Other(String),
}

impl HttpMethod {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            other => HttpMethod::Other(other.to_string()),
        }
    }

    pub fn is_fuzzable(&self) -> bool {
        !matches!(self, HttpMethod::Other(_))
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Other(verb) => write!(f, "{}", verb),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    #[default]
    Unknown,
}

impl ParamType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "str" | "string" | "text" | "path" => ParamType::String,
            "int" | "integer" | "number" | "long" => ParamType::Integer,
            _ => ParamType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub inferred_type: ParamType,
}

impl Parameter {
    pub fn new(name: impl Into<String>, inferred_type: ParamType) -> Self {
        Self {
            name: name.into(),
            inferred_type,
        }
    }
}

/// How POST bodies are encoded for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentStyle {
    #[default]
    Form,
    Json,
}

/// A discovered HTTP route.
///
/// Built up by extractors, then handed to the pipeline and only read from
/// that point on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub path: String,
    pub methods: BTreeSet<HttpMethod>,
    pub parameters: Vec<Parameter>,
    pub content_style: ContentStyle,
}

impl Endpoint {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            methods: BTreeSet::new(),
            parameters: Vec::new(),
            content_style: ContentStyle::default(),
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.methods.insert(method);
        self
    }

    /// Appends a parameter unless one with the same name exists already.
    /// Empty names are dropped.
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.add_parameter(parameter);
        self
    }

    pub fn with_content_style(mut self, style: ContentStyle) -> Self {
        self.content_style = style;
        self
    }

    fn add_parameter(&mut self, parameter: Parameter) {
        if parameter.name.is_empty() {
            return;
        }
        if self.parameters.iter().any(|p| p.name == parameter.name) {
            return;
        }
        self.parameters.push(parameter);
    }

    /// Folds a second discovery of the same route into this one.
    pub fn merge(&mut self, other: Endpoint) {
        self.methods.extend(other.methods);
        for parameter in other.parameters {
            self.add_parameter(parameter);
        }
        if other.content_style == ContentStyle::Json {
            self.content_style = ContentStyle::Json;
        }
    }

    /// Methods that get a GET or POST fuzz strategy, in a stable order.
    pub fn fuzzable_methods(&self) -> impl Iterator<Item = &HttpMethod> {
        self.methods.iter().filter(|m| m.is_fuzzable())
    }

    pub fn has_path_placeholder(&self, name: &str) -> bool {
        placeholder_regex(name)
            .map(|re| re.is_match(&self.path))
            .unwrap_or(false)
    }
}

/// Matches `{name}`, `:name` and `<name>` / `<converter:name>` route placeholders.
pub(crate) fn placeholder_regex(name: &str) -> Option<Regex> {
    let name = regex::escape(name);
    Regex::new(&format!(r"\{{{name}\}}|:{name}\b|<(?:[^:<>]+:)?{name}>")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing_keeps_unknown_verbs() {
        assert_eq!(HttpMethod::parse("GET"), HttpMethod::Get);
        assert_eq!(HttpMethod::parse("POST"), HttpMethod::Post);
        assert_eq!(HttpMethod::parse("PURGE"), HttpMethod::Other("PURGE".to_string()));
        assert!(!HttpMethod::parse("PURGE").is_fuzzable());
        assert_eq!(HttpMethod::parse("PURGE").to_string(), "PURGE");
    }

    #[test]
    fn test_param_type_parsing() {
        assert_eq!(ParamType::parse("int"), ParamType::Integer);
        assert_eq!(ParamType::parse("String"), ParamType::String);
        assert_eq!(ParamType::parse("uuid"), ParamType::Unknown);
    }

    #[test]
    fn test_duplicate_and_empty_parameters_are_dropped() {
        let ep = Endpoint::new("/search")
            .with_parameter(Parameter::new("q", ParamType::String))
            .with_parameter(Parameter::new("q", ParamType::Integer))
            .with_parameter(Parameter::new("", ParamType::String));
        assert_eq!(ep.parameters.len(), 1);
        assert_eq!(ep.parameters[0].inferred_type, ParamType::String);
    }

    #[test]
    fn test_merge_unions_methods_and_parameters() {
        let mut a = Endpoint::new("/users")
            .with_method(HttpMethod::Get)
            .with_parameter(Parameter::new("id", ParamType::Integer));
        let b = Endpoint::new("/users")
            .with_method(HttpMethod::Post)
            .with_parameter(Parameter::new("id", ParamType::String))
            .with_parameter(Parameter::new("name", ParamType::String))
            .with_content_style(ContentStyle::Json);
        a.merge(b);

        assert_eq!(a.methods.len(), 2);
        let names: Vec<_> = a.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(a.content_style, ContentStyle::Json);
    }

    #[test]
    fn test_fuzzable_methods_skip_other_verbs() {
        let ep = Endpoint::new("/x")
            .with_method(HttpMethod::Other("DELETE".to_string()))
            .with_method(HttpMethod::Post)
            .with_method(HttpMethod::Get);
        let methods: Vec<_> = ep.fuzzable_methods().cloned().collect();
        assert_eq!(methods, vec![HttpMethod::Get, HttpMethod::Post]);
    }

    #[test]
    fn test_path_placeholders() {
        assert!(Endpoint::new("/users/{id}").has_path_placeholder("id"));
        assert!(Endpoint::new("/users/:id/posts").has_path_placeholder("id"));
        assert!(Endpoint::new("/users/<int:id>").has_path_placeholder("id"));
        assert!(Endpoint::new("/users/<id>").has_path_placeholder("id"));
        assert!(!Endpoint::new("/users/:idx").has_path_placeholder("id"));
        assert!(!Endpoint::new("/search").has_path_placeholder("q"));
    }
}
