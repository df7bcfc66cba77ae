use std::path::Path;

use regex::Regex;

use super::{has_extension, EndpointExtractor};
use crate::core::endpoint::{ContentStyle, Endpoint, HttpMethod, ParamType, Parameter};
use crate::errors::ParseSkipped;

/// Finds `@app.route(...)` / `@bp.route(...)` routes in Python sources.
///
/// The route body (text up to the next route decorator) is searched for
/// `request.args` / `request.form` / `request.values` / JSON accesses to
/// pick up query and body parameters.
pub struct FlaskExtractor {
    decorator: Regex,
    path_literal: Regex,
    methods: Regex,
    verb: Regex,
    converter: Regex,
    request_get: Regex,
    request_index: Regex,
    json_access: Regex,
}

impl FlaskExtractor {
    pub fn new() -> Self {
        Self {
            decorator: Regex::new(r"@\s*[A-Za-z_][A-Za-z0-9_]*\.route\s*\(([^)]*)\)")
                .expect("static decorator regex"),
            path_literal: Regex::new(r#"^\s*[rbu]?['"]([^'"]*)['"]"#).expect("static path regex"),
            methods: Regex::new(r"methods\s*=\s*[\[(]([^\])]*)").expect("static methods regex"),
            verb: Regex::new(r#"['"]([A-Za-z]+)['"]"#).expect("static verb regex"),
            converter: Regex::new(r"<(?:([A-Za-z_]+):)?([A-Za-z_][A-Za-z0-9_]*)>")
                .expect("static converter regex"),
            request_get: Regex::new(
                r#"request\.(args|form|values|json)\.get\(\s*['"]([A-Za-z_][A-Za-z0-9_]*)['"]"#,
            )
            .expect("static request regex"),
            request_index: Regex::new(
                r#"request\.(args|form|values|json)\[\s*['"]([A-Za-z_][A-Za-z0-9_]*)['"]\s*\]"#,
            )
            .expect("static request index regex"),
            json_access: Regex::new(
                r#"get_json\([^)]*\)\s*(?:\.get\(|\[)\s*['"]([A-Za-z_][A-Za-z0-9_]*)['"]"#,
            )
            .expect("static json regex"),
        }
    }

    fn route_parameters(&self, route_path: &str) -> Vec<Parameter> {
        self.converter
            .captures_iter(route_path)
            .map(|cap| {
                let ty = match cap.get(1).map(|m| m.as_str()) {
                    Some("int") => ParamType::Integer,
                    None | Some("string") | Some("path") => ParamType::String,
                    Some(_) => ParamType::Unknown,
                };
                Parameter::new(&cap[2], ty)
            })
            .collect()
    }

    /// Request parameters read in `body`, plus whether any came from JSON.
    fn body_parameters(&self, body: &str) -> (Vec<Parameter>, bool) {
        let mut params = Vec::new();
        let mut json = false;

        for re in [&self.request_get, &self.request_index] {
            for cap in re.captures_iter(body) {
                if &cap[1] == "json" {
                    json = true;
                }
                params.push(Parameter::new(&cap[2], ParamType::String));
            }
        }
        for cap in self.json_access.captures_iter(body) {
            json = true;
            params.push(Parameter::new(&cap[1], ParamType::String));
        }

        (params, json)
    }
}

impl Default for FlaskExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointExtractor for FlaskExtractor {
    fn name(&self) -> &'static str {
        "flask"
    }

    fn accepts(&self, path: &Path) -> bool {
        has_extension(path, &["py"])
    }

    fn extract(&self, _path: &Path, content: &str) -> Result<Vec<Endpoint>, ParseSkipped> {
        let decorators: Vec<_> = self.decorator.captures_iter(content).collect();
        let mut endpoints: Vec<Endpoint> = Vec::new();

        for (i, cap) in decorators.iter().enumerate() {
            let args = &cap[1];
            let Some(path_cap) = self.path_literal.captures(args) else {
                continue;
            };
            let route_path = path_cap[1].trim();
            if route_path.is_empty() {
                continue;
            }

            let mut endpoint = Endpoint::new(route_path);

            match self.methods.captures(args) {
                Some(m) => {
                    for v in self.verb.captures_iter(&m[1]) {
                        endpoint = endpoint.with_method(HttpMethod::parse(&v[1].to_ascii_uppercase()));
                    }
                }
                None => endpoint = endpoint.with_method(HttpMethod::Get),
            }

            for p in self.route_parameters(route_path) {
                endpoint = endpoint.with_parameter(p);
            }

            let body_start = cap.get(0).map(|m| m.end()).unwrap_or(content.len());
            let body_end = decorators
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(content.len());
            let (params, json) = self.body_parameters(&content[body_start..body_end]);
            for p in params {
                endpoint = endpoint.with_parameter(p);
            }
            if json {
                endpoint = endpoint.with_content_style(ContentStyle::Json);
            }

            match endpoints.iter_mut().find(|e| e.path == endpoint.path) {
                Some(existing) => existing.merge(endpoint),
                None => endpoints.push(endpoint),
            }
        }

        Ok(endpoints)
    }
}
