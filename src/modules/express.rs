use std::path::Path;

use regex::Regex;

use super::{has_extension, EndpointExtractor};
use crate::core::endpoint::{ContentStyle, Endpoint, HttpMethod, ParamType, Parameter};
use crate::errors::ParseSkipped;

/// Finds `app.<verb>('<path>', ...)` / `router.<verb>(...)` routes in
/// JavaScript and TypeScript sources.
///
/// `:name` path segments become parameters, as do `req.query.x`,
/// `req.body.x` and `req.params.x` accesses in the route's handler, taken
/// to be everything up to the next route registration.
pub struct ExpressExtractor {
    route: Regex,
    path_param: Regex,
    access: Regex,
}

impl ExpressExtractor {
    pub fn new() -> Self {
        Self {
            route: Regex::new(
                r#"(?i)\b(?:app|router)\.(get|post|put|delete|patch|options|head|all)\s*\(\s*(['"])([^'"\n]*)['"]\s*[,)]"#,
            )
            .expect("static route regex"),
            path_param: Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("static param regex"),
            access: Regex::new(r"\breq\.(query|body|params)\.([A-Za-z_][A-Za-z0-9_]*)")
                .expect("static access regex"),
        }
    }
}

impl Default for ExpressExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointExtractor for ExpressExtractor {
    fn name(&self) -> &'static str {
        "express"
    }

    fn accepts(&self, path: &Path) -> bool {
        has_extension(path, &["js", "mjs", "cjs", "ts"])
    }

    fn extract(&self, _path: &Path, content: &str) -> Result<Vec<Endpoint>, ParseSkipped> {
        let json_body = content.contains("express.json(");
        let routes: Vec<_> = self.route.captures_iter(content).collect();

        let mut endpoints: Vec<Endpoint> = Vec::new();
        for (i, cap) in routes.iter().enumerate() {
            let route_path = cap[3].trim();
            if route_path.is_empty() {
                continue;
            }
            let verb = cap[1].to_ascii_uppercase();

            let mut endpoint = Endpoint::new(route_path);
            if verb == "ALL" {
                endpoint = endpoint.with_method(HttpMethod::Get).with_method(HttpMethod::Post);
            } else {
                endpoint = endpoint.with_method(HttpMethod::parse(&verb));
            }
            for p in self.path_param.captures_iter(route_path) {
                endpoint = endpoint.with_parameter(Parameter::new(&p[1], ParamType::String));
            }

            // handler text runs until the next route registration
            let start = cap.get(0).map_or(0, |m| m.end());
            let end = routes
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(content.len(), |m| m.start());
            let mut uses_body = false;
            for access in self.access.captures_iter(&content[start..end]) {
                if &access[1] == "body" {
                    uses_body = true;
                }
                endpoint = endpoint.with_parameter(Parameter::new(&access[2], ParamType::String));
            }
            if uses_body && json_body {
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
