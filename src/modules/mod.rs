pub mod endpoint_list;
pub mod express;
pub mod flask;
pub mod generator;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::core::endpoint::Endpoint;
use crate::errors::ParseSkipped;

pub use endpoint_list::EndpointListExtractor;
pub use express::ExpressExtractor;
pub use flask::FlaskExtractor;

/// Framework-specific endpoint discovery.
///
/// Implementations must not panic on malformed input; a file they cannot
/// make sense of is reported as `ParseSkipped`.
pub trait EndpointExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this extractor wants to look at `path`.
    fn accepts(&self, path: &Path) -> bool;

    fn extract(&self, path: &Path, content: &str) -> Result<Vec<Endpoint>, ParseSkipped>;
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Endpoints found in a set of sources plus every file that was skipped.
#[derive(Debug, Default)]
pub struct Extraction {
    pub endpoints: Vec<Endpoint>,
    pub skipped: Vec<ParseSkipped>,
}

/// Directory names never descended into while walking a source tree.
pub const DEFAULT_IGNORED_DIRS: [&str; 4] = ["__pycache__", ".git", "node_modules", "venv"];

/// Walks source files and directories through a set of extractors.
///
/// Routes discovered more than once (same path) are merged into a single
/// endpoint, keeping first-seen order.
pub struct SourceTree {
    extractors: Vec<Box<dyn EndpointExtractor>>,
    ignored_dirs: Vec<String>,
}

impl SourceTree {
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Every bundled extractor.
    pub fn with_default_extractors() -> Self {
        Self::new()
            .with_extractor(Box::new(EndpointListExtractor))
            .with_extractor(Box::new(ExpressExtractor::new()))
            .with_extractor(Box::new(FlaskExtractor::new()))
    }

    pub fn with_extractor(mut self, extractor: Box<dyn EndpointExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Adds directory names to skip on top of `DEFAULT_IGNORED_DIRS`.
    pub fn with_ignored_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dir in dirs {
            let dir = dir.into();
            if !self.ignored_dirs.contains(&dir) {
                self.ignored_dirs.push(dir);
            }
        }
        self
    }

    pub fn ignored_dirs(&self) -> &[String] {
        &self.ignored_dirs
    }

    pub fn scan<P: AsRef<Path>>(&self, sources: &[P]) -> Extraction {
        let mut extraction = Extraction::default();
        let mut index: HashMap<String, usize> = HashMap::new();

        for source in sources {
            for file in collect_files(source.as_ref(), &self.ignored_dirs, &mut extraction.skipped) {
                for endpoint in self.scan_file(&file, &mut extraction.skipped) {
                    match index.get(&endpoint.path) {
                        Some(&i) => extraction.endpoints[i].merge(endpoint),
                        None => {
                            index.insert(endpoint.path.clone(), extraction.endpoints.len());
                            extraction.endpoints.push(endpoint);
                        }
                    }
                }
            }
        }

        extraction
    }

    fn scan_file(&self, path: &Path, skipped: &mut Vec<ParseSkipped>) -> Vec<Endpoint> {
        let interested: Vec<&dyn EndpointExtractor> = self
            .extractors
            .iter()
            .map(|e| e.as_ref())
            .filter(|e| e.accepts(path))
            .collect();
        if interested.is_empty() {
            return Vec::new();
        }

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                record_skip(skipped, ParseSkipped::new(path, e.to_string()));
                return Vec::new();
            }
        };

        let mut found = Vec::new();
        for extractor in interested {
            match extractor.extract(path, &content) {
                Ok(endpoints) => {
                    debug!(
                        "{} found {} endpoint(s) in {}",
                        extractor.name(),
                        endpoints.len(),
                        path.display()
                    );
                    found.extend(endpoints);
                }
                Err(skip) => record_skip(skipped, skip),
            }
        }
        found
    }
}

impl Default for SourceTree {
    fn default() -> Self {
        Self::with_default_extractors()
    }
}

fn record_skip(skipped: &mut Vec<ParseSkipped>, skip: ParseSkipped) {
    warn!("ParseSkipped: {}", skip);
    skipped.push(skip);
}

/// The walk root itself is never filtered, so an explicitly named ignored
/// directory is still scanned.
fn is_ignored(entry: &DirEntry, ignored: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| ignored.iter().any(|d| d == name))
            .unwrap_or(false)
}

fn collect_files(source: &Path, ignored: &[String], skipped: &mut Vec<ParseSkipped>) -> Vec<PathBuf> {
    if source.is_file() {
        return vec![source.to_path_buf()];
    }
    if !source.exists() {
        record_skip(skipped, ParseSkipped::new(source, "source does not exist"));
        return Vec::new();
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(source)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored(e, ignored));
    for entry in walker {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| source.to_path_buf());
                record_skip(skipped, ParseSkipped::new(path, e.to_string()));
            }
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::endpoint::HttpMethod;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_merges_routes_across_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a.js"),
            "app.get('/items', h);\napp.post('/items', h);\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.py"),
            "@app.route('/items', methods=['GET', 'PUT'])\ndef items():\n    q = request.args.get('q')\n",
        )
        .unwrap();

        let extraction = SourceTree::default().scan(&[dir.path()]);
        assert!(extraction.skipped.is_empty());
        assert_eq!(extraction.endpoints.len(), 1);

        let ep = &extraction.endpoints[0];
        assert!(ep.methods.contains(&HttpMethod::Get));
        assert!(ep.methods.contains(&HttpMethod::Post));
        assert!(ep.methods.contains(&HttpMethod::Other("PUT".to_string())));
        assert_eq!(ep.parameters[0].name, "q");
    }

    #[test]
    fn test_unreadable_file_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.py"), [0xff, 0xfe, 0x00, 0x41]).unwrap();
        fs::write(dir.path().join("good.js"), "app.get('/ok', h)").unwrap();

        let extraction = SourceTree::default().scan(&[dir.path()]);
        assert_eq!(extraction.endpoints.len(), 1);
        assert_eq!(extraction.skipped.len(), 1);
        assert!(extraction.skipped[0].path.ends_with("bad.py"));
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let extraction = SourceTree::default().scan(&["/no/such/source/dir"]);
        assert!(extraction.endpoints.is_empty());
        assert_eq!(extraction.skipped.len(), 1);
    }

    #[test]
    fn test_unclaimed_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("README.md"), "app.get('/nope', h)").unwrap();
        let extraction = SourceTree::default().scan(&[dir.path()]);
        assert!(extraction.endpoints.is_empty());
        assert!(extraction.skipped.is_empty());
    }

    #[test]
    fn test_dependency_and_vcs_dirs_are_not_walked() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.js"), "app.get('/real', h)").unwrap();
        let vendored = dir.path().join("node_modules/express/examples");
        fs::create_dir_all(&vendored).unwrap();
        fs::write(vendored.join("demo.js"), "app.get('/vendored-demo', h)").unwrap();
        fs::write(
            dir.path().join("node_modules/express/package.json"),
            r#"{"name": "express"}"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/hook.py"), "@app.route('/git')\ndef g(): pass\n").unwrap();
        fs::create_dir_all(dir.path().join("venv/lib")).unwrap();
        fs::write(dir.path().join("venv/lib/site.py"), "@app.route('/venv')\ndef v(): pass\n").unwrap();

        let extraction = SourceTree::default().scan(&[dir.path()]);
        let paths: Vec<&str> = extraction.endpoints.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/real"]);
        assert!(extraction.skipped.is_empty());
    }

    #[test]
    fn test_extra_ignored_dirs_and_explicit_root() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("build")).unwrap();
        fs::write(dir.path().join("build/bundle.js"), "app.get('/bundled', h)").unwrap();
        fs::write(dir.path().join("server.js"), "app.get('/served', h)").unwrap();

        let tree = SourceTree::default().with_ignored_dirs(["build"]);
        let paths: Vec<String> = tree
            .scan(&[dir.path()])
            .endpoints
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, vec!["/served"]);

        // naming an ignored directory as the source still scans it
        let explicit = tree.scan(&[dir.path().join("build")]);
        assert_eq!(explicit.endpoints.len(), 1);
        assert_eq!(tree.ignored_dirs().len(), DEFAULT_IGNORED_DIRS.len() + 1);
    }
}
