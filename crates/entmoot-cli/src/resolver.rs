//! Module resolution over a directory search path.
//!
//! `a.b` resolves to the first of `<dir>/a/b.json` or `<dir>/a/b/__init__.json`
//! found in a search directory, each file holding a JSON-encoded `Module`.

use std::fs;
use std::path::{Path, PathBuf};

use entmoot::ast;
use entmoot::{ModuleResolver, Object, ProcessContext, ResolveError};

/// Where a module's source lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A plain module file
    Module(PathBuf),
    /// A package's `__init__.json`
    Package(PathBuf),
}

impl Location {
    /// The file to read.
    pub fn path(&self) -> &Path {
        match self {
            Location::Module(path) | Location::Package(path) => path,
        }
    }
}

/// Resolver reading JSON module files from search directories.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Search `dirs` in order.
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        SearchPath { dirs }
    }

    /// The first file providing `name`.
    pub fn locate(&self, name: &str) -> Option<Location> {
        let relative: PathBuf = name.split('.').collect();
        self.dirs.iter().find_map(|dir| {
            let base = dir.join(&relative);
            let module = base.with_extension("json");
            if module.is_file() {
                return Some(Location::Module(module));
            }
            let package = base.join("__init__.json");
            package.is_file().then_some(Location::Package(package))
        })
    }
}

/// Read and decode a JSON `Module` file.
pub fn read_module(name: &str, path: &Path) -> Result<ast::Module, ResolveError> {
    let source = fs::read_to_string(path).map_err(|source| ResolveError::Io {
        name: name.to_string(),
        source,
    })?;
    serde_json::from_str(&source).map_err(|error| ResolveError::Syntax {
        name: name.to_string(),
        message: format!("{}: {}", path.display(), error),
    })
}

impl ModuleResolver for SearchPath {
    fn resolve_module(&self, process: &ProcessContext, name: &str) -> Result<Object, ResolveError> {
        let location = self.locate(name).ok_or_else(|| ResolveError::NotFound {
            name: name.to_string(),
        })?;
        tracing::debug!(module = name, path = %location.path().display(), "resolved module");
        let body = read_module(name, location.path())?;
        let module = match location {
            Location::Module(_) => process.load_module(name, &body)?,
            Location::Package(_) => process.load_package(name, &body)?,
        };
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scratch(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("entmoot-resolver-{}-{}", label, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_locate_prefers_module_file() {
        let dir = scratch("module");
        fs::create_dir_all(dir.join("pkg/sub")).unwrap();
        fs::write(dir.join("pkg/__init__.json"), r#"{"body":[]}"#).unwrap();
        fs::write(dir.join("pkg/sub.json"), r#"{"body":[]}"#).unwrap();
        fs::write(dir.join("pkg/sub/__init__.json"), r#"{"body":[]}"#).unwrap();

        let search = SearchPath::new(vec![dir.clone()]);
        assert_eq!(search.locate("pkg"), Some(Location::Package(dir.join("pkg/__init__.json"))));
        assert_eq!(search.locate("pkg.sub"), Some(Location::Module(dir.join("pkg/sub.json"))));
        assert_eq!(search.locate("missing"), None);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_read_module_reports_bad_json() {
        let dir = scratch("syntax");
        let path = dir.join("broken.json");
        fs::write(&path, "{not json").unwrap();
        let error = read_module("broken", &path).unwrap_err();
        assert!(matches!(error, ResolveError::Syntax { ref name, .. } if name == "broken"));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_read_module_missing_file() {
        let error = read_module("gone", Path::new("/nonexistent/entmoot/gone.json")).unwrap_err();
        assert!(matches!(error, ResolveError::Io { .. }));
    }
}
