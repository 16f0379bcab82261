//! Application configuration tree.
//!
//! Configuration files are YAML or JSON documents. Options are addressed
//! with dotted paths (`options.views.default`). The parts read by the
//! setup pipeline are:
//!
//! ```yaml
//! classes:
//!   - directory: app/ajax
//!     namespace: App.Ajax
//!     separator: "."
//!     protected: [helper]
//! views:
//!   default:
//!     directory: app/views
//!     extension: html
//!     renderer: soli
//! options:
//!   classes:
//!     App.Ajax.Users:
//!       permissions: [admin]
//!   views:
//!     default: default
//! ```

use std::fs;
use std::path::Path;

use serde_json::{Map, Value as JsonValue};

use crate::error::ConfigError;
use crate::namespace::options::{options_from_json, RegisteredClassOptions};

/// A configuration document with dotted-path access.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    root: JsonValue,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AppConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self {
            root: JsonValue::Object(Map::new()),
        }
    }

    /// Wrap an already parsed document. `null` is treated as empty.
    pub fn from_value(value: JsonValue) -> Result<Self, ConfigError> {
        match value {
            JsonValue::Object(_) => Ok(Self { root: value }),
            JsonValue::Null => Ok(Self::new()),
            _ => Err(ConfigError::NotAMapping),
        }
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let value: JsonValue = serde_yaml::from_str(source)?;
        Self::from_value(value)
    }

    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let value: JsonValue = serde_json::from_str(source)?;
        Self::from_value(value)
    }

    /// Load a configuration file, picking the format from its extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&content),
            "json" => Self::from_json_str(&content),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Borrow the whole document.
    pub fn root(&self) -> &JsonValue {
        &self.root
    }

    /// Look up an option by dotted path.
    pub fn option(&self, path: &str) -> Option<&JsonValue> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.root, |node, segment| node.as_object()?.get(segment))
    }

    pub fn has_option(&self, path: &str) -> bool {
        self.option(path).is_some()
    }

    /// Look up a string option.
    pub fn option_str(&self, path: &str) -> Option<&str> {
        self.option(path).and_then(|value| value.as_str())
    }

    /// Entries of a mapping option, in document order.
    pub fn option_entries(&self, path: &str) -> Vec<(&str, &JsonValue)> {
        self.option(path)
            .and_then(|value| value.as_object())
            .map(|map| map.iter().map(|(k, v)| (k.as_str(), v)).collect())
            .unwrap_or_default()
    }

    /// Set an option, creating intermediate mappings as needed.
    /// Non-mapping values found on the way are replaced.
    pub fn set_option(&mut self, path: &str, value: JsonValue) {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut node = &mut self.root;
        for segment in parents {
            if !node.is_object() {
                *node = JsonValue::Object(Map::new());
            }
            let JsonValue::Object(map) = node else {
                return;
            };
            node = map
                .entry(segment.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
        }

        if !node.is_object() {
            *node = JsonValue::Object(Map::new());
        }
        if let JsonValue::Object(map) = node {
            map.insert(last.to_string(), value);
        }
    }

    /// Per-class registration options (`options.classes`).
    pub fn class_options(&self) -> RegisteredClassOptions {
        self.option("options.classes")
            .map(options_from_json)
            .unwrap_or_default()
    }

    /// Explicitly configured default view namespace (`options.views.default`).
    pub fn default_view_namespace(&self) -> Option<&str> {
        self.option_str("options.views.default")
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
    }
}

/// Default library options, applied without overwriting configured values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryOptions {
    /// Serve the generated javascript from a separate file.
    pub extern_js: bool,
    /// Minify the generated javascript.
    pub minify: bool,
    /// URI of the javascript directory.
    pub js_uri: String,
    /// Filesystem directory the javascript is written to.
    pub js_dir: String,
    /// URI that receives the AJAX requests.
    pub request_uri: String,
}

impl Default for LibraryOptions {
    fn default() -> Self {
        Self {
            extern_js: false,
            minify: false,
            js_uri: "/js".to_string(),
            js_dir: "public/js".to_string(),
            request_uri: "ajax".to_string(),
        }
    }
}

impl LibraryOptions {
    /// Write every option missing from `config`.
    pub fn apply_defaults(&self, config: &mut AppConfig) {
        let defaults = [
            ("js.app.extern", JsonValue::Bool(self.extern_js)),
            ("js.app.minify", JsonValue::Bool(self.minify)),
            ("js.app.uri", JsonValue::String(self.js_uri.clone())),
            ("js.app.dir", JsonValue::String(self.js_dir.clone())),
            ("core.request.uri", JsonValue::String(self.request_uri.clone())),
        ];
        for (path, value) in defaults {
            if !config.has_option(path) {
                config.set_option(path, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const SAMPLE: &str = r#"
classes:
  - directory: app/ajax
    namespace: App.Ajax
views:
  zeta:
    directory: app/views/zeta
  alpha:
    directory: app/views/alpha
    extension: html
options:
  views:
    default: alpha
  classes:
    App.Ajax.Users:
      permissions: [admin]
"#;

    #[test]
    fn test_dotted_lookup() {
        let config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        assert!(config.has_option("classes"));
        assert_eq!(config.option_str("views.alpha.extension"), Some("html"));
        assert_eq!(config.option("views.zeta.extension"), None);
        assert_eq!(config.default_view_namespace(), Some("alpha"));
    }

    #[test]
    fn test_option_entries_keep_document_order() {
        let config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        let names: Vec<&str> = config
            .option_entries("views")
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_class_options() {
        let config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        let options = config.class_options();
        assert_eq!(
            options["App.Ajax.Users"]["permissions"],
            vec![json!("admin")]
        );
    }

    #[test]
    fn test_set_option_creates_parents() {
        let mut config = AppConfig::new();
        config.set_option("js.app.uri", json!("/assets"));
        assert_eq!(config.root(), &json!({"js": {"app": {"uri": "/assets"}}}));
    }

    #[test]
    fn test_library_defaults_do_not_overwrite() {
        let mut config = AppConfig::from_value(json!({"js": {"app": {"minify": true}}})).unwrap();
        LibraryOptions::default().apply_defaults(&mut config);

        assert_eq!(config.option("js.app.minify"), Some(&json!(true)));
        assert_eq!(config.option("js.app.extern"), Some(&json!(false)));
        assert_eq!(config.option_str("core.request.uri"), Some("ajax"));
    }

    #[test]
    fn test_non_mapping_root_is_rejected() {
        assert!(matches!(
            AppConfig::from_json_str("[1, 2]"),
            Err(ConfigError::NotAMapping)
        ));
        assert_eq!(AppConfig::from_yaml_str("~").unwrap(), AppConfig::new());
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("app.json");
        std::fs::write(&json_path, r#"{"views": {"main": {"directory": "views"}}}"#).unwrap();
        let config = AppConfig::load(&json_path).unwrap();
        assert_eq!(config.option_str("views.main.directory"), Some("views"));

        let toml_path = dir.path().join("app.toml");
        std::fs::write(&toml_path, "a = 1").unwrap();
        assert!(matches!(
            AppConfig::load(&toml_path),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "toml"
        ));

        assert!(matches!(
            AppConfig::load(&dir.path().join("missing.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
