//! Views: renderers and the namespaces they serve.
//!
//! Templates are addressed as `namespace::template`. Without a namespace
//! prefix the default view namespace is used. Each namespace is bound to
//! a renderer id; renderer instances are created lazily, once per id, and
//! receive every namespace bound to their id when created.
//!
//! The built-in renderer ([`TemplateRenderer`], id [`DEFAULT_RENDERER`])
//! substitutes `{{ key }}` (HTML-escaped) and `{{{ key }}}` (raw)
//! placeholders from a JSON object.

pub mod pagination;

use std::fs;
use std::rc::Rc;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;

use crate::context::AppContext;
use crate::error::ViewError;
use crate::namespace::ViewNamespace;

/// Id of the built-in renderer.
pub const DEFAULT_RENDERER: &str = "soli";

/// View namespace reserved for pagination templates.
pub const PAGINATION_NAMESPACE: &str = "pagination";

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\{\s*([\w.\-]+)\s*\}\}\}|\{\{\s*([\w.\-]+)\s*\}\}").unwrap();
}

/// A template engine serving one or more view namespaces.
pub trait ViewRenderer {
    /// Called once per bound namespace, right after creation.
    fn add_namespace(&mut self, namespace: &ViewNamespace);

    fn render(&self, namespace: &str, template: &str, data: &JsonValue)
        -> Result<String, ViewError>;
}

/// Creates a renderer instance.
pub type RendererFactory = Rc<dyn Fn() -> Box<dyn ViewRenderer>>;

/// Renderer factories and the instances created from them.
#[derive(Default)]
pub struct ViewRenderers {
    factories: IndexMap<String, RendererFactory>,
    instances: IndexMap<String, Rc<dyn ViewRenderer>>,
}

impl ViewRenderers {
    /// Register a renderer factory, replacing any previous one.
    pub fn add(&mut self, id: &str, factory: RendererFactory) {
        self.factories.insert(id.to_string(), factory);
        self.instances.shift_remove(id);
    }

    pub fn has(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Drop the instance of a renderer so that the next use rebuilds it
    /// with the current namespaces.
    pub fn invalidate(&mut self, id: &str) {
        self.instances.shift_remove(id);
    }

    /// The renderer instance for `id`, created on first use.
    pub fn get_or_create(
        &mut self,
        id: &str,
        namespaces: &[ViewNamespace],
    ) -> Result<Rc<dyn ViewRenderer>, ViewError> {
        if let Some(renderer) = self.instances.get(id) {
            return Ok(renderer.clone());
        }
        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| ViewError::UnknownRenderer(id.to_string()))?;

        let mut renderer = factory();
        for namespace in namespaces {
            renderer.add_namespace(namespace);
        }
        let renderer: Rc<dyn ViewRenderer> = Rc::from(renderer);
        self.instances.insert(id.to_string(), renderer.clone());
        Ok(renderer)
    }
}

/// Split `namespace::template` into its parts.
pub fn split_template_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once("::") {
        Some((namespace, template)) => (Some(namespace.trim()), template.trim()),
        None => (None, name.trim()),
    }
}

/// View facade handed to controllers.
#[derive(Clone)]
pub struct View {
    context: Rc<AppContext>,
}

impl View {
    pub fn new(context: Rc<AppContext>) -> Self {
        Self { context }
    }

    /// Render `namespace::template` (or `template` in the default namespace).
    pub fn render(&self, name: &str, data: &JsonValue) -> Result<String, ViewError> {
        let (namespace, template) = split_template_name(name);

        let (renderer_id, namespace, group) = {
            let registry = self.context.namespaces();
            let namespace = match namespace {
                Some(namespace) => namespace.to_string(),
                None => registry
                    .default_view_namespace()
                    .ok_or_else(|| ViewError::UnknownNamespace(String::new()))?
                    .to_string(),
            };
            let entry = registry
                .resolve_view_namespace(&namespace)
                .ok_or_else(|| ViewError::UnknownNamespace(namespace.clone()))?;
            let group = registry.renderer_namespaces(&entry.renderer).to_vec();
            (entry.renderer.clone(), namespace, group)
        };

        let renderer = self.context.view_renderer(&renderer_id, &group)?;
        renderer.render(&namespace, template, data)
    }
}

/// Built-in placeholder renderer reading templates from disk.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    namespaces: IndexMap<String, ViewNamespace>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ViewRenderer for TemplateRenderer {
    fn add_namespace(&mut self, namespace: &ViewNamespace) {
        self.namespaces
            .insert(namespace.namespace.clone(), namespace.clone());
    }

    fn render(
        &self,
        namespace: &str,
        template: &str,
        data: &JsonValue,
    ) -> Result<String, ViewError> {
        let entry = self
            .namespaces
            .get(namespace)
            .ok_or_else(|| ViewError::UnknownNamespace(namespace.to_string()))?;
        let path = entry.template_path(template);
        let source = fs::read_to_string(&path).map_err(|source| ViewError::Template {
            path: path.clone(),
            source,
        })?;
        Ok(substitute(&source, data))
    }
}

/// Replace placeholders in `source` with values from `data`.
pub fn substitute(source: &str, data: &JsonValue) -> String {
    PLACEHOLDER
        .replace_all(source, |caps: &Captures| {
            if let Some(raw) = caps.get(1) {
                lookup(data, raw.as_str())
            } else {
                let key = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                html_escape(&lookup(data, key))
            }
        })
        .into_owned()
}

fn lookup(data: &JsonValue, path: &str) -> String {
    let value = path
        .split('.')
        .try_fold(data, |node, key| match node {
            JsonValue::Object(map) => map.get(key),
            JsonValue::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        });
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn test_split_template_name() {
        assert_eq!(split_template_name("users::index"), (Some("users"), "index"));
        assert_eq!(split_template_name("index"), (None, "index"));
        assert_eq!(split_template_name("a::b/c"), (Some("a"), "b/c"));
    }

    #[test]
    fn test_substitute() {
        let data = json!({
            "user": {"name": "<Ada>", "roles": ["admin", "dev"]},
            "count": 3,
        });
        let out = substitute(
            "{{ user.name }} / {{{user.name}}} / {{count}} / {{ user.roles.1 }} / [{{ missing }}]",
            &data,
        );
        assert_eq!(out, "&lt;Ada&gt; / <Ada> / 3 / dev / []");
    }

    #[test]
    fn test_template_renderer_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.html"), "Hello {{ name }}!").unwrap();

        let mut renderer = TemplateRenderer::new();
        renderer.add_namespace(&ViewNamespace {
            namespace: "pages".to_string(),
            directory: dir.path().to_path_buf(),
            extension: ".html".to_string(),
            renderer: DEFAULT_RENDERER.to_string(),
        });

        let out = renderer.render("pages", "hello", &json!({"name": "Ada"})).unwrap();
        assert_eq!(out, "Hello Ada!");

        assert!(matches!(
            renderer.render("pages", "missing", &json!({})),
            Err(ViewError::Template { .. })
        ));
        assert!(matches!(
            renderer.render("other", "hello", &json!({})),
            Err(ViewError::UnknownNamespace(_))
        ));
    }

    struct Counting;

    impl ViewRenderer for Counting {
        fn add_namespace(&mut self, _namespace: &ViewNamespace) {}

        fn render(&self, _: &str, template: &str, _: &JsonValue) -> Result<String, ViewError> {
            Ok(template.to_string())
        }
    }

    #[test]
    fn test_renderer_created_once_per_id() {
        thread_local! {
            static CREATED: Cell<usize> = const { Cell::new(0) };
        }

        let mut renderers = ViewRenderers::default();
        renderers.add(
            "count",
            Rc::new(|| {
                CREATED.with(|c| c.set(c.get() + 1));
                Box::new(Counting) as Box<dyn ViewRenderer>
            }),
        );

        renderers.get_or_create("count", &[]).unwrap();
        renderers.get_or_create("count", &[]).unwrap();
        assert_eq!(CREATED.with(|c| c.get()), 1);

        renderers.invalidate("count");
        renderers.get_or_create("count", &[]).unwrap();
        assert_eq!(CREATED.with(|c| c.get()), 2);

        assert!(matches!(
            renderers.get_or_create("nope", &[]),
            Err(ViewError::UnknownRenderer(_))
        ));
    }
}
