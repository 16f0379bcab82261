//! Class and view namespace registry.
//!
//! A class namespace maps a dotted namespace (`App.Ajax`) to the directory
//! holding its controllers, the separator used in the generated javascript
//! names, and the set of methods that must never be callable remotely.
//!
//! A view namespace maps a namespace to a template directory, an extension
//! and the id of the renderer in charge of it. Several view namespaces may
//! share a renderer.

pub mod options;

use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};

use crate::controller::{ClassName, RESERVED_METHODS};

/// Separator of the javascript class names generated for a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Separator {
    #[default]
    Dot,
    Underscore,
}

impl Separator {
    /// Only `_` selects the underscore; anything else is a dot.
    pub fn parse(value: &str) -> Self {
        if value.trim() == "_" {
            Separator::Underscore
        } else {
            Separator::Dot
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Separator::Dot => '.',
            Separator::Underscore => '_',
        }
    }
}

/// Normalize a namespace or class path to its dotted form.
///
/// `App\Ajax`, `App::Ajax`, `App/Ajax` and `.App.Ajax.` all become `App.Ajax`.
pub fn normalize_namespace(value: &str) -> String {
    value
        .trim()
        .replace("::", ".")
        .replace(['\\', '/'], ".")
        .trim_matches('.')
        .to_string()
}

/// A registered class namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNamespace {
    pub directory: PathBuf,
    pub namespace: String,
    pub separator: Separator,
    pub protected: IndexSet<String>,
}

impl ClassNamespace {
    pub fn is_protected(&self, method: &str) -> bool {
        self.protected.contains(method)
    }

    /// Check whether a class lives in this namespace or one of its children.
    pub fn contains(&self, class: &ClassName) -> bool {
        let name = class.as_str();
        name.len() > self.namespace.len()
            && name.starts_with(&self.namespace)
            && name.as_bytes()[self.namespace.len()] == b'.'
    }

    /// Javascript name of a class, joined with this namespace's separator.
    pub fn js_name(&self, class: &ClassName) -> String {
        match self.separator {
            Separator::Dot => class.as_str().to_string(),
            Separator::Underscore => class.as_str().replace('.', "_"),
        }
    }
}

/// A registered view namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewNamespace {
    pub namespace: String,
    pub directory: PathBuf,
    pub extension: String,
    pub renderer: String,
}

impl ViewNamespace {
    /// Path of a template in this namespace.
    pub fn template_path(&self, template: &str) -> PathBuf {
        let template = template.trim_start_matches('/');
        let file = match self.extension.trim_start_matches('.') {
            "" => template.to_string(),
            ext => format!("{}.{}", template, ext),
        };
        self.directory.join(file)
    }
}

/// Lookup table for class and view namespaces.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NamespaceRegistry {
    classes: IndexMap<String, ClassNamespace>,
    views: IndexMap<String, Vec<ViewNamespace>>,
    view_renderers: IndexMap<String, String>,
    default_view: Option<String>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class namespace. The reserved controller methods are
    /// always added to the protected set.
    ///
    /// Returns false, without touching the registry, when the directory or
    /// the namespace is empty.
    pub fn register_class_namespace<I, S>(
        &mut self,
        directory: &str,
        namespace: &str,
        separator: &str,
        protected: I,
    ) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let directory = directory.trim();
        let namespace = normalize_namespace(namespace);
        if directory.is_empty() || namespace.is_empty() {
            return false;
        }

        let mut methods: IndexSet<String> = protected
            .into_iter()
            .map(Into::into)
            .map(|m: String| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        methods.extend(RESERVED_METHODS.iter().map(|m| m.to_string()));

        self.classes.insert(
            namespace.clone(),
            ClassNamespace {
                directory: PathBuf::from(directory),
                namespace,
                separator: Separator::parse(separator),
                protected: methods,
            },
        );
        true
    }

    /// Register a view namespace under a renderer. The first view namespace
    /// registered becomes the default until one is set explicitly.
    pub fn register_view_namespace(
        &mut self,
        namespace: &str,
        directory: impl AsRef<Path>,
        extension: &str,
        renderer: &str,
    ) {
        let namespace = namespace.trim().to_string();

        // Last write wins: drop the previous entry, possibly under another renderer.
        if let Some(previous) = self.view_renderers.get(&namespace) {
            if let Some(group) = self.views.get_mut(previous) {
                group.retain(|entry| entry.namespace != namespace);
            }
        }

        let entry = ViewNamespace {
            namespace: namespace.clone(),
            directory: directory.as_ref().to_path_buf(),
            extension: extension.trim().to_string(),
            renderer: renderer.to_string(),
        };
        self.views
            .entry(renderer.to_string())
            .or_default()
            .push(entry);
        self.view_renderers.insert(namespace.clone(), renderer.to_string());

        if self.default_view.is_none() {
            self.default_view = Some(namespace);
        }
    }

    pub fn set_default_view_namespace(&mut self, namespace: &str) {
        self.default_view = Some(namespace.trim().to_string());
    }

    pub fn resolve_class_directory(&self, namespace: &str) -> Option<&ClassNamespace> {
        self.classes.get(&normalize_namespace(namespace))
    }

    pub fn resolve_view_namespace(&self, namespace: &str) -> Option<&ViewNamespace> {
        let renderer = self.view_renderers.get(namespace)?;
        self.views
            .get(renderer)?
            .iter()
            .find(|entry| entry.namespace == namespace)
    }

    pub fn default_view_namespace(&self) -> Option<&str> {
        self.default_view.as_deref()
    }

    /// The most specific class namespace containing a class.
    pub fn namespace_of(&self, class: &ClassName) -> Option<&ClassNamespace> {
        self.classes
            .values()
            .filter(|ns| ns.contains(class))
            .max_by_key(|ns| ns.namespace.len())
    }

    pub fn class_namespaces(&self) -> impl Iterator<Item = &ClassNamespace> {
        self.classes.values()
    }

    /// View namespaces handled by a renderer.
    pub fn renderer_namespaces(&self, renderer: &str) -> &[ViewNamespace] {
        self.views.get(renderer).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn view_namespaces(&self) -> impl Iterator<Item = &ViewNamespace> {
        self.views.values().flatten()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn view_count(&self) -> usize {
        self.view_renderers.len()
    }
}
