//! Interface to the engine that processes AJAX requests.
//!
//! The engine owns the table of registered classes and their instances,
//! reads the inbound request and invokes controller methods. This crate
//! decides *which* instance and method are called; the engine performs
//! the call.
//!
//! [`ClassTable`] is an in-process engine: controllers are declared with
//! a constructor under their fully-qualified name, and the request payload
//! is handed over by the host.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::AppConfig;
use crate::controller::{ClassName, Controller, Instance};
use crate::error::DispatchError;
use crate::namespace::options::{OptionSet, RegisteredClassOptions};
use crate::namespace::{ClassNamespace, NamespaceRegistry};

/// A class handed to the engine for registration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDescriptor {
    pub name: ClassName,
    pub namespace: Option<ClassNamespace>,
    pub options: OptionSet,
}

impl ClassDescriptor {
    pub fn new(name: ClassName, namespace: Option<ClassNamespace>, options: OptionSet) -> Self {
        Self {
            name,
            namespace,
            options,
        }
    }

    /// Directory of the class's namespace, if it has one.
    pub fn directory(&self) -> Option<&Path> {
        self.namespace.as_ref().map(|ns| ns.directory.as_path())
    }

    pub fn js_name(&self) -> String {
        match &self.namespace {
            Some(ns) => ns.js_name(&self.name),
            None => self.name.to_string(),
        }
    }
}

/// The two fields identifying the target of a request, plus its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub class: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<JsonValue>,
}

impl RequestPayload {
    pub fn new(class: &str, method: &str) -> Self {
        Self {
            class: class.to_string(),
            method: method.to_string(),
            args: Vec::new(),
        }
    }
}

/// A file uploaded with the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub name: String,
    pub path: PathBuf,
    pub mime: String,
    pub size: u64,
}

/// The request-processing engine.
///
/// Methods take `&self`: controllers may resolve other controllers while
/// the engine is invoking them, so implementations must not hold internal
/// borrows across [`DispatchEngine::invoke`].
pub trait DispatchEngine {
    /// The instance already registered under `name`.
    fn registered_instance(&self, name: &ClassName) -> Option<Rc<Instance>>;

    /// Register a class. With `autoload`, the instance is constructed and
    /// returned; `None` means the class cannot be constructed.
    fn register_instance(&self, class: ClassDescriptor, autoload: bool) -> Option<Rc<Instance>>;

    /// Register every class the engine can find in the given namespaces.
    /// Returns the number of classes registered.
    fn register_classes(
        &self,
        namespaces: &NamespaceRegistry,
        options: &RegisteredClassOptions,
    ) -> usize;

    /// Whether the current request is addressed to the engine.
    fn can_process_request(&self) -> bool;

    /// Target class, method and arguments of the current request.
    fn request_payload(&self) -> Option<RequestPayload>;

    /// Invoke a validated method on a resolved, initialized instance.
    fn invoke(
        &self,
        instance: &Rc<Instance>,
        method: &str,
        args: &[JsonValue],
    ) -> Result<(), DispatchError>;

    fn uploaded_files(&self) -> Vec<UploadedFile> {
        Vec::new()
    }

    /// Javascript exposing the registered classes.
    fn script(&self, _options: &AppConfig, _include_js: bool, _include_css: bool) -> String {
        String::new()
    }

    /// HTML tags including the engine's javascript files.
    fn js(&self, _options: &AppConfig) -> String {
        String::new()
    }

    /// HTML tags including the engine's CSS.
    fn css(&self, _options: &AppConfig) -> String {
        String::new()
    }
}

/// Creates a controller.
pub type ControllerFactory = Rc<dyn Fn() -> Box<dyn Controller>>;

/// In-process engine backed by a table of controller constructors.
#[derive(Default)]
pub struct ClassTable {
    factories: RefCell<IndexMap<ClassName, ControllerFactory>>,
    classes: RefCell<IndexMap<ClassName, ClassDescriptor>>,
    instances: RefCell<IndexMap<ClassName, Rc<Instance>>>,
    payload: RefCell<Option<RequestPayload>>,
    uploads: RefCell<Vec<UploadedFile>>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a controller type under its fully-qualified name.
    pub fn define<C: Controller + Default>(&self, name: &str) {
        self.define_with(name, Rc::new(|| Box::new(C::default()) as Box<dyn Controller>));
    }

    pub fn define_with(&self, name: &str, factory: ControllerFactory) {
        self.factories
            .borrow_mut()
            .insert(ClassName::new(name), factory);
    }

    pub fn set_payload(&self, payload: Option<RequestPayload>) {
        *self.payload.borrow_mut() = payload;
    }

    /// Set the payload from a `{"class": .., "method": .., "args": [..]}` body.
    pub fn set_payload_json(&self, body: &str) -> Result<(), serde_json::Error> {
        let payload: RequestPayload = serde_json::from_str(body)?;
        self.set_payload(Some(payload));
        Ok(())
    }

    pub fn add_upload(&self, file: UploadedFile) {
        self.uploads.borrow_mut().push(file);
    }

    /// Registered classes, in registration order.
    pub fn classes(&self) -> Vec<ClassDescriptor> {
        self.classes.borrow().values().cloned().collect()
    }

    fn factory(&self, name: &ClassName) -> Option<ControllerFactory> {
        self.factories.borrow().get(name).cloned()
    }

    /// Record a class. A registration without options keeps the options
    /// and namespace of an earlier registration of the same class.
    fn record(&self, mut class: ClassDescriptor) -> ClassDescriptor {
        let mut classes = self.classes.borrow_mut();
        if let Some(recorded) = classes.get(&class.name) {
            if class.options.is_empty() {
                class.options = recorded.options.clone();
            }
            if class.namespace.is_none() {
                class.namespace = recorded.namespace.clone();
            }
        }
        classes.insert(class.name.clone(), class.clone());
        class
    }

    fn class_script(&self, class: &ClassDescriptor, request_uri: &str) -> String {
        let Some(factory) = self.factory(&class.name) else {
            return String::new();
        };
        let js_name = class.js_name();
        let mut script = format!("{} = {{}};\n", js_name);
        for method in factory().exports() {
            if class
                .namespace
                .as_ref()
                .is_some_and(|ns| ns.is_protected(method))
            {
                continue;
            }
            script.push_str(&format!(
                "{js}.{m} = function() {{ return soli.request({{ class: '{cls}', method: '{m}' }}, {{ uri: '{uri}', parameters: arguments }}); }};\n",
                js = js_name,
                m = method,
                cls = class.name,
                uri = request_uri,
            ));
        }
        script
    }
}

impl DispatchEngine for ClassTable {
    fn registered_instance(&self, name: &ClassName) -> Option<Rc<Instance>> {
        self.instances.borrow().get(name).cloned()
    }

    fn register_instance(&self, class: ClassDescriptor, autoload: bool) -> Option<Rc<Instance>> {
        let factory = match self.factory(&class.name) {
            Some(factory) => factory,
            None => {
                tracing::debug!(class = %class.name, "no constructor for class");
                return None;
            }
        };

        let class = self.record(class);
        if !autoload {
            return None;
        }
        if let Some(existing) = self.registered_instance(&class.name) {
            return Some(existing);
        }

        let instance = Rc::new(Instance::new(
            class.name.clone(),
            class.namespace,
            class.options,
            factory(),
        ));
        self.instances
            .borrow_mut()
            .insert(class.name, instance.clone());
        Some(instance)
    }

    fn register_classes(
        &self,
        namespaces: &NamespaceRegistry,
        options: &RegisteredClassOptions,
    ) -> usize {
        let names: Vec<ClassName> = self.factories.borrow().keys().cloned().collect();
        let mut count = 0;
        for name in names {
            let Some(namespace) = namespaces.namespace_of(&name) else {
                continue;
            };
            let class_options = options.get(name.as_str()).cloned().unwrap_or_default();
            let descriptor = ClassDescriptor::new(name, Some(namespace.clone()), class_options);
            self.register_instance(descriptor, false);
            count += 1;
        }
        count
    }

    fn can_process_request(&self) -> bool {
        self.payload.borrow().is_some()
    }

    fn request_payload(&self) -> Option<RequestPayload> {
        self.payload.borrow().clone()
    }

    fn invoke(
        &self,
        instance: &Rc<Instance>,
        method: &str,
        args: &[JsonValue],
    ) -> Result<(), DispatchError> {
        if instance.is_protected(method) {
            return Err(DispatchError::ProtectedMethod {
                class: instance.name().to_string(),
                method: method.to_string(),
            });
        }
        if !instance.is_exported(method)? {
            return Err(DispatchError::NotExported {
                class: instance.name().to_string(),
                method: method.to_string(),
            });
        }
        instance.invoke(method, args)
    }

    fn uploaded_files(&self) -> Vec<UploadedFile> {
        self.uploads.borrow().clone()
    }

    fn script(&self, options: &AppConfig, include_js: bool, include_css: bool) -> String {
        let request_uri = options.option_str("core.request.uri").unwrap_or("ajax");
        let mut out = String::new();
        if include_js {
            out.push_str(&self.js(options));
        }
        if include_css {
            out.push_str(&self.css(options));
        }
        let classes = self.classes();
        if classes.is_empty() {
            return out;
        }
        out.push_str("<script type=\"text/javascript\">\n");
        for class in &classes {
            out.push_str(&self.class_script(class, request_uri));
        }
        out.push_str("</script>\n");
        out
    }

    fn js(&self, options: &AppConfig) -> String {
        let uri = options.option_str("js.app.uri").unwrap_or("/js");
        let minify = options
            .option("js.app.minify")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        let file = if minify { "soli.core.min.js" } else { "soli.core.js" };
        format!(
            "<script type=\"text/javascript\" src=\"{}/{}\"></script>\n",
            uri.trim_end_matches('/'),
            file
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use serde_json::json;

    #[derive(Default)]
    struct Users;

    impl Controller for Users {
        fn exports(&self) -> Vec<&'static str> {
            vec!["list", "helper"]
        }

        fn call(&mut self, _: &Instance, method: &str, _: &[JsonValue]) -> Result<(), HandlerError> {
            match method {
                "list" | "helper" | "secret" => Ok(()),
                _ => Err(HandlerError::UnknownMethod(method.to_string())),
            }
        }
    }

    fn namespaces() -> NamespaceRegistry {
        let mut registry = NamespaceRegistry::new();
        registry.register_class_namespace("app/ajax", "App", "_", ["helper"]);
        registry
    }

    #[test]
    fn test_register_instance_requires_constructor() {
        let table = ClassTable::new();
        let missing = ClassDescriptor::new(ClassName::new("Nope"), None, OptionSet::new());
        assert!(table.register_instance(missing, true).is_none());
        assert!(table.classes().is_empty());
    }

    #[test]
    fn test_register_instance_memoizes() {
        let table = ClassTable::new();
        table.define::<Users>("App.Users");
        let descriptor = ClassDescriptor::new(ClassName::new("App.Users"), None, OptionSet::new());

        let first = table.register_instance(descriptor.clone(), true).unwrap();
        let second = table.register_instance(descriptor, true).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(table.registered_instance(&ClassName::new("App.Users")).is_some());
    }

    #[test]
    fn test_register_classes_in_namespaces() {
        let table = ClassTable::new();
        table.define::<Users>("App.Users");
        table.define::<Users>("Other.Users");

        let mut options = RegisteredClassOptions::new();
        options.insert(
            "App.Users".to_string(),
            OptionSet::from([("perms".to_string(), vec![json!("admin")])]),
        );

        assert_eq!(table.register_classes(&namespaces(), &options), 1);
        let classes = table.classes();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].options["perms"], vec![json!("admin")]);
        assert_eq!(classes[0].directory(), Some(Path::new("app/ajax")));
        // Registration alone does not construct the instance.
        assert!(table.registered_instance(&ClassName::new("App.Users")).is_none());
    }

    #[test]
    fn test_invoke_refuses_protected_methods() {
        let table = ClassTable::new();
        table.define::<Users>("App.Users");
        let registry = namespaces();
        let name = ClassName::new("App.Users");
        let descriptor =
            ClassDescriptor::new(name.clone(), registry.namespace_of(&name).cloned(), OptionSet::new());
        let instance = table.register_instance(descriptor, true).unwrap();

        assert!(table.invoke(&instance, "list", &[]).is_ok());
        assert!(matches!(
            table.invoke(&instance, "helper", &[]),
            Err(DispatchError::ProtectedMethod { .. })
        ));
        assert!(matches!(
            table.invoke(&instance, "init", &[]),
            Err(DispatchError::ProtectedMethod { .. })
        ));
    }

    #[test]
    fn test_invoke_refuses_unexported_methods() {
        let table = ClassTable::new();
        table.define::<Users>("App.Users");
        let descriptor = ClassDescriptor::new(ClassName::new("App.Users"), None, OptionSet::new());
        let instance = table.register_instance(descriptor, true).unwrap();

        assert!(matches!(
            table.invoke(&instance, "secret", &[]),
            Err(DispatchError::NotExported { method, .. }) if method == "secret"
        ));
    }

    #[test]
    fn test_autoload_keeps_recorded_options() {
        let table = ClassTable::new();
        table.define::<Users>("App.Users");

        let mut options = RegisteredClassOptions::new();
        options.insert(
            "App.Users".to_string(),
            OptionSet::from([("perms".to_string(), vec![json!("admin")])]),
        );
        table.register_classes(&namespaces(), &options);

        let bare = ClassDescriptor::new(ClassName::new("App.Users"), None, OptionSet::new());
        let instance = table.register_instance(bare, true).unwrap();

        assert_eq!(instance.options()["perms"], vec![json!("admin")]);
        assert_eq!(instance.namespace().map(|ns| ns.namespace.as_str()), Some("App"));
        assert_eq!(table.classes()[0].options["perms"], vec![json!("admin")]);
    }

    #[test]
    fn test_payload_json() {
        let table = ClassTable::new();
        assert!(!table.can_process_request());

        table
            .set_payload_json(r#"{"class": "App.Users", "method": "list"}"#)
            .unwrap();
        assert!(table.can_process_request());
        assert_eq!(
            table.request_payload(),
            Some(RequestPayload::new("App.Users", "list"))
        );
        assert!(table.set_payload_json("{}").is_err());
    }

    #[test]
    fn test_script_exports_public_methods() {
        let table = ClassTable::new();
        table.define::<Users>("App.Users");
        table.register_classes(&namespaces(), &RegisteredClassOptions::new());

        let mut options = AppConfig::new();
        options.set_option("core.request.uri", json!("rpc"));
        options.set_option("js.app.minify", json!(true));

        let script = table.script(&options, true, false);
        assert!(script.contains("src=\"/js/soli.core.min.js\""));
        assert!(script.contains("App_Users = {};"));
        assert!(script.contains("App_Users.list = function()"));
        assert!(script.contains("uri: 'rpc'"));
        assert!(!script.contains("App_Users.helper"));
    }
}
