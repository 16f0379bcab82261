//! Instance registry.
//!
//! This module handles:
//! - Turning a (possibly relative) class name into an absolute one
//! - Finding the instance registered under that name, or having the
//!   engine create it
//! - Initializing each instance exactly once
//!
//! Resolution rules, applied in order:
//! 1. `.Name` is relative to the caller's class path: `App.Ajax.Users`
//!    resolving `.Roles` gets `App.Ajax.Roles`.
//! 2. Otherwise, a caller in a namespace gets the name prefixed with that
//!    namespace: a caller in `App.Ajax` resolving `Roles` gets `App.Ajax.Roles`.
//! 3. Otherwise the name is used as is.
//!
//! The lookup-then-create sequence is not atomic. Registries are
//! single-threaded (`Rc`), one request at a time.

use std::rc::Rc;

use super::{Attachment, ClassName, Instance};
use crate::context::AppContext;
use crate::engine::{ClassDescriptor, DispatchEngine};
use crate::error::HandlerError;
use crate::namespace::normalize_namespace;
use crate::namespace::options::OptionSet;

/// Who is asking for an instance.
#[derive(Debug, Clone, Copy)]
pub struct CallerScope<'a> {
    pub class: &'a ClassName,
    pub namespace: Option<&'a str>,
}

impl<'a> CallerScope<'a> {
    pub fn of(instance: &'a Instance) -> Self {
        Self {
            class: instance.name(),
            namespace: instance.namespace().map(|ns| ns.namespace.as_str()),
        }
    }
}

/// Compute the absolute class name looked up for `name`.
pub fn absolute_name(name: &str, caller: Option<CallerScope<'_>>) -> ClassName {
    let name = name.trim();

    if let Some(relative) = name.strip_prefix('.') {
        let class_path = caller.map(|c| c.class.class_path()).unwrap_or_default();
        if class_path.is_empty() {
            return ClassName::new(relative);
        }
        return ClassName::new(&format!("{}.{}", class_path, relative));
    }

    let namespace = caller
        .and_then(|c| c.namespace)
        .map(normalize_namespace)
        .filter(|ns| !ns.is_empty());
    match namespace {
        Some(namespace) => ClassName::new(&format!("{}.{}", namespace, name)),
        None => ClassName::new(name),
    }
}

/// Resolves class names to initialized instances through the engine.
pub struct InstanceRegistry {
    engine: Rc<dyn DispatchEngine>,
}

impl InstanceRegistry {
    pub fn new(engine: Rc<dyn DispatchEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Rc<dyn DispatchEngine> {
        &self.engine
    }

    /// The instance registered under an absolute name, registering the
    /// class with empty options if needed. Options the engine already
    /// recorded for the class are kept.
    pub fn lookup(&self, name: &ClassName, cx: &AppContext) -> Option<Rc<Instance>> {
        if let Some(instance) = self.engine.registered_instance(name) {
            return Some(instance);
        }
        // The engine runs host constructors; no registry borrow may be live.
        let namespace = cx.namespaces().namespace_of(name).cloned();
        let descriptor = ClassDescriptor::new(name.clone(), namespace, OptionSet::new());
        self.engine.register_instance(descriptor, true)
    }

    /// Resolve `name` for `caller` and initialize the instance on first use.
    ///
    /// `Ok(None)` means no such controller; it is not an error. An error
    /// comes from the init callback or the controller's init hook, and is
    /// only reported by the resolution that initialized the instance.
    pub fn resolve(
        &self,
        cx: &AppContext,
        name: &str,
        caller: Option<CallerScope<'_>>,
    ) -> Result<Option<Rc<Instance>>, HandlerError> {
        let absolute = absolute_name(name, caller);
        if absolute.is_empty() {
            return Ok(None);
        }

        let Some(instance) = self.lookup(&absolute, cx) else {
            tracing::warn!(class = %absolute, "class cannot be resolved");
            return Ok(None);
        };

        self.initialize(cx, &instance)?;
        Ok(Some(instance))
    }

    /// Attach the shared response, then run the module init callback and
    /// the instance's own init hook. Does nothing on an attached instance.
    fn initialize(&self, cx: &AppContext, instance: &Rc<Instance>) -> Result<bool, HandlerError> {
        let attachment = Attachment {
            response: cx.response(),
            context: cx.weak(),
        };
        if !instance.attach(attachment) {
            return Ok(false);
        }

        tracing::debug!(class = %instance.name(), "initializing controller instance");
        let callback = cx.callbacks().init.clone();
        if let Some(callback) = callback {
            callback(instance)?;
        }
        instance.run_init()?;
        Ok(true)
    }
}
