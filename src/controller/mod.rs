//! Controllers and their instances.
//!
//! A controller is a host type implementing [`Controller`]. The dispatch
//! engine constructs it and wraps it into an [`Instance`], the memoized
//! object identified by its fully-qualified dotted class name. Through the
//! instance, a controller reaches the shared response, the views, the
//! session, its request and paginator factories, and the other
//! controllers of the module.
//!
//! # Example
//!
//! ```
//! use serde_json::Value;
//! use soli_ajax::controller::{Controller, Instance};
//! use soli_ajax::error::HandlerError;
//!
//! #[derive(Default)]
//! struct Users;
//!
//! impl Controller for Users {
//!     fn exports(&self) -> Vec<&'static str> {
//!         vec!["list"]
//!     }
//!
//!     fn call(&mut self, cx: &Instance, method: &str, _args: &[Value]) -> Result<(), HandlerError> {
//!         match method {
//!             "list" => {
//!                 if let Some(response) = cx.response() {
//!                     response.borrow_mut().assign("users", "innerHTML", "<li>ada</li>");
//!                 }
//!                 Ok(())
//!             }
//!             _ => Err(HandlerError::UnknownMethod(method.to_string())),
//!         }
//!     }
//! }
//! ```

pub mod factory;
pub mod registry;

use std::cell::{RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value as JsonValue;

use crate::context::AppContext;
use crate::error::{DispatchError, HandlerError};
use crate::namespace::options::OptionSet;
use crate::namespace::{normalize_namespace, ClassNamespace};
use crate::response::ResponseRef;
use crate::session::SessionStore;
use crate::view::View;
use factory::{Paginator, RequestFactory};

/// Methods of the controller surface. They are added to the protected set
/// of every class namespace and can never be called remotely.
pub const RESERVED_METHODS: &[&str] = &[
    "init",
    "call",
    "exports",
    "response",
    "view",
    "session",
    "request",
    "paginator",
    "instance",
];

/// Canonical identifier of a controller class: dot-separated segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassName(String);

impl ClassName {
    pub fn new(name: &str) -> Self {
        Self(normalize_namespace(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The last segment (`Users` for `App.Ajax.Users`).
    pub fn short_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or_default()
    }

    /// Everything but the last segment (`App.Ajax` for `App.Ajax.Users`).
    pub fn class_path(&self) -> &str {
        self.0.rsplit_once('.').map(|(path, _)| path).unwrap_or_default()
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A controller class implemented by the host.
pub trait Controller: 'static {
    /// Called once, after the instance is attached to the module. An error
    /// is returned to whoever resolved the instance; the hook is not retried.
    fn init(&mut self, _cx: &Instance) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Names of the methods callable from the client.
    fn exports(&self) -> Vec<&'static str>;

    /// Invoke an exported method.
    fn call(&mut self, cx: &Instance, method: &str, args: &[JsonValue])
        -> Result<(), HandlerError>;
}

/// Everything an instance receives when it is initialized.
#[derive(Clone)]
pub(crate) struct Attachment {
    pub response: ResponseRef,
    pub context: Weak<AppContext>,
}

/// A memoized controller object.
pub struct Instance {
    name: ClassName,
    namespace: Option<ClassNamespace>,
    options: OptionSet,
    controller: RefCell<Box<dyn Controller>>,
    attachment: RefCell<Option<Attachment>>,
    paginator: RefCell<Paginator>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("namespace", &self.namespace.as_ref().map(|ns| &ns.namespace))
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Instance {
    pub fn new(
        name: ClassName,
        namespace: Option<ClassNamespace>,
        options: OptionSet,
        controller: Box<dyn Controller>,
    ) -> Self {
        Self {
            name,
            namespace,
            options,
            controller: RefCell::new(controller),
            attachment: RefCell::new(None),
            paginator: RefCell::new(Paginator::default()),
        }
    }

    pub fn name(&self) -> &ClassName {
        &self.name
    }

    /// The class namespace this instance was created in, if any.
    pub fn namespace(&self) -> Option<&ClassNamespace> {
        self.namespace.as_ref()
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    /// Javascript name of the class.
    pub fn js_name(&self) -> String {
        match &self.namespace {
            Some(ns) => ns.js_name(&self.name),
            None => self.name.to_string(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.attachment.borrow().is_some()
    }

    /// Check whether a method may be called remotely.
    pub fn is_protected(&self, method: &str) -> bool {
        match &self.namespace {
            Some(ns) => ns.is_protected(method),
            None => RESERVED_METHODS.contains(&method),
        }
    }

    /// Attach the shared response. Returns false if already attached.
    pub(crate) fn attach(&self, attachment: Attachment) -> bool {
        let mut slot = self.attachment.borrow_mut();
        if slot.is_some() {
            return false;
        }
        self.paginator
            .borrow_mut()
            .set_renderer(attachment.context.upgrade().map(|cx| cx.pagination_renderer()));
        *slot = Some(attachment);
        true
    }

    /// Run the controller's own init hook.
    pub(crate) fn run_init(&self) -> Result<(), HandlerError> {
        let mut controller = self
            .controller
            .try_borrow_mut()
            .map_err(|_| HandlerError::message(format!("Controller '{}' is busy", self.name)))?;
        controller.init(self)
    }

    /// Invoke a method on the wrapped controller.
    pub fn invoke(&self, method: &str, args: &[JsonValue]) -> Result<(), DispatchError> {
        let mut controller = self
            .controller
            .try_borrow_mut()
            .map_err(|_| DispatchError::Busy(self.name.to_string()))?;
        controller.call(self, method, args)?;
        Ok(())
    }

    /// Check whether a method is among the controller's exports.
    pub fn is_exported(&self, method: &str) -> Result<bool, DispatchError> {
        let controller = self
            .controller
            .try_borrow()
            .map_err(|_| DispatchError::Busy(self.name.to_string()))?;
        Ok(controller.exports().contains(&method))
    }

    /// Exported method names of the wrapped controller.
    pub fn exports(&self) -> Vec<&'static str> {
        match self.controller.try_borrow() {
            Ok(controller) => controller.exports(),
            Err(_) => Vec::new(),
        }
    }

    fn context(&self) -> Option<Rc<AppContext>> {
        self.attachment
            .borrow()
            .as_ref()
            .and_then(|attachment| attachment.context.upgrade())
    }

    /// The shared response, once the instance is initialized.
    pub fn response(&self) -> Option<ResponseRef> {
        self.attachment
            .borrow()
            .as_ref()
            .map(|attachment| attachment.response.clone())
    }

    pub fn view(&self) -> Option<View> {
        self.context().map(View::new)
    }

    pub fn session(&self) -> Option<Rc<dyn SessionStore>> {
        self.context().map(|cx| cx.session())
    }

    /// Request factory targeting this class.
    pub fn request(&self) -> RequestFactory {
        let context = self
            .attachment
            .borrow()
            .as_ref()
            .map(|attachment| attachment.context.clone())
            .unwrap_or_default();
        RequestFactory::new(
            self.name.clone(),
            self.js_name(),
            self.namespace.as_ref().map(|ns| ns.namespace.clone()),
            context,
        )
    }

    /// The paginator of this instance, updated with the given properties.
    /// Its calls target this class.
    pub fn paginator(&self, total: usize, per_page: usize, current: usize) -> RefMut<'_, Paginator> {
        let mut paginator = self.paginator.borrow_mut();
        paginator.set_properties(total, per_page, current);
        paginator.set_target(self.js_name());
        paginator
    }

    /// Resolve another controller, relative to this one.
    ///
    /// `.Sibling` is looked up next to this class; other names are looked
    /// up in this class's namespace. Errors come from the init hooks of a
    /// controller resolved for the first time.
    pub fn instance(&self, name: &str) -> Result<Option<Rc<Instance>>, HandlerError> {
        match self.context() {
            Some(context) => context.resolve(name, Some(self)),
            None => Ok(None),
        }
    }
}
