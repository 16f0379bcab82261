//! The context shared by a module and its controllers.
//!
//! An [`AppContext`] owns what would otherwise be process-wide state: the
//! namespace registry, the instance registry, the view renderers, the
//! session, the shared response and the lifecycle callbacks. Hosts may run
//! several isolated modules in one process, each with its own context.

use std::cell::{Ref, RefCell};
use std::rc::{Rc, Weak};

use crate::controller::factory::RequestFactory;
use crate::controller::registry::{CallerScope, InstanceRegistry};
use crate::controller::{ClassName, Instance};
use crate::engine::{DispatchEngine, UploadedFile};
use crate::error::{DispatchError, HandlerError, ViewError};
use crate::event::{EventBus, EventHandler};
use crate::lifecycle::{Callbacks, Flow};
use crate::namespace::{NamespaceRegistry, ViewNamespace};
use crate::response::{Response, ResponseRef};
use crate::session::{MemorySession, SessionStore};
use crate::view::pagination::{DefaultPaginationRenderer, PaginationRenderer};
use crate::view::{RendererFactory, View, ViewRenderer, ViewRenderers};

pub struct AppContext {
    this: Weak<AppContext>,
    instances: InstanceRegistry,
    namespaces: RefCell<NamespaceRegistry>,
    renderers: RefCell<ViewRenderers>,
    pagination: RefCell<Rc<dyn PaginationRenderer>>,
    session: RefCell<Rc<dyn SessionStore>>,
    response: ResponseRef,
    callbacks: RefCell<Callbacks>,
    events: RefCell<EventBus>,
}

impl AppContext {
    pub fn new(engine: Rc<dyn DispatchEngine>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            instances: InstanceRegistry::new(engine),
            namespaces: RefCell::new(NamespaceRegistry::new()),
            renderers: RefCell::new(ViewRenderers::default()),
            pagination: RefCell::new(Rc::new(DefaultPaginationRenderer)),
            session: RefCell::new(Rc::new(MemorySession::new())),
            response: Rc::new(RefCell::new(Response::new())),
            callbacks: RefCell::new(Callbacks::default()),
            events: RefCell::new(EventBus::new()),
        })
    }

    pub fn engine(&self) -> &Rc<dyn DispatchEngine> {
        self.instances.engine()
    }

    pub(crate) fn weak(&self) -> Weak<AppContext> {
        self.this.clone()
    }

    /// The response shared by every instance.
    pub fn response(&self) -> ResponseRef {
        self.response.clone()
    }

    // Namespaces

    pub fn namespaces(&self) -> Ref<'_, NamespaceRegistry> {
        self.namespaces.borrow()
    }

    /// Register a class namespace. Returns false when the entry is malformed.
    pub fn add_class_namespace(
        &self,
        directory: &str,
        namespace: &str,
        separator: &str,
        protected: &[String],
    ) -> bool {
        self.namespaces.borrow_mut().register_class_namespace(
            directory,
            namespace,
            separator,
            protected.iter().cloned(),
        )
    }

    pub fn add_view_namespace(&self, namespace: &str, directory: &str, extension: &str, renderer: &str) {
        self.namespaces
            .borrow_mut()
            .register_view_namespace(namespace, directory, extension, renderer);
        // A live renderer would not know about the new namespace.
        self.renderers.borrow_mut().invalidate(renderer);
    }

    pub fn set_default_view_namespace(&self, namespace: &str) {
        self.namespaces
            .borrow_mut()
            .set_default_view_namespace(namespace);
    }

    // Views

    pub fn add_view_renderer<F>(&self, id: &str, factory: F)
    where
        F: Fn() -> Box<dyn ViewRenderer> + 'static,
    {
        let factory: RendererFactory = Rc::new(factory);
        self.renderers.borrow_mut().add(id, factory);
    }

    pub fn has_view_renderer(&self, id: &str) -> bool {
        self.renderers.borrow().has(id)
    }

    pub(crate) fn view_renderer(
        &self,
        id: &str,
        namespaces: &[ViewNamespace],
    ) -> Result<Rc<dyn ViewRenderer>, ViewError> {
        self.renderers.borrow_mut().get_or_create(id, namespaces)
    }

    pub fn view(self: &Rc<Self>) -> View {
        View::new(self.clone())
    }

    pub fn set_pagination_renderer(&self, renderer: Rc<dyn PaginationRenderer>) {
        *self.pagination.borrow_mut() = renderer;
    }

    pub fn pagination_renderer(&self) -> Rc<dyn PaginationRenderer> {
        self.pagination.borrow().clone()
    }

    // Session and uploads

    pub fn set_session_store(&self, store: Rc<dyn SessionStore>) {
        *self.session.borrow_mut() = store;
    }

    pub fn session(&self) -> Rc<dyn SessionStore> {
        self.session.borrow().clone()
    }

    pub fn uploaded_files(&self) -> Vec<UploadedFile> {
        self.engine().uploaded_files()
    }

    // Events

    pub fn on_event(&self, event: &str, handler: impl Fn(&str) + 'static) {
        let handler: EventHandler = Rc::new(handler);
        self.events.borrow_mut().on(event, handler);
    }

    /// Fire an event. Returns the number of handlers called.
    pub fn trigger_event(&self, event: &str) -> usize {
        let handlers = self.events.borrow().handlers(event);
        tracing::debug!(event, handlers = handlers.len(), "event");
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    // Callbacks

    pub fn callbacks(&self) -> Ref<'_, Callbacks> {
        self.callbacks.borrow()
    }

    /// Called with every instance, once, before its own init hook. An
    /// error is returned by the resolution that initialized the instance.
    pub fn set_init_callback(
        &self,
        callback: impl Fn(&Instance) -> Result<(), HandlerError> + 'static,
    ) {
        self.callbacks.borrow_mut().init = Some(Rc::new(callback));
    }

    /// Called before dispatch; returning [`Flow::Abort`] ends the request.
    pub fn set_before_callback(
        &self,
        callback: impl Fn(&Instance, &str) -> Result<Flow, HandlerError> + 'static,
    ) {
        self.callbacks.borrow_mut().before = Some(Rc::new(callback));
    }

    pub fn set_after_callback(
        &self,
        callback: impl Fn(&Instance, &str) -> Result<(), HandlerError> + 'static,
    ) {
        self.callbacks.borrow_mut().after = Some(Rc::new(callback));
    }

    /// Called when a request is rejected before dispatch.
    pub fn set_invalid_callback(
        &self,
        callback: impl Fn(&ResponseRef, &str) -> Result<(), HandlerError> + 'static,
    ) {
        self.callbacks.borrow_mut().invalid = Some(Rc::new(callback));
    }

    /// Called when dispatch fails. Without it, dispatch errors are returned
    /// to the host.
    pub fn set_error_callback(
        &self,
        callback: impl Fn(&ResponseRef, &DispatchError) -> Result<(), HandlerError> + 'static,
    ) {
        self.callbacks.borrow_mut().error = Some(Rc::new(callback));
    }

    // Instances

    /// Resolve an absolute class name. `Ok(None)` when there is no such
    /// controller; errors come from the init hooks.
    pub fn instance(&self, name: &str) -> Result<Option<Rc<Instance>>, HandlerError> {
        self.instances.resolve(self, name, None)
    }

    /// Resolve a class name on behalf of another instance.
    pub fn resolve(
        &self,
        name: &str,
        caller: Option<&Instance>,
    ) -> Result<Option<Rc<Instance>>, HandlerError> {
        self.instances.resolve(self, name, caller.map(CallerScope::of))
    }

    pub(crate) fn resolve_scoped(
        &self,
        name: &str,
        class: &ClassName,
        namespace: Option<&str>,
    ) -> Result<Option<Rc<Instance>>, HandlerError> {
        let scope = CallerScope { class, namespace };
        self.instances.resolve(self, name, Some(scope))
    }

    /// Request factory of a class, `None` if the class cannot be resolved.
    pub fn request(&self, name: &str) -> Result<Option<RequestFactory>, HandlerError> {
        Ok(self.instance(name)?.map(|instance| instance.request()))
    }
}
