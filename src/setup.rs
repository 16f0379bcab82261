//! Module setup and host entry points.
//!
//! A [`Module`] ties a configuration, a dispatch engine and the host hooks
//! to an [`AppContext`]. Every public entry point first makes sure the
//! setup pipeline has completed:
//!
//! 1. `pre.setup`
//! 2. library setup: default options, the built-in view renderer, the
//!    pagination namespace and renderer
//! 3. host setup hook
//! 4. `pre.config`
//! 5. class namespaces from `classes`
//! 6. view namespaces from `views`
//! 7. `post.config`
//! 8. `pre.check`
//! 9. host check hook
//! 10. `post.check`
//! 11. `post.setup`
//!
//! A failed run leaves the module unset, so the next entry point retries
//! from the first stage.

use std::rc::Rc;

use serde_json::Value as JsonValue;

use crate::config::{AppConfig, LibraryOptions};
use crate::context::AppContext;
use crate::controller::factory::RequestFactory;
use crate::controller::{ClassName, Instance};
use crate::engine::{ClassDescriptor, DispatchEngine};
use crate::error::{AjaxError, DispatchError, HandlerError, SetupError};
use crate::event;
use crate::lifecycle::{Flow, RequestContext, RequestLifecycle};
use crate::namespace::options::{
    merge_class_options, merge_option_set, OptionSet, RegisteredClassOptions,
};
use crate::response::{HttpReply, Response, ResponseRef};
use crate::session::SessionStore;
use crate::view::pagination::DefaultPaginationRenderer;
use crate::view::{TemplateRenderer, DEFAULT_RENDERER, PAGINATION_NAMESPACE};

/// Directory of the pagination templates, unless `pagination.dir` is set.
pub const DEFAULT_PAGINATION_DIR: &str = "templates/pagination";

/// Hooks implemented by the host application.
pub trait ModuleHooks {
    /// Runs after library setup, before the configuration is applied.
    fn setup(&mut self, _cx: &AppContext, _config: &AppConfig) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Runs once the configuration is applied.
    fn check(&mut self, _cx: &AppContext, _config: &AppConfig) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Wrap the response for the HTTP layer.
    fn http_response(&self, response: &Response, code: u16) -> HttpReply {
        HttpReply::json(response, code)
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl ModuleHooks for NoHooks {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    NotStarted,
    Running,
    Done,
}

pub struct Module<H: ModuleHooks = NoHooks> {
    context: Rc<AppContext>,
    config: AppConfig,
    library: LibraryOptions,
    hooks: H,
    state: SetupState,
}

impl<H: ModuleHooks> Module<H> {
    pub fn new(engine: Rc<dyn DispatchEngine>, config: AppConfig, hooks: H) -> Self {
        Self {
            context: AppContext::new(engine),
            config,
            library: LibraryOptions::default(),
            hooks,
            state: SetupState::NotStarted,
        }
    }

    pub fn context(&self) -> &Rc<AppContext> {
        &self.context
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn state(&self) -> SetupState {
        self.state
    }

    /// Replace the library defaults. Options already present in the
    /// configuration are kept.
    pub fn set_library_options(&mut self, options: LibraryOptions) {
        options.apply_defaults(&mut self.config);
        self.library = options;
    }

    /// Run the setup pipeline, unless it already completed.
    pub fn setup(&mut self) -> Result<(), AjaxError> {
        if self.state != SetupState::NotStarted {
            return Ok(());
        }

        self.state = SetupState::Running;
        match self.run_stages() {
            Ok(()) => {
                self.state = SetupState::Done;
                tracing::info!(
                    classes = self.context.namespaces().class_count(),
                    views = self.context.namespaces().view_count(),
                    "module setup complete"
                );
                Ok(())
            }
            Err(e) => {
                self.state = SetupState::NotStarted;
                Err(e)
            }
        }
    }

    fn run_stages(&mut self) -> Result<(), AjaxError> {
        let cx = self.context.clone();

        cx.trigger_event(event::PRE_SETUP);
        self.setup_library();
        self.hooks
            .setup(&cx, &self.config)
            .map_err(|e| SetupError::new("setup", e))?;

        cx.trigger_event(event::PRE_CONFIG);
        self.setup_classes();
        self.setup_views();
        cx.trigger_event(event::POST_CONFIG);

        cx.trigger_event(event::PRE_CHECK);
        self.hooks
            .check(&cx, &self.config)
            .map_err(|e| SetupError::new("check", e))?;
        cx.trigger_event(event::POST_CHECK);

        cx.trigger_event(event::POST_SETUP);
        Ok(())
    }

    fn setup_library(&mut self) {
        self.library.apply_defaults(&mut self.config);

        let cx = &self.context;
        if !cx.has_view_renderer(DEFAULT_RENDERER) {
            cx.add_view_renderer(DEFAULT_RENDERER, || Box::new(TemplateRenderer::new()));
        }
        let directory = self
            .config
            .option_str("pagination.dir")
            .unwrap_or(DEFAULT_PAGINATION_DIR);
        cx.add_view_namespace(PAGINATION_NAMESPACE, directory, "html", DEFAULT_RENDERER);
        cx.set_pagination_renderer(Rc::new(DefaultPaginationRenderer));
    }

    fn setup_classes(&self) {
        let Some(entries) = self.config.option("classes").and_then(JsonValue::as_array) else {
            return;
        };

        for entry in entries {
            let directory = entry_str(entry, "directory");
            let namespace = entry_str(entry, "namespace");
            let (Some(directory), Some(namespace)) = (directory, namespace) else {
                tracing::debug!(entry = %entry, "skipping class namespace without directory or namespace");
                continue;
            };
            let separator = entry_str(entry, "separator").unwrap_or(".");
            let protected = string_list(entry.get("protected"));

            if !self
                .context
                .add_class_namespace(directory, namespace, separator, &protected)
            {
                tracing::debug!(namespace, "skipping malformed class namespace");
            }
        }
    }

    fn setup_views(&self) {
        let mut first_seen = None;

        for (namespace, entry) in self.config.option_entries("views") {
            let namespace = namespace.trim();
            let Some(directory) = entry_str(entry, "directory") else {
                tracing::debug!(namespace, "skipping view namespace without directory");
                continue;
            };
            if namespace.is_empty() {
                continue;
            }
            let extension = entry_str(entry, "extension").unwrap_or("");
            let renderer = entry_str(entry, "renderer").unwrap_or(DEFAULT_RENDERER);

            self.context
                .add_view_namespace(namespace, directory, extension, renderer);
            first_seen.get_or_insert(namespace);
        }

        if let Some(default) = self.config.default_view_namespace().or(first_seen) {
            self.context.set_default_view_namespace(default);
        }
    }

    // Entry points

    pub fn session(&mut self) -> Result<Rc<dyn SessionStore>, AjaxError> {
        self.setup()?;
        Ok(self.context.session())
    }

    /// Register every class the engine finds in the configured namespaces.
    /// `options` are added to the configured per-class options.
    pub fn register(&mut self, options: RegisteredClassOptions) -> Result<usize, AjaxError> {
        self.setup()?;
        let options = merge_class_options(self.config.class_options(), options);
        let namespaces = self.context.namespaces();
        Ok(self.context.engine().register_classes(&namespaces, &options))
    }

    /// Register one class. The given options are added to the configured ones.
    pub fn register_class(&mut self, name: &str, options: OptionSet) -> Result<(), AjaxError> {
        self.setup()?;
        let name = ClassName::new(name);
        let mut merged = self
            .config
            .class_options()
            .shift_remove(name.as_str())
            .unwrap_or_default();
        merge_option_set(&mut merged, options);

        let namespace = self.context.namespaces().namespace_of(&name).cloned();
        let descriptor = ClassDescriptor::new(name, namespace, merged);
        self.context.engine().register_instance(descriptor, false);
        Ok(())
    }

    /// Request factory of a class, `None` if the class cannot be resolved.
    pub fn request(&mut self, name: &str) -> Result<Option<RequestFactory>, AjaxError> {
        self.setup()?;
        Ok(self.context.request(name)?)
    }

    /// Javascript for the registered classes, optionally with the library
    /// javascript and CSS includes.
    pub fn script(&mut self, include_js: bool, include_css: bool) -> Result<String, AjaxError> {
        self.setup()?;
        Ok(self
            .context
            .engine()
            .script(&self.config, include_js, include_css))
    }

    pub fn js(&mut self) -> Result<String, AjaxError> {
        self.setup()?;
        Ok(self.context.engine().js(&self.config))
    }

    pub fn css(&mut self) -> Result<String, AjaxError> {
        self.setup()?;
        Ok(self.context.engine().css(&self.config))
    }

    pub fn can_process_request(&mut self) -> Result<bool, AjaxError> {
        self.setup()?;
        Ok(self.context.engine().can_process_request())
    }

    /// Process the current request. `None` when there is no request for
    /// the engine.
    pub fn process_request(&mut self) -> Result<Option<RequestContext>, AjaxError> {
        if !self.can_process_request()? {
            return Ok(None);
        }
        let payload = self.context.engine().request_payload();
        RequestLifecycle::new(&self.context)
            .run(payload.as_ref())
            .map(Some)
    }

    /// The shared response.
    pub fn ajax_response(&self) -> ResponseRef {
        self.context.response()
    }

    pub fn http_response(&mut self, code: u16) -> Result<HttpReply, AjaxError> {
        self.setup()?;
        let response = self.context.response();
        let reply = self.hooks.http_response(&response.borrow(), code);
        Ok(reply)
    }

    // Callbacks

    pub fn on_init(&self, callback: impl Fn(&Instance) -> Result<(), HandlerError> + 'static) {
        self.context.set_init_callback(callback);
    }

    pub fn on_before(
        &self,
        callback: impl Fn(&Instance, &str) -> Result<Flow, HandlerError> + 'static,
    ) {
        self.context.set_before_callback(callback);
    }

    pub fn on_after(&self, callback: impl Fn(&Instance, &str) -> Result<(), HandlerError> + 'static) {
        self.context.set_after_callback(callback);
    }

    pub fn on_invalid(
        &self,
        callback: impl Fn(&ResponseRef, &str) -> Result<(), HandlerError> + 'static,
    ) {
        self.context.set_invalid_callback(callback);
    }

    pub fn on_error(
        &self,
        callback: impl Fn(&ResponseRef, &DispatchError) -> Result<(), HandlerError> + 'static,
    ) {
        self.context.set_error_callback(callback);
    }

    pub fn on_event(&self, event: &str, handler: impl Fn(&str) + 'static) {
        self.context.on_event(event, handler);
    }
}

/// A trimmed, non-empty string field of a configuration entry.
fn entry_str<'a>(entry: &'a JsonValue, key: &str) -> Option<&'a str> {
    entry
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// A list of strings, or a single string.
fn string_list(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(JsonValue::as_str)
            .map(str::to_string)
            .collect(),
        Some(JsonValue::String(item)) => vec![item.clone()],
        _ => Vec::new(),
    }
}
