//! Per-instance factories: request calls and pagination.

use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value as JsonValue;

use super::ClassName;
use crate::context::AppContext;
use crate::error::HandlerError;
use crate::view::pagination::{DefaultPaginationRenderer, PageLink, PaginationRenderer};

/// A parameter of a javascript request call.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    /// A literal value, rendered as JSON.
    Value(JsonValue),
    /// The values of a form, by element id.
    FormValues(String),
    /// The value of an input field, by element id.
    InputValue(String),
    /// Placeholder replaced by the page number when paginating.
    PageNumber,
}

impl Parameter {
    fn to_js(&self) -> String {
        match self {
            Parameter::Value(value) => value.to_string(),
            Parameter::FormValues(id) => format!("soli.getFormValues({})", js_string(id)),
            Parameter::InputValue(id) => format!("soli.$({}).value", js_string(id)),
            Parameter::PageNumber => "{page}".to_string(),
        }
    }
}

fn js_string(value: &str) -> String {
    JsonValue::String(value.to_string()).to_string()
}

/// A call to a controller method, rendered as javascript.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestCall {
    target: String,
    method: String,
    params: Vec<Parameter>,
}

impl RequestCall {
    pub fn new(target: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            params: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<JsonValue>) -> Self {
        self.params.push(Parameter::Value(value.into()));
        self
    }

    pub fn form(mut self, id: &str) -> Self {
        self.params.push(Parameter::FormValues(id.to_string()));
        self
    }

    pub fn input(mut self, id: &str) -> Self {
        self.params.push(Parameter::InputValue(id.to_string()));
        self
    }

    /// Mark where the page number goes when this call is paginated.
    pub fn page_number(mut self) -> Self {
        self.params.push(Parameter::PageNumber);
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn has_page_number(&self) -> bool {
        self.params.contains(&Parameter::PageNumber)
    }

    /// This call with the page placeholder replaced by `page`.
    /// Without a placeholder, the page is appended as the last argument.
    pub fn with_page(&self, page: usize) -> RequestCall {
        let mut call = self.clone();
        if call.has_page_number() {
            for param in &mut call.params {
                if *param == Parameter::PageNumber {
                    *param = Parameter::Value(JsonValue::from(page));
                }
            }
        } else {
            call.params.push(Parameter::Value(JsonValue::from(page)));
        }
        call
    }

    pub fn to_js(&self) -> String {
        let params: Vec<String> = self.params.iter().map(Parameter::to_js).collect();
        format!("{}.{}({})", self.target, self.method, params.join(", "))
    }
}

impl fmt::Display for RequestCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js())
    }
}

/// Builds request calls for one class.
#[derive(Debug, Clone)]
pub struct RequestFactory {
    class: ClassName,
    js_name: String,
    namespace: Option<String>,
    context: Weak<AppContext>,
}

impl RequestFactory {
    pub(crate) fn new(
        class: ClassName,
        js_name: String,
        namespace: Option<String>,
        context: Weak<AppContext>,
    ) -> Self {
        Self {
            class,
            js_name,
            namespace,
            context,
        }
    }

    pub fn class_name(&self) -> &ClassName {
        &self.class
    }

    pub fn js_name(&self) -> &str {
        &self.js_name
    }

    /// A call to one of the class's methods.
    pub fn call(&self, method: &str) -> RequestCall {
        RequestCall::new(self.js_name.clone(), method)
    }

    /// Request factory of another class, resolved relative to this one.
    pub fn instance(&self, name: &str) -> Result<Option<RequestFactory>, HandlerError> {
        let Some(context) = self.context.upgrade() else {
            return Ok(None);
        };
        let instance = context.resolve_scoped(name, &self.class, self.namespace.as_deref())?;
        Ok(instance.map(|instance| instance.request()))
    }
}

/// Pagination state of an instance. Every call to
/// [`Instance::paginator`](super::Instance::paginator) overwrites it.
#[derive(Clone, Default)]
pub struct Paginator {
    total: usize,
    per_page: usize,
    current: usize,
    target: String,
    renderer: Option<Rc<dyn PaginationRenderer>>,
}

impl fmt::Debug for Paginator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paginator")
            .field("total", &self.total)
            .field("per_page", &self.per_page)
            .field("current", &self.current)
            .field("target", &self.target)
            .finish()
    }
}

/// Pages shown on each side of the current one before links are elided.
const PAGE_WINDOW: usize = 2;

impl Paginator {
    pub fn set_properties(&mut self, total: usize, per_page: usize, current: usize) {
        self.total = total;
        self.per_page = per_page;
        self.current = current;
    }

    pub(crate) fn set_target(&mut self, target: String) {
        self.target = target;
    }

    /// A paginated call to a method of the owning class.
    pub fn call(&self, method: &str) -> RequestCall {
        RequestCall::new(self.target.clone(), method).page_number()
    }

    pub(crate) fn set_renderer(&mut self, renderer: Option<Rc<dyn PaginationRenderer>>) {
        self.renderer = renderer;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn page_count(&self) -> usize {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(self.per_page)
    }

    /// The current page, clamped to the valid range.
    pub fn current_page(&self) -> usize {
        self.current.clamp(1, self.page_count().max(1))
    }

    /// Links for the pages, with elided ranges when there are many.
    pub fn links(&self, call: &RequestCall) -> Vec<PageLink> {
        let count = self.page_count();
        if count <= 1 {
            return Vec::new();
        }
        let current = self.current_page();

        let mut links = vec![PageLink::previous(
            (current > 1).then(|| call.with_page(current - 1).to_js()),
        )];

        let first_window = current.saturating_sub(PAGE_WINDOW).max(1);
        let last_window = (current + PAGE_WINDOW).min(count);
        if first_window > 1 {
            links.push(PageLink::page(1, call.with_page(1).to_js(), current == 1));
            if first_window > 2 {
                links.push(PageLink::gap());
            }
        }
        for page in first_window..=last_window {
            links.push(PageLink::page(page, call.with_page(page).to_js(), page == current));
        }
        if last_window < count {
            if last_window < count - 1 {
                links.push(PageLink::gap());
            }
            links.push(PageLink::page(count, call.with_page(count).to_js(), false));
        }

        links.push(PageLink::next(
            (current < count).then(|| call.with_page(current + 1).to_js()),
        ));
        links
    }

    /// Render the pagination markup for a call.
    pub fn render(&self, call: &RequestCall) -> String {
        let links = self.links(call);
        if links.is_empty() {
            return String::new();
        }
        match &self.renderer {
            Some(renderer) => renderer.render(&links),
            None => DefaultPaginationRenderer.render(&links),
        }
    }
}
