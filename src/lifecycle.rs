//! Request lifecycle.
//!
//! Every inbound request goes through:
//!
//! ```text
//! Idle -> Validating -> Dispatching -> Completed
//!              |             |
//!              +--> Aborted <+
//! ```
//!
//! - `Validating`: the class and method names must match `[A-Za-z0-9_.-]+`
//!   and the class must resolve to an instance. On failure the request is
//!   aborted and the *invalid* callback receives the response and a message.
//! - The *before* callback runs next and may return [`Flow::Abort`].
//! - `Dispatching`: the engine invokes the method. On success the *after*
//!   callback runs. On failure the *error* callback handles the error; with
//!   no error callback the error is returned to the host.
//!
//! Errors returned by the callbacks themselves always reach the host.

use std::rc::Rc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::context::AppContext;
use crate::controller::Instance;
use crate::engine::RequestPayload;
use crate::error::{AjaxError, DispatchError, HandlerError};
use crate::response::ResponseRef;

lazy_static! {
    static ref NAME_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap();
}

/// Returned by the *before* callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    #[default]
    Continue,
    Abort,
}

pub type InitCallback = Rc<dyn Fn(&Instance) -> Result<(), HandlerError>>;
pub type BeforeCallback = Rc<dyn Fn(&Instance, &str) -> Result<Flow, HandlerError>>;
pub type AfterCallback = Rc<dyn Fn(&Instance, &str) -> Result<(), HandlerError>>;
pub type InvalidCallback = Rc<dyn Fn(&ResponseRef, &str) -> Result<(), HandlerError>>;
pub type ErrorCallback = Rc<dyn Fn(&ResponseRef, &DispatchError) -> Result<(), HandlerError>>;

/// Host callbacks. All optional.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub init: Option<InitCallback>,
    pub before: Option<BeforeCallback>,
    pub after: Option<AfterCallback>,
    pub invalid: Option<InvalidCallback>,
    pub error: Option<ErrorCallback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Validating,
    Dispatching,
    Completed,
    Aborted,
}

/// State of one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub class_name: String,
    pub method_name: String,
    pub abort: bool,
    pub state: LifecycleState,
    pub instance: Option<Rc<Instance>>,
    /// Why the request was aborted, if it was.
    pub reason: Option<String>,
}

impl RequestContext {
    pub fn new(class_name: &str, method_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            abort: false,
            state: LifecycleState::Idle,
            instance: None,
            reason: None,
        }
    }

    fn abort(&mut self, reason: String) {
        tracing::warn!(
            class = %self.class_name,
            method = %self.method_name,
            reason = %reason,
            "request aborted"
        );
        self.abort = true;
        self.state = LifecycleState::Aborted;
        self.reason = Some(reason);
    }
}

/// Check a class or method name against the allow-list.
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// Runs inbound requests against a context.
pub struct RequestLifecycle<'a> {
    context: &'a AppContext,
}

impl<'a> RequestLifecycle<'a> {
    pub fn new(context: &'a AppContext) -> Self {
        Self { context }
    }

    /// Process one request. A missing payload is an invalid request.
    pub fn run(&self, payload: Option<&RequestPayload>) -> Result<RequestContext, AjaxError> {
        let Some(payload) = payload else {
            let request = RequestContext::new("", "");
            return self.reject(request, "Missing request payload".to_string());
        };

        let mut request = RequestContext::new(&payload.class, &payload.method);
        request.state = LifecycleState::Validating;

        if !is_valid_name(&payload.class) || !is_valid_name(&payload.method) {
            let message = format!(
                "Invalid request: class '{}', method '{}'",
                payload.class, payload.method
            );
            return self.reject(request, message);
        }

        let Some(instance) = self.context.instance(&payload.class)? else {
            let message = format!("Cannot find controller '{}'", payload.class);
            return self.reject(request, message);
        };
        request.instance = Some(instance.clone());

        let before = self.context.callbacks().before.clone();
        if let Some(before) = before {
            if before(&instance, &payload.method)? == Flow::Abort {
                request.abort("Aborted by the before callback".to_string());
                return Ok(request);
            }
        }

        request.state = LifecycleState::Dispatching;
        tracing::debug!(class = %instance.name(), method = %payload.method, "dispatching");

        match self
            .context
            .engine()
            .invoke(&instance, &payload.method, &payload.args)
        {
            Ok(()) => {
                let after = self.context.callbacks().after.clone();
                if let Some(after) = after {
                    after(&instance, &payload.method)?;
                }
                request.state = LifecycleState::Completed;
                Ok(request)
            }
            Err(error) => {
                let callback = self.context.callbacks().error.clone();
                let Some(callback) = callback else {
                    return Err(error.into());
                };
                callback(&self.context.response(), &error)?;
                request.abort(error.to_string());
                Ok(request)
            }
        }
    }

    fn reject(
        &self,
        mut request: RequestContext,
        message: String,
    ) -> Result<RequestContext, AjaxError> {
        let callback = self.context.callbacks().invalid.clone();
        if let Some(callback) = callback {
            callback(&self.context.response(), &message)?;
        }
        request.abort(message);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Controller;
    use crate::engine::ClassTable;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value as JsonValue};
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct Demo;

    impl Controller for Demo {
        fn exports(&self) -> Vec<&'static str> {
            vec!["hello", "fail"]
        }

        fn call(
            &mut self,
            cx: &Instance,
            method: &str,
            args: &[JsonValue],
        ) -> Result<(), HandlerError> {
            match method {
                "hello" => {
                    let name = args.first().and_then(JsonValue::as_str).unwrap_or("world");
                    if let Some(response) = cx.response() {
                        response.borrow_mut().alert(format!("hello {}", name));
                    }
                    Ok(())
                }
                "fail" => Err(HandlerError::message("boom")),
                "secret" => Ok(()),
                _ => Err(HandlerError::UnknownMethod(method.to_string())),
            }
        }
    }

    #[derive(Default)]
    struct Counters {
        before: Cell<usize>,
        after: Cell<usize>,
        invalid: RefCell<Vec<String>>,
        errors: RefCell<Vec<String>>,
    }

    fn setup() -> (Rc<AppContext>, Rc<Counters>) {
        let table = Rc::new(ClassTable::new());
        table.define::<Demo>("Demo");
        let cx = AppContext::new(table);
        let counters = Rc::new(Counters::default());

        let c = counters.clone();
        cx.set_before_callback(move |_, _| {
            c.before.set(c.before.get() + 1);
            Ok(Flow::Continue)
        });
        let c = counters.clone();
        cx.set_after_callback(move |_, _| {
            c.after.set(c.after.get() + 1);
            Ok(())
        });
        let c = counters.clone();
        cx.set_invalid_callback(move |_, message| {
            c.invalid.borrow_mut().push(message.to_string());
            Ok(())
        });

        (cx, counters)
    }

    #[test]
    fn test_name_allow_list() {
        assert!(is_valid_name("App.Ajax.Users"));
        assert!(is_valid_name("user_list-2"));
        assert!(!is_valid_name("invalid path!"));
        assert!(!is_valid_name("../etc/passwd"));
        assert!(!is_valid_name("a\nb"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn test_invalid_class_name_never_dispatches() {
        let (cx, counters) = setup();
        let payload = RequestPayload::new("invalid path!", "x");

        let request = RequestLifecycle::new(&cx).run(Some(&payload)).unwrap();

        assert_eq!(request.state, LifecycleState::Aborted);
        assert!(request.abort);
        assert!(request.instance.is_none());
        assert_eq!(counters.invalid.borrow().len(), 1);
        assert_eq!(counters.before.get(), 0);
        assert_eq!(counters.after.get(), 0);
        assert!(cx.response().borrow().is_empty());
    }

    #[test]
    fn test_valid_request_runs_hooks_once() {
        let (cx, counters) = setup();
        let mut payload = RequestPayload::new("Demo", "hello");
        payload.args.push(json!("ada"));

        let request = RequestLifecycle::new(&cx).run(Some(&payload)).unwrap();

        assert_eq!(request.state, LifecycleState::Completed);
        assert!(!request.abort);
        assert_eq!(counters.before.get(), 1);
        assert_eq!(counters.after.get(), 1);
        assert!(counters.invalid.borrow().is_empty());
        assert_eq!(
            cx.response().borrow().to_json().unwrap(),
            r#"{"commands":[{"cmd":"alert","message":"hello ada"}]}"#
        );
    }

    #[test]
    fn test_unknown_class_is_invalid() {
        let (cx, counters) = setup();
        let payload = RequestPayload::new("Missing", "hello");

        let request = RequestLifecycle::new(&cx).run(Some(&payload)).unwrap();

        assert_eq!(request.state, LifecycleState::Aborted);
        assert_eq!(
            *counters.invalid.borrow(),
            vec!["Cannot find controller 'Missing'".to_string()]
        );
    }

    #[test]
    fn test_missing_payload_is_invalid() {
        let (cx, counters) = setup();
        let request = RequestLifecycle::new(&cx).run(None).unwrap();
        assert_eq!(request.state, LifecycleState::Aborted);
        assert_eq!(counters.invalid.borrow().len(), 1);
    }

    #[test]
    fn test_before_callback_can_abort() {
        let (cx, counters) = setup();
        cx.set_before_callback(|_, method| {
            Ok(if method == "hello" {
                Flow::Abort
            } else {
                Flow::Continue
            })
        });

        let request = RequestLifecycle::new(&cx)
            .run(Some(&RequestPayload::new("Demo", "hello")))
            .unwrap();

        assert_eq!(request.state, LifecycleState::Aborted);
        assert_eq!(counters.after.get(), 0);
        assert!(cx.response().borrow().is_empty());
    }

    #[test]
    fn test_dispatch_error_without_callback_reaches_host() {
        let (cx, counters) = setup();

        let result = RequestLifecycle::new(&cx).run(Some(&RequestPayload::new("Demo", "fail")));

        assert!(matches!(
            result,
            Err(AjaxError::Dispatch(DispatchError::Handler(HandlerError::Message(_))))
        ));
        assert_eq!(counters.after.get(), 0);
    }

    #[test]
    fn test_dispatch_error_routed_to_error_callback() {
        let (cx, counters) = setup();
        let c = counters.clone();
        cx.set_error_callback(move |response, error| {
            response.borrow_mut().alert(error.to_string());
            c.errors.borrow_mut().push(error.to_string());
            Ok(())
        });

        let request = RequestLifecycle::new(&cx)
            .run(Some(&RequestPayload::new("Demo", "fail")))
            .unwrap();

        assert_eq!(request.state, LifecycleState::Aborted);
        assert_eq!(*counters.errors.borrow(), vec!["boom".to_string()]);
        assert_eq!(counters.after.get(), 0);
    }

    #[test]
    fn test_protected_method_is_a_dispatch_error() {
        let (cx, _) = setup();
        let result = RequestLifecycle::new(&cx).run(Some(&RequestPayload::new("Demo", "init")));
        assert!(matches!(
            result,
            Err(AjaxError::Dispatch(DispatchError::ProtectedMethod { .. }))
        ));
    }

    #[test]
    fn test_unexported_method_is_a_dispatch_error() {
        let (cx, counters) = setup();
        let result = RequestLifecycle::new(&cx).run(Some(&RequestPayload::new("Demo", "secret")));
        assert!(matches!(
            result,
            Err(AjaxError::Dispatch(DispatchError::NotExported { method, .. })) if method == "secret"
        ));
        assert_eq!(counters.after.get(), 0);
        assert!(cx.response().borrow().is_empty());
    }

    #[test]
    fn test_init_error_reaches_host() {
        let (cx, counters) = setup();
        cx.set_init_callback(|_| Err(HandlerError::message("no database")));

        let result = RequestLifecycle::new(&cx).run(Some(&RequestPayload::new("Demo", "hello")));

        assert!(matches!(result, Err(AjaxError::Handler(_))));
        assert_eq!(counters.before.get(), 0);
        assert_eq!(counters.after.get(), 0);
        assert!(counters.invalid.borrow().is_empty());
    }

    #[test]
    fn test_callback_error_reaches_host() {
        let (cx, _) = setup();
        cx.set_invalid_callback(|_, _| Err(HandlerError::message("invalid hook failed")));

        let result = RequestLifecycle::new(&cx).run(Some(&RequestPayload::new("bad name", "x")));
        assert!(matches!(result, Err(AjaxError::Handler(_))));
    }
}
