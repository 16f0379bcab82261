//! Soli Ajax: controller registry, module setup and request lifecycle for
//! AJAX dispatch engines.
//!
//! This is the library root that exports all modules.
//!
//! # Overview
//!
//! - [`namespace`]: class and view namespaces, per-class options
//! - [`controller`]: controllers, their memoized instances and factories
//! - [`setup`]: the [`Module`] a host builds from its configuration
//! - [`lifecycle`]: validation and dispatch of one inbound request
//! - [`engine`]: the dispatch engine interface and the built-in [`ClassTable`]

// Allow some clippy lints that are stylistic and not critical
#![allow(clippy::module_inception)]
#![allow(clippy::result_large_err)]
#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]
#![allow(clippy::collapsible_if)]

pub mod config;
pub mod context;
pub mod controller;
pub mod engine;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod namespace;
pub mod response;
pub mod session;
pub mod setup;
pub mod view;

pub use config::{AppConfig, LibraryOptions};
pub use context::AppContext;
pub use controller::{ClassName, Controller, Instance};
pub use engine::{ClassTable, DispatchEngine, RequestPayload};
pub use error::AjaxError;
pub use lifecycle::{Flow, LifecycleState, RequestContext};
pub use response::{HttpReply, Response, ResponseRef};
pub use setup::{Module, ModuleHooks, NoHooks};
