//! Error types for configuration, dispatch, views and module setup.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a configuration file.
///
/// Malformed namespace entries inside a valid file are not errors: they
/// are skipped when the configuration is applied.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config file extension '{0}' (expected yaml, yml or json)")]
    UnsupportedFormat(String),

    #[error("Config root must be a mapping")]
    NotAMapping,
}

/// Errors raised by host-supplied code: controller methods, module hooks
/// and lifecycle callbacks.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    View(#[from] ViewError),
}

impl HandlerError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Failure raised while the dispatch engine invokes a controller method.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Method '{method}' of class '{class}' is protected")]
    ProtectedMethod { class: String, method: String },

    #[error("Method '{method}' of class '{class}' is not exported")]
    NotExported { class: String, method: String },

    #[error("Controller '{0}' is already handling a call")]
    Busy(String),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("{0}")]
    Engine(String),
}

impl DispatchError {
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }
}

/// Errors raised while rendering a view.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Unknown view namespace '{0}'")]
    UnknownNamespace(String),

    #[error("No view renderer registered with id '{0}'")]
    UnknownRenderer(String),

    #[error("Cannot read template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A host hook failed while the setup pipeline was running.
///
/// The module stays un-initialized so the next entry point call retries
/// the whole pipeline.
#[derive(Debug, Error)]
#[error("Module setup failed in stage '{stage}': {source}")]
pub struct SetupError {
    pub stage: &'static str,
    #[source]
    pub source: HandlerError,
}

impl SetupError {
    pub fn new(stage: &'static str, source: HandlerError) -> Self {
        Self { stage, source }
    }
}

/// Umbrella error returned by the module entry points.
#[derive(Debug, Error)]
pub enum AjaxError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    View(#[from] ViewError),
}
