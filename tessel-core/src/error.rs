//! Error types for the Tessel runtime.
//!
//! Two layers of failure exist:
//!
//! - [`EvalError`] is what component authors return from their expressions.
//! - [`Error`] is what the runtime reports. Errors raised inside a flush are
//!   never returned across the scheduler boundary; they are pushed onto the
//!   runtime's diagnostic channel (see [`Runtime::take_diagnostics`]) and
//!   logged through `tracing`.
//!
//! [`Runtime::take_diagnostics`]: crate::Runtime::take_diagnostics

use thiserror::Error;

use crate::component::ComponentId;
use crate::dom::NodeId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure raised by a user expression while a watcher evaluates it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Free-form failure message.
    #[error("{0}")]
    Message(String),

    /// A value had the wrong shape for the operation.
    #[error("`{path}` is not {expected}")]
    Type {
        path: String,
        expected: &'static str,
    },
}

impl EvalError {
    /// Build a free-form evaluation error.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Errors reported by the runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A watcher's evaluation function failed.
    #[error("error evaluating `{watcher}` in component `{component}`: {source}")]
    Evaluation {
        watcher: String,
        component: String,
        #[source]
        source: EvalError,
    },

    /// A flush exceeded the per-watcher run bound. The rest of the queue
    /// was dropped for this cycle.
    #[error(
        "possible infinite update loop in `{watcher}`: ran more than {limit} times in one flush"
    )]
    RunawayUpdate { watcher: String, limit: u32 },

    /// A template referenced a component name that is not registered.
    #[error("unknown component `{0}`")]
    UnknownComponent(String),

    /// A template referenced a directive name that is not registered.
    #[error("unknown directive `{0}`")]
    UnknownDirective(String),

    /// An operation targeted an instance that is not in the arena.
    #[error("no live component instance {0}")]
    NoSuchInstance(ComponentId),

    /// A render target is not attached to any parent node.
    #[error("render target {0} has no parent node")]
    Detached(NodeId),

    /// The runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_error_names_the_watcher_and_component() {
        let err = Error::Evaluation {
            watcher: "text:msg".into(),
            component: "greeting".into(),
            source: EvalError::msg("boom"),
        };
        let text = err.to_string();
        assert!(text.contains("text:msg"));
        assert!(text.contains("greeting"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn runaway_error_mentions_the_bound() {
        let err = Error::RunawayUpdate {
            watcher: "watch:n".into(),
            limit: 100,
        };
        assert!(err.to_string().contains("100"));
    }
}
