//! Error types for evaluation.
//!
//! Language-level exceptions travel as [`BaseException`], a wrapper around
//! the raised Object. Everything that is not a language exception (a broken
//! interpreter invariant) is [`EvalError::Fatal`] and maps to the process
//! fatal status.

use thiserror::Error;

use crate::object::{to_str, Object};

/// Error flowing out of every evaluator step.
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    /// A raised language exception
    #[error(transparent)]
    Exception(#[from] BaseException),

    /// Interpreter invariant violated
    #[error("fatal: {message}")]
    Fatal {
        /// Description of the broken invariant
        message: String,
    },
}

impl EvalError {
    /// Build a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        EvalError::Fatal {
            message: message.into(),
        }
    }

    /// The raised exception, if this is one.
    pub fn exception(&self) -> Option<&BaseException> {
        match self {
            EvalError::Exception(exception) => Some(exception),
            EvalError::Fatal { .. } => None,
        }
    }
}

/// A raised language-level exception.
#[derive(Error, Debug, Clone)]
#[error("{}", render(.value))]
pub struct BaseException {
    value: Object,
}

impl BaseException {
    /// Wrap a raised Object.
    pub fn new(value: Object) -> Self {
        BaseException { value }
    }

    /// The raised Object.
    pub fn value(&self) -> &Object {
        &self.value
    }

    /// Unwrap the raised Object.
    pub fn into_value(self) -> Object {
        self.value
    }

    /// Name of the exception's type.
    pub fn type_name(&self) -> String {
        self.value.type_name()
    }

    /// `__context__`, the exception being handled when this one was raised.
    pub fn context(&self) -> Option<BaseException> {
        chained(&self.value, "__context__")
    }

    /// `__cause__`, set by `raise ... from ...`.
    pub fn cause(&self) -> Option<BaseException> {
        chained(&self.value, "__cause__")
    }

    /// Multi-line rendering of the whole chain, oldest first.
    pub fn report(&self) -> String {
        let mut chain = vec![(self.value.clone(), None)];
        let mut current = self.value.clone();
        while chain.len() < 64 {
            let suppressed = current
                .attribute("__suppress_context__")
                .is_some_and(|flag| flag.get_bool());
            let context = if suppressed {
                None
            } else {
                chained(&current, "__context__")
            };
            let (next, link) = match (chained(&current, "__cause__"), context) {
                (Some(cause), _) => (cause, CAUSE),
                (None, Some(context)) => (context, CONTEXT),
                (None, None) => break,
            };
            current = next.value.clone();
            chain.push((current.clone(), Some(link)));
        }

        let mut out = String::new();
        for (index, (value, link)) in chain.iter().enumerate().rev() {
            out.push_str(&render(value));
            out.push('\n');
            if index > 0 {
                if let Some(link) = link {
                    out.push_str(link);
                }
            }
        }
        out
    }
}

const CAUSE: &str =
    "\nThe above exception was the direct cause of the following exception:\n\n";
const CONTEXT: &str =
    "\nDuring handling of the above exception, another exception occurred:\n\n";

fn chained(value: &Object, name: &str) -> Option<BaseException> {
    value
        .attribute(name)
        .filter(|linked| !matches!(linked.value(), crate::object::Value::None))
        .map(BaseException::new)
}

/// `ClassName: message`, or just `ClassName` without a message.
pub fn render(value: &Object) -> String {
    let message = to_str(value);
    let type_name = value.type_name();
    if message.is_empty() {
        type_name
    } else {
        format!("{}: {}", type_name, message)
    }
}

/// Result type alias for evaluation.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Process exit status for the outcome of a top-level evaluation.
pub fn exit_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(EvalError::Exception(_)) => 1,
        Err(EvalError::Fatal { .. }) => 254,
    }
}
