//! # Entmoot
//!
//! The core of a dynamic, object-oriented scripting runtime.
//!
//! Entmoot evaluates a language-neutral syntax tree (produced by an external
//! parser) against a dynamic object model, without recursing on the native
//! stack, and reclaims memory with a background collector.
//!
//! ## Architecture
//!
//! - **Object model** ([`object`]): shared cells with an immutable payload
//!   and a lock-guarded attribute map
//! - **Protocol** ([`protocol`]): attribute resolution over the C3 method
//!   resolution order
//! - **Evaluator**: a continuation scheduler over explicit frame, body and
//!   step stacks, driven through [`ThreadContext`]
//! - **Collector** ([`collector`]): a pairing-heap forest of tracked
//!   Objects, scanned on a background thread, with a periodic cycle trace
//! - **Process** ([`ProcessContext`]): builtins, module table, resolver,
//!   collector and interrupt flag shared by every evaluator thread
//!
//! ## Example
//!
//! ```
//! use entmoot::ast::build::*;
//! use entmoot::ast::{Interactive, Operator};
//! use entmoot::{Config, ProcessContext};
//!
//! let process = ProcessContext::new(Config::default());
//! let mut thread = process.thread();
//! let unit = Interactive {
//!     body: vec![
//!         assign(name("a"), int(20)),
//!         expr(binop(name("a"), Operator::Add, int(22))),
//!     ]
//!     .into(),
//! };
//! let value = thread.evaluate(unit).unwrap();
//! assert_eq!(value.as_number().and_then(|n| n.to_i64()), Some(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod builtins;
pub mod collector;
pub mod config;
pub mod error;
mod eval;
pub mod modules;
pub mod number;
pub mod object;
pub mod process;
pub mod protocol;
pub mod thread;

// Re-export main types
pub use builtins::{Builtins, Exceptions};
pub use collector::{CollectorStats, GarbageCollector, ScanReport};
pub use config::{Config, GcConfig};
pub use error::{exit_code, render, BaseException, EvalError, Result};
pub use modules::ModuleTable;
pub use number::{Number, NumberError};
pub use object::{repr, to_str, AttributeError, Code, Id, Object, Value};
pub use process::{AstModules, ModuleResolver, NoModules, ProcessContext, ResolveError};
pub use protocol::{Attribute, Lookup, MroError};
pub use thread::{ThreadContext, Unit};

/// Entmoot version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
