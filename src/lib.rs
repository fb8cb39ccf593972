//! A small Lisp: a streaming S-expression reader with source positions, a
//! tree-walking evaluator with definition-time capture and a tail-call
//! trampoline, and a supervisor that runs batches under a wall-clock
//! deadline with cooperative cancellation.

pub mod ast;
pub mod builtins;
pub mod entity;
pub mod env;
pub mod error;
pub mod eval;
pub mod reader;
pub mod run;

pub use entity::Entity;
pub use error::Error;
pub use eval::Context;
pub use reader::parse;
pub use run::{eval_source, run, run_with_timeout, DEFAULT_TIMEOUT};
