pub mod ast;
pub mod error;
pub mod eval;
pub mod functions;
pub mod parse;
pub mod runtime;
pub mod semantics;
pub mod value;
pub mod variables;
