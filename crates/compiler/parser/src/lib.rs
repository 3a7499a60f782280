pub mod ast;
pub mod lexer;
pub mod parser;

// Re-export important types from parser module
pub use ast::{Name, Program, SymbolId};
pub use parser::{parse_source, ParseOutput};
