//! Response template subsystem.
//!
//! # Data Flow
//! ```text
//! ResponseSpec.body (operator-configured source)
//!     → parser.rs (nodes + expression trees, filters resolved)
//!     → eval.rs (closed evaluator over JSON values)
//!     → rendered String
//!
//! Per request:
//!     RenderContext + PathVariables + body/query
//!     → context.rs (Bindings: request, context, matched, path, body, query, requestdata)
//! ```
//!
//! # Design Decisions
//! - The language is a closed enumeration: literals, names, `.attr`, `[index]`,
//!   `+`, `~`, and the `md5` / `tojson` filters. Nothing else exists to reach.
//! - Names starting with `_` are never resolved
//! - Undefined names fail the render instead of printing empty text
//! - Only operator-configured templates are rendered; request data is only
//!   ever a value, never template source

pub mod context;
pub mod eval;
pub mod parser;

pub use context::{Bindings, RenderContext};

/// Template rendering failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("template syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("undefined: {0}")]
    Undefined(String),
    #[error("security violation: {0}")]
    Security(String),
    #[error("type error: {0}")]
    Type(String),
}

impl TemplateError {
    /// True for sandbox violations (private names, calls, unknown filters).
    pub fn is_security(&self) -> bool {
        matches!(self, TemplateError::Security(_))
    }
}

/// Render `source` against `bindings`.
pub fn render(source: &str, bindings: &Bindings) -> Result<String, TemplateError> {
    let nodes = parser::parse(source)?;
    let scope = bindings.scope();
    eval::render_nodes(&nodes, &scope)
}

/// Lowercase hex MD5 digest of `input`.
pub fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
