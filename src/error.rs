//! Error types for template parsing and rendering.
//!
//! Every failure in the engine is a [`TemplateError`]. Errors are propagated
//! to the caller of parse/render immediately; there is no in-template
//! recovery.

use thiserror::Error;

/// The error type for the template engine.
///
/// Each variant identifies the rule that was violated and carries a
/// single-line message naming the offending fragment, name, or operator
/// where applicable.
#[derive(Error, Debug)]
pub enum TemplateError {
    // ── Expression text ──────────────────────────────────────────────

    /// An invalid character or unterminated literal in expression text.
    #[error("Lexical error: {0}")]
    Lexical(String),

    /// An expression grammar violation or unexpected template tag.
    #[error("Syntax error: {0}")]
    Syntax(String),

    // ── Evaluation ───────────────────────────────────────────────────

    /// An unbound variable, unknown filter, unknown test, or unknown callable.
    #[error("Name lookup error: {0}")]
    NameLookup(String),

    /// An operator/operand combination that is not defined.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A value conversion (`as_int`, `as_float`, display formatting) failed.
    #[error("Coercion error: {0}")]
    Coercion(String),

    /// A call trailer `(...)` was applied to something that is not a
    /// registered callable name.
    #[error("Call on non-callable: {0}")]
    CallOnNonCallable(String),

    // ── Argument binding ─────────────────────────────────────────────

    /// A required parameter was left unfilled after argument binding.
    #[error("Missing required argument: {0}")]
    MissingRequiredArg(String),

    /// A named argument did not match any declared parameter.
    #[error("Unknown argument name: {0}")]
    UnknownArgName(String),

    /// A positional argument appeared after a named argument.
    #[error("Positional argument after named argument: {0}")]
    PositionalAfterNamed(String),

    // ── Rendering ────────────────────────────────────────────────────

    /// A for-loop item could not be unpacked onto the target list.
    #[error("Assignment error: {0}")]
    AssignmentArity(String),

    /// A block tag was opened but its terminator was never found.
    #[error("Unterminated block: {0}")]
    UnterminatedBlock(String),
}

/// A convenience type alias for `Result<T, TemplateError>`.
pub type TemplateResult<T> = Result<T, TemplateError>;
