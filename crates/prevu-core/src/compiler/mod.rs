//! Compiler backend abstraction for transpilation.
//!
//! A trait-based seam over the source-to-source compiler so the rest of the
//! engine never calls SWC directly. One backend ships ([`SwcBackend`]); the
//! seam exists so a different transform (or a test double) can be swapped in
//! without touching the bundle pipeline.

pub mod swc;

pub use swc::SwcBackend;

use std::fmt;

/// JSX runtime flavor emitted for `.tsx` sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsxRuntime {
    /// `jsx`/`jsxs` calls importing from `react/jsx-runtime`.
    #[default]
    Automatic,
    /// `React.createElement` calls; requires `React` in scope.
    Classic,
}

/// Options for one transpile call.
///
/// `input_path` is the project-relative, '/'-delimited module path; syntax
/// (TS vs TSX) is chosen from its extension.
#[derive(Debug, Clone)]
pub struct TranspileOptions {
    pub input_path: String,
    pub jsx_runtime: JsxRuntime,
}

impl TranspileOptions {
    pub fn new(input_path: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            jsx_runtime: JsxRuntime::default(),
        }
    }

    #[must_use]
    pub fn with_jsx_runtime(mut self, runtime: JsxRuntime) -> Self {
        self.jsx_runtime = runtime;
        self
    }
}

/// Transpiled output. Still ECMAScript modules; the bundle pipeline lowers
/// import/export forms afterwards.
#[derive(Debug, Clone)]
pub struct TranspileOutput {
    pub code: String,
}

impl TranspileOutput {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// Error during transpilation.
#[derive(Debug, Clone)]
pub struct CompilerError {
    /// Stable error code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl CompilerError {
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new("COMPILER_PARSE_ERROR", message)
    }

    #[must_use]
    pub fn transform_error(message: impl Into<String>) -> Self {
        Self::new("COMPILER_TRANSFORM_ERROR", message)
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CompilerError {}

/// Compiler backend trait.
pub trait CompilerBackend: Send + Sync {
    /// Backend name (e.g. "swc").
    fn name(&self) -> &'static str;

    /// Transpile one module's source.
    ///
    /// # Errors
    ///
    /// Returns a [`CompilerError`] on syntax errors or failed transforms.
    fn transpile(
        &self,
        options: &TranspileOptions,
        source: &str,
    ) -> Result<TranspileOutput, CompilerError>;

    /// Whether this backend handles the given file extension.
    fn supports_extension(&self, ext: &str) -> bool {
        matches!(ext.to_lowercase().as_str(), "ts" | "tsx")
    }
}
