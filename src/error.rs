//! Structured error handling for fmlkb
//!
//! Every fallible operation in the crate returns [`FmlResult`]. An
//! [`FmlError`] carries:
//! - a stable numeric [`ErrorCode`] for programmatic handling
//! - a human-readable message
//! - an [`ErrorContext`] naming the offending entity (system, variable,
//!   term, rule, clause index)
//! - an optional hint
//!
//! # Error Categories
//!
//! - `1xxx` - FML/XML syntax problems found while parsing
//! - `2xxx` - Document model violations (shape registry, term arity, structure)
//! - `3xxx` - Row streams and the relational store
//! - `7xxx` - Configuration
//! - `9xxx` - Internal
//!
//! # Example
//!
//! ```rust,ignore
//! use fmlkb::error::{FmlError, ErrorCode};
//!
//! fn check(name: &str) -> Result<(), FmlError> {
//!     if name.is_empty() {
//!         return Err(FmlError::invalid_document("system name is empty")
//!             .with_context("system", name));
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Error Codes
// ============================================================================

/// Unique error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Parse errors (1xxx)
    /// Generic parse error
    ParseError = 1000,
    /// Malformed XML
    XmlSyntax = 1001,
    /// Required attribute or child element absent
    MissingAttribute = 1002,
    /// Attribute text is not a number
    InvalidNumber = 1003,
    /// Document file does not exist
    FileNotFound = 1004,

    // Document errors (2xxx)
    /// Shape identifier outside the registry
    UnknownShape = 2001,
    /// Parameter arity mismatch, or missing/ambiguous shape element
    MalformedTerm = 2002,
    /// Structural invariant violation
    InvalidDocument = 2003,

    // Store errors (3xxx)
    /// Generic store error
    StoreError = 3000,
    /// Row stream lacks a required ancestor column
    IncompleteRow = 3001,
    /// Storage collaborator did not persist an entity
    PersistenceFailed = 3002,
    /// No system with the requested name
    SystemNotFound = 3003,
    /// A system with the same name is already stored
    DuplicateSystem = 3004,

    // Config errors (7xxx)
    /// Generic config error
    ConfigError = 7000,
    /// Config file not found
    ConfigNotFound = 7001,
    /// Invalid config syntax
    InvalidConfigSyntax = 7002,

    // Internal errors (9xxx)
    /// Internal error
    InternalError = 9000,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a short description of the error code
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::XmlSyntax => "Malformed XML",
            ErrorCode::MissingAttribute => "Missing required attribute",
            ErrorCode::InvalidNumber => "Invalid numeric value",
            ErrorCode::FileNotFound => "File not found",

            ErrorCode::UnknownShape => "Unknown membership function shape",
            ErrorCode::MalformedTerm => "Malformed fuzzy term",
            ErrorCode::InvalidDocument => "Invalid document",

            ErrorCode::StoreError => "Store error",
            ErrorCode::IncompleteRow => "Incomplete row",
            ErrorCode::PersistenceFailed => "Persistence failed",
            ErrorCode::SystemNotFound => "System not found",
            ErrorCode::DuplicateSystem => "Duplicate system",

            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::ConfigNotFound => "Configuration file not found",
            ErrorCode::InvalidConfigSyntax => "Invalid configuration syntax",

            ErrorCode::InternalError => "Internal error",
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ParseError
            | ErrorCode::XmlSyntax
            | ErrorCode::MissingAttribute
            | ErrorCode::InvalidNumber => 400,

            ErrorCode::UnknownShape
            | ErrorCode::MalformedTerm
            | ErrorCode::InvalidDocument => 422,

            ErrorCode::FileNotFound | ErrorCode::SystemNotFound | ErrorCode::ConfigNotFound => 404,

            ErrorCode::DuplicateSystem => 409,

            ErrorCode::StoreError
            | ErrorCode::IncompleteRow
            | ErrorCode::PersistenceFailed
            | ErrorCode::ConfigError
            | ErrorCode::InvalidConfigSyntax
            | ErrorCode::InternalError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

// ============================================================================
// Error Context
// ============================================================================

/// Additional context information for an error
///
/// Fields are kept sorted so that rendered errors are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Key-value pairs of context information
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    /// Source location (file:line)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Stack of error causes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ErrorContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// Main Error Type
// ============================================================================

/// The error type for every codec, store and service operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmlError {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
    /// Hint for resolving the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl FmlError {
    /// Create a new error with a code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
        }
    }

    // ========================================================================
    // Factory methods
    // ========================================================================

    /// Malformed XML
    pub fn xml_syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::XmlSyntax, message)
    }

    /// A required attribute is absent on `element`
    pub fn missing_attribute(element: &str, attribute: &str) -> Self {
        Self::new(
            ErrorCode::MissingAttribute,
            format!("<{}> is missing required attribute '{}'", element, attribute),
        )
        .with_context("element", element)
        .with_context("attribute", attribute)
    }

    /// Attribute text could not be read as a number
    pub fn invalid_number(attribute: &str, text: &str) -> Self {
        Self::new(
            ErrorCode::InvalidNumber,
            format!("attribute '{}' is not a number: '{}'", attribute, text),
        )
        .with_context("attribute", attribute)
    }

    /// Shape identifier outside the registry
    pub fn unknown_shape(shape: &str) -> Self {
        Self::new(ErrorCode::UnknownShape, format!("unknown shape '{}'", shape))
            .with_context("shape", shape)
            .with_hint(
                "Known shapes: leftLinearShape, triangularShape, leftGaussianShape, \
                 piShape, rightGaussianShape, trapezoidShape",
            )
    }

    /// Malformed fuzzy term
    pub fn malformed_term(term: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedTerm, message).with_context("term", term)
    }

    /// Structural invariant violation
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidDocument, message)
    }

    /// Row stream lacks an ancestor column
    pub fn incomplete_row(row: usize, column: &str) -> Self {
        Self::new(
            ErrorCode::IncompleteRow,
            format!("row {} has no value for required column '{}'", row, column),
        )
        .with_context("row", row.to_string())
        .with_context("column", column)
    }

    /// Storage collaborator failed to persist an entity
    pub fn persistence_failed(entity: &str, name: &str) -> Self {
        Self::new(
            ErrorCode::PersistenceFailed,
            format!("failed to persist {} '{}'", entity, name),
        )
        .with_context(entity, name)
    }

    /// Generic store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreError, message)
    }

    /// No such system
    pub fn system_not_found(name: &str) -> Self {
        Self::new(ErrorCode::SystemNotFound, format!("no fuzzy system named '{}'", name))
            .with_context("system", name)
    }

    /// Document file missing
    pub fn file_not_found(path: &std::path::Path) -> Self {
        Self::new(ErrorCode::FileNotFound, format!("file '{}' does not exist", path.display()))
            .with_context("path", path.display().to_string())
    }

    /// System already stored
    pub fn duplicate_system(name: &str) -> Self {
        Self::new(
            ErrorCode::DuplicateSystem,
            format!("a fuzzy system named '{}' is already stored", name),
        )
        .with_context("system", name)
        .with_hint("Delete the stored system first")
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    /// Set the error code
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::new);
        ctx.fields.insert(key.into(), value.into());
        self
    }

    /// Add a cause to the error chain
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::new);
        ctx.causes.push(cause.into());
        self
    }

    /// Add source location
    pub fn at(mut self, location: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::new);
        ctx.location = Some(location.into());
        self
    }

    /// Add a hint for resolving the error
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Look up a context field, e.g. `"rule"` or `"clause"`
    pub fn context_field(&self, key: &str) -> Option<&str> {
        self.context
            .as_ref()
            .and_then(|c| c.fields.get(key))
            .map(String::as_str)
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":"INTERNAL_ERROR","message":"{}"}}"#, self.message)
        })
    }
}

impl fmt::Display for FmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)?;

        if let Some(ref ctx) = self.context {
            if !ctx.fields.is_empty() {
                let fields: Vec<String> = ctx
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                write!(f, " ({})", fields.join(", "))?;
            }
            if let Some(ref loc) = ctx.location {
                write!(f, " at {}", loc)?;
            }
            if !ctx.causes.is_empty() {
                write!(f, "\nCaused by:")?;
                for cause in &ctx.causes {
                    write!(f, "\n  - {}", cause)?;
                }
            }
        }

        if let Some(ref hint) = self.hint {
            write!(f, "\nHint: {}", hint)?;
        }

        Ok(())
    }
}

impl std::error::Error for FmlError {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<std::io::Error> for FmlError {
    fn from(err: std::io::Error) -> Self {
        FmlError::internal(err.to_string()).with_context("io", format!("{:?}", err.kind()))
    }
}

impl From<quick_xml::Error> for FmlError {
    fn from(err: quick_xml::Error) -> Self {
        FmlError::xml_syntax(err.to_string())
    }
}

impl From<rusqlite::Error> for FmlError {
    fn from(err: rusqlite::Error) -> Self {
        FmlError::store(err.to_string()).with_context("backend", "sqlite")
    }
}

impl From<serde_json::Error> for FmlError {
    fn from(err: serde_json::Error) -> Self {
        FmlError::new(ErrorCode::ParseError, err.to_string()).with_context("format", "JSON")
    }
}

impl From<toml::de::Error> for FmlError {
    fn from(err: toml::de::Error) -> Self {
        FmlError::config(err.to_string()).with_code(ErrorCode::InvalidConfigSyntax)
    }
}

// ============================================================================
// Result type alias
// ============================================================================

/// A Result type using FmlError
pub type FmlResult<T> = Result<T, FmlError>;

// ============================================================================
// Error response for HTTP APIs
// ============================================================================

/// Structured error response for HTTP APIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error indicator
    pub error: bool,
    /// Error code (string form)
    pub code: String,
    /// Numeric error code
    pub code_num: u32,
    /// HTTP status code
    pub status: u16,
    /// Error message
    pub message: String,
    /// Additional details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,
    /// Hint for resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl From<&FmlError> for ErrorResponse {
    fn from(err: &FmlError) -> Self {
        Self {
            error: true,
            code: format!("{:?}", err.code),
            code_num: err.code.code(),
            status: err.http_status(),
            message: err.message.clone(),
            details: err.context.as_ref().map(|c| c.fields.clone()),
            hint: err.hint.clone(),
        }
    }
}

impl From<FmlError> for ErrorResponse {
    fn from(err: FmlError) -> Self {
        Self::from(&err)
    }
}

// ============================================================================
// Macros for convenient error creation
// ============================================================================

/// Create an FmlError with context from the current location
#[macro_export]
macro_rules! fml_error {
    ($code:expr, $msg:expr) => {
        $crate::error::FmlError::new($code, $msg)
            .at(format!("{}:{}", file!(), line!()))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        $crate::error::FmlError::new($code, format!($fmt, $($arg)*))
            .at(format!("{}:{}", file!(), line!()))
    };
}

/// Bail out early with an error
#[macro_export]
macro_rules! fml_bail {
    ($code:expr, $msg:expr) => {
        return Err($crate::fml_error!($code, $msg))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::fml_error!($code, $fmt, $($arg)*))
    };
}

/// Ensure a condition holds, or return an error
#[macro_export]
macro_rules! fml_ensure {
    ($cond:expr, $code:expr, $msg:expr) => {
        if !$cond {
            $crate::fml_bail!($code, $msg);
        }
    };
    ($cond:expr, $code:expr, $fmt:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::fml_bail!($code, $fmt, $($arg)*);
        }
    };
}

// ============================================================================
// Tests
// ============================================================================
