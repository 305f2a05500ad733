use std::fmt::Display;

use crate::types::position::SourceRange;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Note,
    Warning,
    Error,
}

impl Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticLevel::Error => write!(f, "error"),
            DiagnosticLevel::Warning => write!(f, "warning"),
            DiagnosticLevel::Note => write!(f, "note"),
        }
    }
}

/// A structured error carrying file and range context. Fatal discovery
/// failures and fix-merge rejections are both surfaced as diagnostics.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub range: Option<SourceRange>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic { level: DiagnosticLevel::Error, message: message.into(), range: None }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic { level: DiagnosticLevel::Warning, message: message.into(), range: None }
    }

    pub fn note(message: impl Into<String>) -> Self {
        Diagnostic { level: DiagnosticLevel::Note, message: message.into(), range: None }
    }

    pub fn with_range(mut self, range: &SourceRange) -> Self {
        self.range = Some(range.clone());
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.level, DiagnosticLevel::Error)
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{}: {}", range, self.message),
            None => write!(f, "{}: {}", self.level, self.message),
        }
    }
}

impl From<Diagnostic> for String {
    fn from(diagnostic: Diagnostic) -> Self {
        diagnostic.to_string()
    }
}

impl From<String> for Diagnostic {
    fn from(message: String) -> Self {
        Diagnostic::error(message)
    }
}

impl From<&str> for Diagnostic {
    fn from(message: &str) -> Self {
        Diagnostic::error(message.to_string())
    }
}
