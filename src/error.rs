//! Error types for the PTL compiler

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at {path} (line {line}): {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Evaluation error: {message}")]
    Evaluation { message: String },

    #[error("Action error: {message}")]
    Action { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Maximum limit exceeded: {limit_type} (limit: {limit})")]
    LimitExceeded { limit_type: String, limit: usize },
}

impl TemplateError {
    pub fn parse(path: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        TemplateError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        TemplateError::Evaluation {
            message: message.into(),
        }
    }

    pub fn action(message: impl Into<String>) -> Self {
        TemplateError::Action {
            message: message.into(),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        TemplateError::Render {
            message: message.into(),
        }
    }

    pub fn invalid_format(message: impl Into<String>) -> Self {
        TemplateError::InvalidFormat {
            message: message.into(),
        }
    }

    pub fn limit_exceeded(limit_type: impl Into<String>, limit: usize) -> Self {
        TemplateError::LimitExceeded {
            limit_type: limit_type.into(),
            limit,
        }
    }

    /// Whether this error blocks publishing a template (vs. a locally
    /// recovered runtime condition).
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TemplateError::Evaluation { .. } | TemplateError::Action { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_location() {
        let err = TemplateError::parse("Show/When", 4, "unknown prop 'cond'");
        let text = err.to_string();
        assert!(text.contains("Show/When"));
        assert!(text.contains("line 4"));
        assert!(text.contains("cond"));
    }

    #[test]
    fn test_fatality_classes() {
        assert!(TemplateError::parse("x", 1, "bad").is_fatal());
        assert!(TemplateError::render("island out of tree").is_fatal());
        assert!(!TemplateError::evaluation("missing path").is_fatal());
        assert!(!TemplateError::action("Filter on non-array").is_fatal());
    }
}
