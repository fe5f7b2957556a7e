//! Error types shared across Reelsmith crates.
//!
//! The variants mirror the stages of a render job. `Asset` and `Mix`
//! failures are recovered inside the job (fallback clip, silence); the
//! rest abort it.

use std::path::PathBuf;

/// Top-level error type for Reelsmith operations.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Asset error: {message}")]
    Asset { message: String },

    #[error("Timing error: {message}")]
    Timing { message: String },

    #[error("Mix error: {message}")]
    Mix { message: String },

    #[error("Graph error: {message}")]
    Graph { message: String },

    #[error(
        "Render error: {message}{}",
        .diagnostic.as_deref().map(|d| format!("\n{d}")).unwrap_or_default()
    )]
    Render {
        message: String,
        /// Raw stderr of the failing tool, untouched.
        diagnostic: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Required tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelError.
pub type ReelResult<T> = Result<T, ReelError>;

impl ReelError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset {
            message: msg.into(),
        }
    }

    pub fn timing(msg: impl Into<String>) -> Self {
        Self::Timing {
            message: msg.into(),
        }
    }

    pub fn mix(msg: impl Into<String>) -> Self {
        Self::Mix {
            message: msg.into(),
        }
    }

    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
            diagnostic: None,
            exit_code: None,
        }
    }

    /// A tool process exited unsuccessfully.
    pub fn tool_failed(
        msg: impl Into<String>,
        diagnostic: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        let diagnostic = diagnostic.into();
        Self::Render {
            message: msg.into(),
            diagnostic: (!diagnostic.trim().is_empty()).then_some(diagnostic),
            exit_code,
        }
    }

    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Whether the job may continue after this error by substituting
    /// a fallback for the failed piece.
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(self, Self::Asset { .. } | Self::Mix { .. })
    }

    /// Whether the error came from the user aborting or a deadline.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout(_))
    }

    /// Raw diagnostic text of a failed tool run, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Render { diagnostic, .. } => diagnostic.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_error_message() {
        let err = ReelError::timing("no scenes");
        assert_eq!(err.to_string(), "Timing error: no scenes");
    }

    #[test]
    fn test_render_error_surfaces_diagnostic_verbatim() {
        let err = ReelError::tool_failed(
            "ffmpeg exited with status 1",
            "[AVFilterGraph] No such filter: 'bogus'",
            Some(1),
        );
        let text = err.to_string();
        assert!(text.starts_with("Render error: ffmpeg exited with status 1"));
        assert!(text.ends_with("[AVFilterGraph] No such filter: 'bogus'"));
        assert_eq!(err.diagnostic(), Some("[AVFilterGraph] No such filter: 'bogus'"));
    }

    #[test]
    fn test_blank_diagnostic_is_dropped() {
        let err = ReelError::tool_failed("failed", "  \n", Some(2));
        assert_eq!(err.diagnostic(), None);
        assert_eq!(err.to_string(), "Render error: failed");
    }

    #[test]
    fn test_recoverability_classification() {
        assert!(ReelError::asset("x").is_locally_recoverable());
        assert!(ReelError::mix("x").is_locally_recoverable());
        assert!(!ReelError::graph("x").is_locally_recoverable());
        assert!(!ReelError::render("x").is_locally_recoverable());
        assert!(!ReelError::timing("no scenes").is_locally_recoverable());
        assert!(ReelError::Timeout(5).is_interruption());
        assert!(ReelError::Cancelled.is_interruption());
    }
}
