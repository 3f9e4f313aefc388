pub type CaptionResult<T> = Result<T, CaptionError>;

#[derive(thiserror::Error, Debug)]
pub enum CaptionError {
    #[error("invalid phrase: {0}")]
    InvalidPhrase(String),

    #[error("failed to decode source '{file}': {reason}")]
    SourceDecode { file: String, reason: String },

    #[error("failed to render '{file}': {reason}")]
    Render { file: String, reason: String },

    #[error("failed to write output '{file}': {reason}")]
    OutputWrite { file: String, reason: String },

    #[error("output location unusable: {0}")]
    OutputLocation(String),

    #[error("font unavailable: {0}")]
    FontUnavailable(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("batch cancelled")]
    Cancelled,

    #[error("another batch is already in progress")]
    BatchInProgress,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CaptionError {
    pub fn invalid_phrase(msg: impl Into<String>) -> Self {
        Self::InvalidPhrase(msg.into())
    }

    pub fn source_decode(file: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SourceDecode {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    pub fn render(file: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Render {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    pub fn output_write(file: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::OutputWrite {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    pub fn output_location(msg: impl Into<String>) -> Self {
        Self::OutputLocation(msg.into())
    }

    pub fn font_unavailable(msg: impl Into<String>) -> Self {
        Self::FontUnavailable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Errors that only cost the batch a single image.
    pub fn is_per_image(&self) -> bool {
        matches!(
            self,
            Self::SourceDecode { .. } | Self::Render { .. } | Self::OutputWrite { .. }
        )
    }

    /// Status code a request handler reports for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidPhrase(_) => 400,
            Self::BatchInProgress => 409,
            _ => 500,
        }
    }

    /// Attach a file name to a per-image failure that was raised without one.
    pub(crate) fn for_file(self, file: &str) -> Self {
        match self {
            Self::SourceDecode { reason, .. } => Self::source_decode(file, reason),
            Self::Render { reason, .. } => Self::render(file, reason),
            Self::OutputWrite { reason, .. } => Self::output_write(file, reason),
            Self::FontUnavailable(reason) => Self::render(file, reason),
            Self::Other(e) => Self::render(file, format!("{e:#}")),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            CaptionError::invalid_phrase("x")
                .to_string()
                .contains("invalid phrase:")
        );
        assert!(
            CaptionError::source_decode("a.jpg", "bad header")
                .to_string()
                .contains("failed to decode source 'a.jpg'")
        );
        assert!(
            CaptionError::output_location("x")
                .to_string()
                .contains("output location unusable:")
        );
        assert!(
            CaptionError::config("x")
                .to_string()
                .contains("config error:")
        );
    }

    #[test]
    fn per_image_classification() {
        assert!(CaptionError::source_decode("a", "x").is_per_image());
        assert!(CaptionError::render("a", "x").is_per_image());
        assert!(CaptionError::output_write("a", "x").is_per_image());
        assert!(!CaptionError::output_location("x").is_per_image());
        assert!(!CaptionError::invalid_phrase("x").is_per_image());
        assert!(!CaptionError::Cancelled.is_per_image());
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(CaptionError::invalid_phrase("").http_status(), 400);
        assert_eq!(CaptionError::output_location("x").http_status(), 500);
        assert_eq!(CaptionError::BatchInProgress.http_status(), 409);
    }

    #[test]
    fn for_file_names_the_image() {
        let err = CaptionError::font_unavailable("no face").for_file("cat.png");
        assert!(matches!(err, CaptionError::Render { ref file, .. } if file == "cat.png"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = CaptionError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
