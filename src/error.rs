use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifoldError {
    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status} {status_text}\n{body}")]
    Upstream {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("failed to parse upstream response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no valid reply content found")]
    EmptyContent,

    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },
}

impl ManifoldError {
    /// Extract the HTTP status from upstream error variants.
    /// Returns None for variants that don't carry one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true when the underlying cause is the per-call timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Returns true for rejections that never reached the network.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingField(_))
    }
}
