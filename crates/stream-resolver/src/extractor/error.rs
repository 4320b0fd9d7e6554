use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// The hop (or follow-up fetch) a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Embed,
    Script,
    Player,
    Manifest,
    Segment,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Embed => "embed",
            Stage::Script => "script",
            Stage::Player => "player",
            Stage::Manifest => "manifest",
            Stage::Segment => "segment",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{stage} request failed with status: {status}")]
    UpstreamStatus { stage: Stage, status: StatusCode },
    #[error("{stage} request failed: {source}")]
    UpstreamFetch {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not extract `{field}` from {stage} response")]
    Extraction { stage: Stage, field: &'static str },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl ResolveError {
    pub fn fetch(stage: Stage, source: reqwest::Error) -> Self {
        Self::UpstreamFetch { stage, source }
    }

    pub fn extraction(stage: Stage, field: &'static str) -> Self {
        Self::Extraction { stage, field }
    }

    /// Stage that failed, if the error is tied to one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::UpstreamStatus { stage, .. }
            | Self::UpstreamFetch { stage, .. }
            | Self::Extraction { stage, .. } => Some(*stage),
            Self::InvalidUrl(_) => None,
        }
    }

    /// Name of the missing field for extraction failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Extraction { field, .. } => Some(*field),
            _ => None,
        }
    }
}
