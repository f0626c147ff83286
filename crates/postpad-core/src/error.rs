use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unknown block kind: {0}")]
    UnknownBlockKind(String),

    #[error("invalid hotkey `{0}`")]
    InvalidHotkey(String),
}

/// Markup the strict fragment parser refuses. `load` turns these into the plain-text fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HtmlError {
    #[error("unterminated tag starting at byte {offset}")]
    UnterminatedTag { offset: usize },

    #[error("unterminated comment starting at byte {offset}")]
    UnterminatedComment { offset: usize },

    #[error("closing tag </{name}> at byte {offset} has no matching open element")]
    UnexpectedEndTag { name: String, offset: usize },

    #[error("closing tag </{found}> at byte {offset} while <{expected}> is still open")]
    MisnestedTag {
        expected: String,
        found: String,
        offset: usize,
    },
}
