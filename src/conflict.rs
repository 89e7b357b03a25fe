use crate::core::ApiError;
use std::fmt;

/// Outcome of classifying a failed update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Revision mismatch; the update may be retried with a fresh revision.
    Conflict,
    /// Anything else; never retried.
    Other,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Conflict => "conflict",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

/// Classifies a failed mutation.
///
/// A 409 is a conflict. A 500 whose message, details or error field mentions
/// `409` is also treated as one: some backends wrap the original conflict in
/// a generic server error. That second rule is a compatibility shim for those
/// backends and should not be extended to other status codes.
pub fn classify(err: &ApiError) -> ConflictKind {
    match err.status {
        Some(409) => ConflictKind::Conflict,
        Some(500) if err.text_fields().any(|text| text.contains("409")) => ConflictKind::Conflict,
        _ => ConflictKind::Other,
    }
}

pub fn is_conflict(err: &ApiError) -> bool {
    classify(err) == ConflictKind::Conflict
}
