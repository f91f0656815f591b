/// Error categories surfaced by the public API.
///
/// Numerical degeneracy (singular or rank-deficient candidate systems) is
/// deliberately not represented here: the solvers absorb it and the affected
/// candidate just receives a large error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Type/range violation detected before any work begins.
    InvalidArgument,
    /// Row/column counts disagree between related inputs.
    ShapeMismatch,
    /// Save/load target missing, unreadable, corrupt, or wrong model tag.
    File,
}

#[derive(Clone)]
pub struct GmdhError {
    kind: ErrorKind,
    message: String,
}

impl GmdhError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ShapeMismatch, message)
    }

    pub fn file(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::File, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl std::fmt::Display for GmdhError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for GmdhError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmdhError")
            .field("kind", &kind_name(self.kind))
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for GmdhError {}

fn kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidArgument => "invalid-argument",
        ErrorKind::ShapeMismatch => "shape-mismatch",
        ErrorKind::File => "file-error",
    }
}
