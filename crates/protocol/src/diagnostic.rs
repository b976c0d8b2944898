use serde::{Deserialize, Serialize};

/// One reported problem, as the operator console displays it: the rule that
/// fired, where, and the explanation lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub rule: String,
    pub path: String,
    pub details: Vec<String>,
    pub range: SourceRange,
}

/// A half-open region of a source file, 1-based rows and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: SourcePosition,
    pub end: SourcePosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourcePosition {
    pub row: u32,
    pub column: u32,
}

impl SourceRange {
    pub fn new(start_row: u32, start_column: u32, end_row: u32, end_column: u32) -> Self {
        Self {
            start: SourcePosition {
                row: start_row,
                column: start_column,
            },
            end: SourcePosition {
                row: end_row,
                column: end_column,
            },
        }
    }

    pub fn overlaps(&self, other: &SourceRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_detection() {
        let a = SourceRange::new(1, 1, 1, 10);
        let b = SourceRange::new(1, 5, 2, 1);
        let c = SourceRange::new(1, 10, 1, 20);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        // Touching end-to-start is not an overlap (half-open ranges).
        assert!(!a.overlaps(&c));
        assert!(!c.overlaps(&a));
    }
}
