use depsweep_protocol::{SourcePosition, SourceRange};
use thiserror::Error;

/// One textual splice: replace the text covered by `range` with
/// `replacement`. Deletions use an empty replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: SourceRange,
    pub replacement: String,
}

impl Edit {
    pub fn delete(range: SourceRange) -> Self {
        Self {
            range,
            replacement: String::new(),
        }
    }
}

/// Why applying a fix failed. Carried into the record's `FixFailed` outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixFailure {
    #[error("fix produced no textual change")]
    Unchanged,
    #[error("fix produced invalid source: {0}")]
    SourceCodeInvalid(String),
    #[error("fix contains overlapping ranges")]
    OverlappingFixRanges,
}

/// Apply a set of edits to `text`.
///
/// Edits are sorted, checked for overlap, and applied back-to-front so
/// earlier offsets stay valid. A byte-identical result is reported as
/// [`FixFailure::Unchanged`] because a fix that changes nothing would make
/// the driver loop forever.
pub fn apply_edits(text: &str, edits: &[Edit]) -> Result<String, FixFailure> {
    let mut sorted: Vec<&Edit> = edits.iter().collect();
    sorted.sort_by_key(|edit| (edit.range.start, edit.range.end));

    for pair in sorted.windows(2) {
        if pair[0].range.overlaps(&pair[1].range) {
            return Err(FixFailure::OverlappingFixRanges);
        }
    }

    let mut result = text.to_string();
    for edit in sorted.iter().rev() {
        let start = position_to_offset(text, edit.range.start).ok_or_else(|| {
            FixFailure::SourceCodeInvalid(format!(
                "fix range start {}:{} is out of bounds",
                edit.range.start.row, edit.range.start.column
            ))
        })?;
        let end = position_to_offset(text, edit.range.end).ok_or_else(|| {
            FixFailure::SourceCodeInvalid(format!(
                "fix range end {}:{} is out of bounds",
                edit.range.end.row, edit.range.end.column
            ))
        })?;
        if end < start {
            return Err(FixFailure::SourceCodeInvalid(
                "fix range ends before it starts".to_string(),
            ));
        }
        result.replace_range(start..end, &edit.replacement);
    }

    if result == text {
        return Err(FixFailure::Unchanged);
    }
    Ok(result)
}

/// Byte offset of a 1-based row/column position. Columns count bytes within
/// the line; one past the last line's end is a valid position so deletions
/// can extend to the end of the text.
pub fn position_to_offset(text: &str, position: SourcePosition) -> Option<usize> {
    if position.row == 0 || position.column == 0 {
        return None;
    }
    let mut line_start = 0usize;
    let mut row = 1u32;
    while row < position.row {
        line_start = text[line_start..].find('\n').map(|i| line_start + i + 1)?;
        row += 1;
    }
    let line_end = text[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(text.len());
    let offset = line_start + (position.column - 1) as usize;
    // Allow pointing at the newline itself (column == line length + 1).
    (offset <= line_end).then_some(offset)
}

/// Inverse of [`position_to_offset`], for building ranges out of scanner
/// offsets.
pub fn offset_to_position(text: &str, offset: usize) -> SourcePosition {
    let clamped = offset.min(text.len());
    let mut row = 1u32;
    let mut line_start = 0usize;
    for (index, byte) in text.bytes().enumerate().take(clamped) {
        if byte == b'\n' {
            row += 1;
            line_start = index + 1;
        }
    }
    SourcePosition {
        row,
        column: (clamped - line_start) as u32 + 1,
    }
}
