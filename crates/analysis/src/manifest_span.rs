use crate::fix::offset_to_position;
use depsweep_protocol::SourceRange;

/// Where a dependency entry sits in the manifest text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySpan {
    /// The quoted key, for diagnostics.
    pub key: SourceRange,
    /// The region to delete to remove the whole entry, comma included, such
    /// that the remaining text is still valid JSON.
    pub removal: SourceRange,
}

/// Locate the entry for `name` inside the `section` object (`dependencies`
/// or `test-dependencies`) of a manifest text.
///
/// This is a narrow scanner, not a JSON parser: dependency sections only
/// ever map string keys to string constraints, and the caller has already
/// parsed the full text with serde. Returns `None` when the section or
/// entry cannot be found.
pub fn dependency_entry_span(text: &str, section: &str, name: &str) -> Option<EntrySpan> {
    let bytes = text.as_bytes();
    let section_key = format!("\"{section}\"");
    // A quoted section name cannot appear inside the constraint strings, and
    // the quote before the name keeps "dependencies" from matching inside
    // "test-dependencies".
    let section_start = text.find(&section_key)?;

    let mut cursor = skip_whitespace(bytes, section_start + section_key.len());
    if bytes.get(cursor) != Some(&b':') {
        return None;
    }
    cursor = skip_whitespace(bytes, cursor + 1);
    if bytes.get(cursor) != Some(&b'{') {
        return None;
    }
    let body_start = cursor + 1;

    // Entry spans: (key_start, key_end, value_end), all byte offsets with
    // key_end/value_end one past the closing quote.
    let mut entries: Vec<(usize, usize, usize)> = Vec::new();
    let mut close = None;
    cursor = body_start;
    while cursor < bytes.len() {
        cursor = skip_whitespace(bytes, cursor);
        match bytes.get(cursor) {
            Some(b'}') => {
                close = Some(cursor);
                break;
            }
            Some(b',') => {
                cursor += 1;
            }
            Some(b'"') => {
                let key_start = cursor;
                let key_end = string_end(bytes, cursor)?;
                cursor = skip_whitespace(bytes, key_end);
                if bytes.get(cursor) != Some(&b':') {
                    return None;
                }
                cursor = skip_whitespace(bytes, cursor + 1);
                if bytes.get(cursor) != Some(&b'"') {
                    return None;
                }
                let value_end = string_end(bytes, cursor)?;
                entries.push((key_start, key_end, value_end));
                cursor = value_end;
            }
            _ => return None,
        }
    }
    let close = close?;

    let target = entries
        .iter()
        .position(|(key_start, key_end, _)| &text[key_start + 1..key_end - 1] == name)?;
    let (key_start, key_end, value_end) = entries[target];

    let (removal_start, removal_end) = if entries.len() == 1 {
        (body_start, close)
    } else if target + 1 < entries.len() {
        (key_start, entries[target + 1].0)
    } else {
        (entries[target - 1].2, value_end)
    };

    Some(EntrySpan {
        key: SourceRange {
            start: offset_to_position(text, key_start),
            end: offset_to_position(text, key_end),
        },
        removal: SourceRange {
            start: offset_to_position(text, removal_start),
            end: offset_to_position(text, removal_end),
        },
    })
}

fn skip_whitespace(bytes: &[u8], mut index: usize) -> usize {
    while index < bytes.len() && bytes[index].is_ascii_whitespace() {
        index += 1;
    }
    index
}

/// Given `index` at an opening quote, the offset one past the closing
/// quote. Package names and constraints never contain escapes, but honoring
/// them costs nothing.
fn string_end(bytes: &[u8], index: usize) -> Option<usize> {
    let mut cursor = index + 1;
    while cursor < bytes.len() {
        match bytes[cursor] {
            b'\\' => cursor += 2,
            b'"' => return Some(cursor + 1),
            _ => cursor += 1,
        }
    }
    None
}
