//! Line and column computation for diagnostic spans.

use kiln_ir::Span;

/// Pre-computed line offset table for line/column lookup.
///
/// ```
/// use kiln_diagnostic::span_utils::LineOffsetTable;
///
/// let source = "[var x 1]\n[set x 2]";
/// let table = LineOffsetTable::build(source);
///
/// assert_eq!(table.offset_to_line_col(0), (1, 1));
/// assert_eq!(table.offset_to_line_col(11), (2, 2));
/// ```
#[derive(Clone, Debug, Default)]
pub struct LineOffsetTable {
    /// Byte offset of each line start; `offsets[0] == 0`.
    offsets: Vec<u32>,
}

impl LineOffsetTable {
    pub fn build(source: &str) -> Self {
        let mut offsets = vec![0u32];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                offsets.push(u32::try_from(i + 1).unwrap_or(u32::MAX));
            }
        }
        LineOffsetTable { offsets }
    }

    /// 1-based line containing `offset`.
    pub fn line_from_offset(&self, offset: u32) -> u32 {
        let idx = match self.offsets.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert.saturating_sub(1),
        };
        u32::try_from(idx + 1).unwrap_or(u32::MAX)
    }

    /// 1-based `(line, column)`; columns count bytes.
    pub fn offset_to_line_col(&self, offset: u32) -> (u32, u32) {
        let line = self.line_from_offset(offset);
        let start = self.offsets[(line - 1) as usize];
        (line, offset - start + 1)
    }

    pub fn line_count(&self) -> usize {
        self.offsets.len()
    }
}

/// One-shot line/column lookup without building a table.
pub fn offset_to_line_col(source: &str, offset: u32) -> (u32, u32) {
    let end = (offset as usize).min(source.len());
    let before = source.get(..end).unwrap_or(source);
    let line = before.bytes().filter(|&b| b == b'\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    (
        u32::try_from(line).unwrap_or(u32::MAX),
        u32::try_from(end - line_start + 1).unwrap_or(u32::MAX),
    )
}

/// 1-based line/column of a span's start.
pub fn span_start(table: &LineOffsetTable, span: Span) -> (u32, u32) {
    table.offset_to_line_col(span.start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_linear_scan() {
        let source = "[func f ()\n  [return 1]]\n\n[f]";
        let table = LineOffsetTable::build(source);
        for offset in 0..u32::try_from(source.len()).unwrap_or(0) {
            assert_eq!(
                table.offset_to_line_col(offset),
                offset_to_line_col(source, offset),
                "offset {offset}"
            );
        }
        assert_eq!(table.line_count(), 4);
    }

    #[test]
    fn span_start_on_later_line() {
        let table = LineOffsetTable::build("a\nbc\ndef");
        assert_eq!(span_start(&table, Span::new(6, 8)), (3, 2));
    }
}
