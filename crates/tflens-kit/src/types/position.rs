use std::fmt::Display;
use std::ops::Range;

/// A position in a source file. `line` and `column` are 1-based, `byte` is
/// the 0-based offset into the file contents.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
    pub byte: usize,
}

impl SourcePos {
    pub fn new(line: usize, column: usize, byte: usize) -> Self {
        SourcePos { line, column, byte }
    }

    /// The position of the first character of a file.
    pub fn initial() -> Self {
        SourcePos { line: 1, column: 1, byte: 0 }
    }
}

/// A contiguous region of a source file, identified by filename and
/// start/end positions. The end position is exclusive.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SourceRange {
    pub filename: String,
    pub start: SourcePos,
    pub end: SourcePos,
}

impl SourceRange {
    pub fn new(filename: impl Into<String>, start: SourcePos, end: SourcePos) -> Self {
        SourceRange { filename: filename.into(), start, end }
    }

    /// Builds a range from a byte span, computing line/column positions by
    /// scanning `source`.
    pub fn from_span(filename: &str, source: &str, span: Range<usize>) -> Self {
        SourceRange {
            filename: filename.to_string(),
            start: pos_at(source, span.start),
            end: pos_at(source, span.end),
        }
    }

    pub fn covers_line(&self, line: usize) -> bool {
        self.start.line <= line && line <= self.end.line
    }
}

impl Display for SourceRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{},{}-{}",
            self.filename, self.start.line, self.start.column, self.end.column
        )
    }
}

fn pos_at(source: &str, byte: usize) -> SourcePos {
    let mut line = 1;
    let mut column = 1;
    for (i, ch) in source.char_indices() {
        if i >= byte {
            break;
        }
        match ch {
            '\n' => {
                line += 1;
                column = 1;
            }
            '\r' => {}
            _ => column += 1,
        }
    }
    SourcePos { line, column, byte }
}

/// Normalizes a file path for lookups: path separators become `/` and a
/// leading `./` is stripped.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_from_span() {
        let source = "foo = 1\nbar = \"baz\"\n";
        let range = SourceRange::from_span("main.tf", source, 14..19);
        assert_eq!(range.start, SourcePos::new(2, 7, 14));
        assert_eq!(range.end, SourcePos::new(2, 12, 19));
    }

    #[test]
    fn test_from_span_at_eof() {
        let source = "a = 1";
        let range = SourceRange::from_span("main.tf", source, 4..5);
        assert_eq!(range.start, SourcePos::new(1, 5, 4));
        assert_eq!(range.end, SourcePos::new(1, 6, 5));
    }

    #[test]
    fn test_display() {
        let range = SourceRange::new(
            "module.tf",
            SourcePos::new(4, 16, 58),
            SourcePos::new(4, 29, 71),
        );
        assert_eq!(range.to_string(), "module.tf:4,16-29");
    }

    #[test_case("main.tf", "main.tf" ; "already normalized")]
    #[test_case("./main.tf", "main.tf" ; "leading dot slash")]
    #[test_case("module\\main.tf", "module/main.tf" ; "backslash separators")]
    #[test_case("./module/main.tf", "module/main.tf" ; "nested")]
    fn test_normalize_path(input: &str, expected: &str) {
        assert_eq!(normalize_path(input), expected);
    }
}
