use crate::types::position::{normalize_path, SourceRange};

/// A suppression directive scanned from a source comment, e.g.
/// `# tflens-ignore: aws_instance_invalid_type`. The directive names a rule
/// (or `all`) and carries the range of the comment token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Annotation {
    pub rule_name: String,
    pub range: SourceRange,
}

/// Directives of one file, in source order.
pub type Annotations = Vec<Annotation>;

impl Annotation {
    pub fn new(rule_name: impl Into<String>, range: SourceRange) -> Self {
        Annotation { rule_name: rule_name.into(), range }
    }

    /// Whether this directive silences `rule_name` at `range`. The directive
    /// must live in the same file and its line range must cover the start
    /// line of the location.
    pub fn suppresses(&self, rule_name: &str, range: &SourceRange) -> bool {
        if self.rule_name != "all" && self.rule_name != rule_name {
            return false;
        }
        if normalize_path(&self.range.filename) != normalize_path(&range.filename) {
            return false;
        }
        self.range.covers_line(range.start.line)
    }
}
