use std::sync::Arc;

use kit::types::position::{normalize_path, SourceRange};
use kit::types::rules::Rule;

/// One finalized violation. Created exactly once by issue emission and
/// immutable thereafter.
#[derive(Clone, Debug)]
pub struct Issue {
    pub rule: Arc<dyn Rule>,
    pub message: String,
    /// Innermost location, always inside the module where the rule ran.
    pub range: SourceRange,
    /// Call-site chain, outermost declaration site first, ending with the
    /// location where the rule actually executed. Empty for root issues.
    pub callers: Vec<SourceRange>,
    pub fixable: bool,
    /// Snapshot of the bytes of the file named by `range`.
    pub source: Vec<u8>,
}

impl PartialEq for Issue {
    fn eq(&self, other: &Self) -> bool {
        self.rule.name() == other.rule.name()
            && self.message == other.message
            && self.range == other.range
            && self.callers == other.callers
            && self.fixable == other.fixable
            && self.source == other.source
    }
}

/// An ordered collection of issues with deterministic sort and
/// path-normalized lookup.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Issues(pub Vec<Issue>);

impl Issues {
    pub fn new() -> Self {
        Issues(Vec::new())
    }

    pub fn push(&mut self, issue: Issue) {
        self.0.push(issue);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Issue> {
        self.0.iter()
    }

    /// Returns every issue whose primary range lives in `path`, preserving
    /// relative order. Paths are normalized before comparison, so
    /// `./main.tf` and `main.tf` select the same issues.
    pub fn lookup(&self, path: &str) -> Issues {
        let normalized = normalize_path(path);
        Issues(
            self.0
                .iter()
                .filter(|issue| normalize_path(&issue.range.filename) == normalized)
                .cloned()
                .collect(),
        )
    }

    /// Returns a new collection ordered by filename, then start line, then
    /// start column, then message. Idempotent.
    pub fn sort(&self) -> Issues {
        let mut sorted = self.0.clone();
        sorted.sort_by(|a, b| {
            a.range
                .filename
                .cmp(&b.range.filename)
                .then_with(|| a.range.start.line.cmp(&b.range.start.line))
                .then_with(|| a.range.start.column.cmp(&b.range.start.column))
                .then_with(|| a.message.cmp(&b.message))
        });
        Issues(sorted)
    }
}

impl IntoIterator for Issues {
    type Item = Issue;
    type IntoIter = std::vec::IntoIter<Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kit::types::position::SourcePos;
    use kit::types::rules::Severity;

    #[derive(Debug)]
    struct TestRule;

    impl Rule for TestRule {
        fn name(&self) -> &str {
            "test_rule"
        }
        fn severity(&self) -> Severity {
            Severity::Error
        }
        fn link(&self) -> &str {
            ""
        }
    }

    fn issue_at(filename: &str, line: usize, column: usize, message: &str) -> Issue {
        Issue {
            rule: Arc::new(TestRule),
            message: message.to_string(),
            range: SourceRange::new(
                filename,
                SourcePos::new(line, column, 0),
                SourcePos::new(line, column, 0),
            ),
            callers: vec![],
            fixable: false,
            source: vec![],
        }
    }

    #[test]
    fn test_lookup_normalizes_paths() {
        let mut issues = Issues::new();
        issues.push(issue_at("template.tf", 1, 1, "in template"));
        issues.push(issue_at("resource.tf", 1, 1, "in resource"));

        let direct = issues.lookup("template.tf");
        let dotted = issues.lookup("./template.tf");
        assert_eq!(direct, dotted);
        assert_eq!(direct.len(), 1);
        assert_eq!(direct.0[0].message, "in template");
    }

    #[test]
    fn test_sort_order() {
        let mut issues = Issues::new();
        issues.push(issue_at("b.tf", 1, 1, "b"));
        issues.push(issue_at("a.tf", 2, 1, "z"));
        issues.push(issue_at("a.tf", 1, 5, "y"));
        issues.push(issue_at("a.tf", 1, 5, "a"));

        let sorted = issues.sort();
        let order: Vec<(&str, usize, usize, &str)> = sorted
            .iter()
            .map(|i| {
                (i.range.filename.as_str(), i.range.start.line, i.range.start.column, i.message.as_str())
            })
            .collect();
        assert_eq!(
            order,
            vec![
                ("a.tf", 1, 5, "a"),
                ("a.tf", 1, 5, "y"),
                ("a.tf", 2, 1, "z"),
                ("b.tf", 1, 1, "b"),
            ]
        );
    }

    #[test]
    fn test_sort_idempotent() {
        let mut issues = Issues::new();
        issues.push(issue_at("b.tf", 3, 1, "b"));
        issues.push(issue_at("a.tf", 1, 1, "a"));
        issues.push(issue_at("a.tf", 1, 1, "a"));

        let once = issues.sort();
        let twice = once.sort();
        assert_eq!(once, twice);
    }
}
