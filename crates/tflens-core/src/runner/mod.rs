use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use kit::hcl::expr::Expression;
use kit::hcl::parser::parse_body;
use kit::helpers::hcl::collect_variable_references;
use kit::types::annotations::Annotations;
use kit::types::diagnostics::Diagnostic;
use kit::types::position::{normalize_path, SourceRange};
use kit::types::rules::Rule;

use crate::config::{AnalyzerConfig, ModuleConfig};
use crate::issues::{Issue, Issues};

mod module_runners;
mod path;
mod variables;

pub use module_runners::new_module_runners;
pub use path::{InstanceKey, ModulePath, PathSegment, ROOT_MODULE_NAME};
pub use variables::{ModuleVariable, VariableForest, VariableId};

/// A source file as loaded at runner construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(bytes: Vec<u8>) -> Self {
        SourceFile { bytes }
    }
}

/// The isolated execution context for one module instance: its own
/// configuration tree, variable provenance, source/change store, and issue
/// collection. Runners for distinct instances share no mutable state, so an
/// external scheduler may drive them in parallel.
#[derive(Debug)]
pub struct Runner {
    pub path: ModulePath,
    pub module: ModuleConfig,
    pub config: AnalyzerConfig,
    /// Suppression directives, keyed by filename.
    pub annotations: HashMap<String, Annotations>,
    pub issues: Issues,
    files: IndexMap<String, SourceFile>,
    changes: IndexMap<String, Vec<u8>>,
    /// Expression currently under evaluation by a rule, if any. Only
    /// consulted during issue emission; cleared between rule invocations.
    current_expr: Option<Expression>,
    /// Provenance entry per input variable bound at this instance's call
    /// site. Empty for the root runner.
    pub(crate) mod_vars: IndexMap<String, VariableId>,
    /// Shared immutable provenance arena, installed once discovery
    /// completes.
    pub(crate) forest: Arc<VariableForest>,
}

/// A candidate produced by attribution, before suppression filtering. One
/// violation can fan out to any number of candidates, so the 0/1/N cases
/// all flow through the same sequence.
struct IssueCandidate {
    range: SourceRange,
    callers: Vec<SourceRange>,
}

impl Runner {
    /// Creates the root runner. `sources` maps filenames to file contents as
    /// pre-loaded by the host.
    pub fn new(
        config: AnalyzerConfig,
        module: ModuleConfig,
        sources: IndexMap<String, String>,
        annotations: HashMap<String, Annotations>,
    ) -> Self {
        Runner {
            path: ModulePath::root(),
            module,
            config,
            annotations,
            issues: Issues::new(),
            files: sources
                .into_iter()
                .map(|(filename, content)| (filename, SourceFile::new(content.into_bytes())))
                .collect(),
            changes: IndexMap::new(),
            current_expr: None,
            mod_vars: IndexMap::new(),
            forest: Arc::new(VariableForest::new()),
        }
    }

    pub(crate) fn new_child(
        parent: &Runner,
        path: ModulePath,
        module: ModuleConfig,
        mod_vars: IndexMap<String, VariableId>,
    ) -> Self {
        Runner {
            path,
            module,
            config: parent.config.clone(),
            annotations: parent.annotations.clone(),
            issues: Issues::new(),
            // File bytes are immutable inputs and may be shared freely;
            // issues and changes stay per-runner.
            files: parent.files.clone(),
            changes: IndexMap::new(),
            current_expr: None,
            mod_vars,
            forest: Arc::new(VariableForest::new()),
        }
    }

    /// Sets the expression under evaluation for the duration of `f`, so that
    /// violations raised inside can be attributed to the module call that
    /// supplied it.
    pub fn with_expression_context<T>(
        &mut self,
        expr: Expression,
        f: impl FnOnce(&mut Runner) -> T,
    ) -> T {
        self.current_expr = Some(expr);
        let ret = f(self);
        self.current_expr = None;
        ret
    }

    /// The immutable filename to file mapping as loaded at construction.
    pub fn files(&self) -> &IndexMap<String, SourceFile> {
        &self.files
    }

    /// Per-file content: the pending change if present, else the original.
    pub fn sources(&self) -> IndexMap<String, Vec<u8>> {
        self.files
            .iter()
            .map(|(filename, file)| {
                let content = self.changes.get(filename).cloned().unwrap_or_else(|| file.bytes.clone());
                (filename.clone(), content)
            })
            .collect()
    }

    /// Merges replacement file contents into the pending change map. Every
    /// replacement must re-parse as valid source; any failure rejects the
    /// whole call and leaves the store untouched.
    pub fn apply_changes(&mut self, changes: IndexMap<String, Vec<u8>>) -> Result<(), Vec<Diagnostic>> {
        let mut diagnostics = vec![];
        for (filename, content) in changes.iter() {
            match std::str::from_utf8(content) {
                Ok(source) => {
                    if let Err(e) = parse_body(source) {
                        diagnostics.push(Diagnostic::error(format!(
                            "failed to parse {}: {}",
                            filename, e
                        )));
                    }
                }
                Err(_) => diagnostics.push(Diagnostic::error(format!(
                    "failed to parse {}: contents are not valid UTF-8",
                    filename
                ))),
            }
        }
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }
        for (filename, content) in changes {
            self.changes.insert(filename, content);
        }
        Ok(())
    }

    /// Pending changes for `path`, with the same path normalization as
    /// [`Issues::lookup`].
    pub fn lookup_changes(&self, path: &str) -> IndexMap<String, Vec<u8>> {
        let normalized = normalize_path(path);
        self.changes
            .iter()
            .filter(|(filename, _)| normalize_path(filename) == normalized)
            .map(|(filename, content)| (filename.clone(), content.clone()))
            .collect()
    }

    pub fn lookup_issues(&self, path: &str) -> Issues {
        self.issues.lookup(path)
    }

    /// Provenance of one input variable bound at this instance's call site.
    pub fn module_variable(&self, name: &str) -> Option<&ModuleVariable> {
        self.mod_vars.get(name).map(|&id| self.forest.get(id))
    }

    /// Records a rule violation, re-attributing it to concrete caller
    /// locations when the current expression context ties it to module
    /// input variables. Returns true when at least one issue survived
    /// suppression; false means every candidate was suppressed or the
    /// violation could not be attributed to any call site.
    pub fn emit_issue(
        &mut self,
        rule: Arc<dyn Rule>,
        message: &str,
        location: SourceRange,
        fixable: bool,
    ) -> bool {
        let mut applied = false;
        for candidate in self.issue_candidates(&location) {
            if self.is_suppressed(rule.as_ref(), &candidate) {
                continue;
            }
            let attributed = !candidate.callers.is_empty();
            let source = self.file_bytes(&candidate.range.filename);
            self.issues.push(Issue {
                rule: rule.clone(),
                message: message.to_string(),
                range: candidate.range,
                callers: candidate.callers,
                // Fixes only ever apply where the rule actually executed,
                // never retroactively at a call site.
                fixable: fixable && !attributed,
                source,
            });
            applied = true;
        }
        applied
    }

    fn issue_candidates(&self, location: &SourceRange) -> Vec<IssueCandidate> {
        let Some(expr) = &self.current_expr else {
            // The violation was raised directly against source this runner
            // owns.
            return vec![IssueCandidate { range: location.clone(), callers: vec![] }];
        };

        let mut candidates = vec![];
        for (_, variable) in collect_variable_references(expr) {
            let Some(&id) = self.mod_vars.get(&variable.name) else {
                continue;
            };
            for chain in self.forest.root_paths(id) {
                let mut callers: Vec<SourceRange> =
                    chain.iter().map(|&node| self.forest.get(node).decl_range.clone()).collect();
                callers.push(location.clone());
                let range = self.forest.get(chain[0]).decl_range.clone();
                candidates.push(IssueCandidate { range, callers });
            }
        }
        candidates
    }

    fn is_suppressed(&self, rule: &dyn Rule, candidate: &IssueCandidate) -> bool {
        std::iter::once(&candidate.range).chain(candidate.callers.iter()).any(|range| {
            self.annotations
                .values()
                .flatten()
                .any(|annotation| annotation.suppresses(rule.name(), range))
        })
    }

    pub(crate) fn file_source(&self, filename: &str) -> String {
        String::from_utf8_lossy(&self.file_bytes(filename)).into_owned()
    }

    fn file_bytes(&self, filename: &str) -> Vec<u8> {
        let normalized = normalize_path(filename);
        self.files
            .iter()
            .find(|(name, _)| normalize_path(name) == normalized)
            .map(|(_, file)| file.bytes.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kit::hcl::parser::parse_expr;
    use kit::types::annotations::Annotation;
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

    fn test_rule() -> Arc<dyn Rule> {
        Arc::new(TestRule)
    }

    fn line_range(filename: &str, line: usize) -> SourceRange {
        SourceRange::new(filename, SourcePos::new(line, 1, 0), SourcePos::new(line, 1, 0))
    }

    fn test_runner(sources: &[(&str, &str)]) -> Runner {
        Runner::new(
            AnalyzerConfig::default(),
            ModuleConfig::default(),
            sources.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            HashMap::new(),
        )
    }

    fn emit_runner(annotations: HashMap<String, Annotations>) -> Runner {
        let mut runner = test_runner(&[("test.tf", "foo = 1"), ("module.tf", "bar = 2")]);
        runner.annotations = annotations;
        runner
    }

    /// Installs a module context: path below root, provenance nodes for
    /// `variables`, each rooted at the given line of module.tf.
    fn with_module_vars(runner: &mut Runner, variables: &[(&str, usize)]) {
        runner.path = ModulePath::root().join("module1", InstanceKey::None);
        let mut forest = VariableForest::new();
        for (name, line) in variables {
            let id = forest.push_root(line_range("module.tf", *line));
            runner.mod_vars.insert(name.to_string(), id);
        }
        runner.forest = Arc::new(forest);
    }

    #[test]
    fn test_emit_issue_basic() {
        let mut runner = emit_runner(HashMap::new());
        let applied =
            runner.emit_issue(test_rule(), "This is test message", line_range("test.tf", 1), false);

        assert!(applied);
        assert_eq!(runner.issues.len(), 1);
        let issue = &runner.issues.0[0];
        assert_eq!(issue.range, line_range("test.tf", 1));
        assert!(issue.callers.is_empty());
        assert!(!issue.fixable);
        assert_eq!(issue.source, b"foo = 1");
    }

    #[test]
    fn test_emit_issue_fixable() {
        let mut runner = emit_runner(HashMap::new());
        let applied =
            runner.emit_issue(test_rule(), "This is test message", line_range("test.tf", 1), true);

        assert!(applied);
        assert!(runner.issues.0[0].fixable);
    }

    #[test]
    fn test_emit_issue_suppressed() {
        let mut annotations = HashMap::new();
        annotations.insert(
            "test.tf".to_string(),
            vec![Annotation::new("test_rule", line_range("test.tf", 1))],
        );
        let mut runner = emit_runner(annotations);

        let applied =
            runner.emit_issue(test_rule(), "This is test message", line_range("test.tf", 1), false);

        assert!(!applied);
        assert!(runner.issues.is_empty());
    }

    #[test]
    fn test_emit_issue_in_module() {
        let mut runner = emit_runner(HashMap::new());
        with_module_vars(&mut runner, &[("foo", 1)]);

        let expr = parse_expr("var.foo").unwrap();
        let applied = runner.with_expression_context(expr, |runner| {
            runner.emit_issue(test_rule(), "This is test message", line_range("test.tf", 1), false)
        });

        assert!(applied);
        assert_eq!(runner.issues.len(), 1);
        let issue = &runner.issues.0[0];
        assert_eq!(issue.range, line_range("module.tf", 1));
        assert_eq!(
            issue.callers,
            vec![line_range("module.tf", 1), line_range("test.tf", 1)]
        );
        assert_eq!(issue.source, b"bar = 2");
    }

    #[test]
    fn test_emit_issue_no_variables_in_module() {
        let mut runner = emit_runner(HashMap::new());
        with_module_vars(&mut runner, &[]);

        let expr = parse_expr(r#""foo""#).unwrap();
        let applied = runner.with_expression_context(expr, |runner| {
            runner.emit_issue(test_rule(), "This is test message", line_range("test.tf", 1), false)
        });

        assert!(!applied);
        assert!(runner.issues.is_empty());
    }

    #[test]
    fn test_emit_issue_fan_out() {
        let mut runner = emit_runner(HashMap::new());
        with_module_vars(&mut runner, &[("foo", 1), ("bar", 3)]);

        let expr = parse_expr(r#""${var.foo}-${var.bar}""#).unwrap();
        let applied = runner.with_expression_context(expr, |runner| {
            runner.emit_issue(test_rule(), "This is test message", line_range("test.tf", 1), false)
        });

        assert!(applied);
        let sorted = runner.issues.sort();
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted.0[0].range, line_range("module.tf", 1));
        assert_eq!(
            sorted.0[0].callers,
            vec![line_range("module.tf", 1), line_range("test.tf", 1)]
        );
        assert_eq!(sorted.0[1].range, line_range("module.tf", 3));
        assert_eq!(
            sorted.0[1].callers,
            vec![line_range("module.tf", 3), line_range("test.tf", 1)]
        );
    }

    #[test]
    fn test_emit_issue_partial_suppression_still_applies() {
        let mut annotations = HashMap::new();
        annotations.insert(
            "module.tf".to_string(),
            vec![Annotation::new("test_rule", line_range("module.tf", 1))],
        );
        let mut runner = emit_runner(annotations);
        with_module_vars(&mut runner, &[("foo", 1), ("bar", 3)]);

        let expr = parse_expr(r#""${var.foo}-${var.bar}""#).unwrap();
        let applied = runner.with_expression_context(expr, |runner| {
            runner.emit_issue(test_rule(), "This is test message", line_range("test.tf", 1), false)
        });

        // One of the two fan-out candidates survives, so the violation
        // still counts as applied.
        assert!(applied);
        assert_eq!(runner.issues.len(), 1);
        assert_eq!(runner.issues.0[0].range, line_range("module.tf", 3));
    }

    #[test]
    fn test_emit_issue_full_suppression() {
        let mut annotations = HashMap::new();
        annotations.insert(
            "module.tf".to_string(),
            vec![
                Annotation::new("test_rule", line_range("module.tf", 1)),
                Annotation::new("test_rule", line_range("module.tf", 3)),
            ],
        );
        let mut runner = emit_runner(annotations);
        with_module_vars(&mut runner, &[("foo", 1), ("bar", 3)]);

        let expr = parse_expr(r#""${var.foo}-${var.bar}""#).unwrap();
        let applied = runner.with_expression_context(expr, |runner| {
            runner.emit_issue(test_rule(), "This is test message", line_range("test.tf", 1), false)
        });

        assert!(!applied);
        assert!(runner.issues.is_empty());
    }

    #[test]
    fn test_emit_issue_fixable_forced_off_in_module() {
        let mut runner = emit_runner(HashMap::new());
        with_module_vars(&mut runner, &[("foo", 1)]);

        let expr = parse_expr("var.foo").unwrap();
        let applied = runner.with_expression_context(expr, |runner| {
            runner.emit_issue(test_rule(), "This is test message", line_range("test.tf", 1), true)
        });

        assert!(applied);
        assert!(!runner.issues.0[0].fixable);
    }

    #[test]
    fn test_emit_issue_deep_chain() {
        // Violation three levels down: the variable binding chains through
        // an intermediate module before reaching its originating literals.
        let mut runner = emit_runner(HashMap::new());
        runner.path = ModulePath::root()
            .join("module1", InstanceKey::None)
            .join("module2", InstanceKey::None);

        let mut forest = VariableForest::new();
        let foo = forest.push_root(line_range("main.tf", 4));
        let bar = forest.push_root(line_range("main.tf", 5));
        let red = forest.push_child(vec![foo, bar], line_range("module.tf", 8));
        runner.mod_vars.insert("red".to_string(), red);
        runner.forest = Arc::new(forest);

        let expr = parse_expr("var.red").unwrap();
        let applied = runner.with_expression_context(expr, |runner| {
            runner.emit_issue(test_rule(), "deep", line_range("module2.tf", 1), false)
        });

        assert!(applied);
        let sorted = runner.issues.sort();
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted.0[0].range, line_range("main.tf", 4));
        assert_eq!(
            sorted.0[0].callers,
            vec![
                line_range("main.tf", 4),
                line_range("module.tf", 8),
                line_range("module2.tf", 1)
            ]
        );
        assert_eq!(sorted.0[1].range, line_range("main.tf", 5));
        assert_eq!(
            sorted.0[1].callers,
            vec![
                line_range("main.tf", 5),
                line_range("module.tf", 8),
                line_range("module2.tf", 1)
            ]
        );
    }

    #[test]
    fn test_files() {
        let runner = test_runner(&[("main.tf", "")]);
        assert_eq!(runner.files().len(), 1);
        assert_eq!(runner.files()["main.tf"], SourceFile::new(vec![]));
    }

    #[test]
    fn test_lookup_issues_normalizes_path() {
        let mut runner = test_runner(&[("template.tf", "")]);
        runner.emit_issue(test_rule(), "This is test rule", line_range("template.tf", 1), false);
        runner.emit_issue(test_rule(), "This is test rule", line_range("resource.tf", 1), false);

        let direct = runner.lookup_issues("template.tf");
        let dotted = runner.lookup_issues("./template.tf");
        assert_eq!(direct, dotted);
        assert_eq!(direct.len(), 1);
    }

    #[test]
    fn test_apply_changes() {
        let mut runner = test_runner(&[
            ("main.tf", r#"variable "foo" {}"#),
            ("variables.tf", r#"variable "bar" {}"#),
        ]);

        let mut changes = IndexMap::new();
        changes.insert(
            "variables.tf".to_string(),
            br#"variable "bar" { type = string }"#.to_vec(),
        );
        runner.apply_changes(changes.clone()).unwrap();

        let sources = runner.sources();
        assert_eq!(sources["main.tf"], br#"variable "foo" {}"#.to_vec());
        assert_eq!(sources["variables.tf"], br#"variable "bar" { type = string }"#.to_vec());
        assert_eq!(runner.lookup_changes("./variables.tf"), changes);
    }

    #[test]
    fn test_apply_changes_rejects_invalid_source_atomically() {
        let mut runner = test_runner(&[("main.tf", r#"variable "foo" {}"#)]);

        let mut changes = IndexMap::new();
        changes.insert("main.tf".to_string(), b"variable \"foo\" {".to_vec());
        let diagnostics = runner.apply_changes(changes).unwrap_err();

        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error());
        assert!(runner.lookup_changes("main.tf").is_empty());
        assert_eq!(runner.sources()["main.tf"], br#"variable "foo" {}"#.to_vec());
    }

    #[test]
    fn test_lookup_changes_filters_by_file() {
        let mut runner = test_runner(&[("main.tf", ""), ("resource.tf", "")]);

        let mut changes = IndexMap::new();
        changes.insert("main.tf".to_string(), b"foo = 1".to_vec());
        changes.insert("resource.tf".to_string(), b"bar = 2".to_vec());
        runner.apply_changes(changes).unwrap();

        let found = runner.lookup_changes("main.tf");
        assert_eq!(found.len(), 1);
        assert_eq!(found["main.tf"], b"foo = 1".to_vec());
    }
}
