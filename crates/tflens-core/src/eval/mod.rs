use kit::hcl::expr::{Expression, ObjectKey, TraversalOperator, UnaryOperator};
use kit::hcl::Span;
use kit::helpers::hcl::walk_traversals;
use kit::types::diagnostics::Diagnostic;
use kit::types::position::SourceRange;

/// The `terraform.env` attribute was removed from the language; referencing
/// it from a module call is a hard configuration error.
const TERRAFORM_ENV_REMOVED: &str = r#"Invalid "terraform" attribute; The terraform.env attribute was deprecated in v0.10 and removed in v0.12. The "state environment" concept was renamed to "workspace" in v0.12, and so the workspace name can now be accessed using the terraform.workspace attribute."#;

/// Result of statically evaluating a `count` expression. Anything that is
/// not a statically known integer degrades to `Unknown`; discovery then
/// assumes a single instance so analysis can proceed without concrete
/// values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CountValue {
    Known(usize),
    Unknown,
}

/// Result of statically evaluating a `for_each` expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForEachValue {
    Keys(Vec<String>),
    Unknown,
}

pub fn evaluate_count(
    expr: &Expression,
    filename: &str,
    source: &str,
) -> Result<CountValue, Diagnostic> {
    match expr {
        Expression::Number(number) => {
            if let Some(value) = number.value().as_u64() {
                return Ok(CountValue::Known(value as usize));
            }
            if number.value().as_i64().is_some() {
                let range =
                    SourceRange::from_span(filename, source, expr.span().unwrap_or_default());
                return Err(Diagnostic::error(
                    r#"Invalid "count" attribute; count cannot be negative"#,
                )
                .with_range(&range));
            }
            // Floats are not valid instance counts; treat them as dynamic.
            Ok(CountValue::Unknown)
        }
        // Negative literals parse as a unary negation of a number.
        Expression::UnaryOp(op)
            if *op.operator.value() == UnaryOperator::Neg
                && matches!(&op.expr, Expression::Number(_)) =>
        {
            let range = SourceRange::from_span(filename, source, expr.span().unwrap_or_default());
            Err(Diagnostic::error(r#"Invalid "count" attribute; count cannot be negative"#)
                .with_range(&range))
        }
        Expression::Null(_) => {
            let range = SourceRange::from_span(filename, source, expr.span().unwrap_or_default());
            Err(Diagnostic::error(r#"Invalid "count" attribute; count cannot be null"#)
                .with_range(&range))
        }
        Expression::Parenthesis(parens) => evaluate_count(parens.inner(), filename, source),
        _ => Ok(CountValue::Unknown),
    }
}

pub fn evaluate_for_each(
    expr: &Expression,
    filename: &str,
    source: &str,
) -> Result<ForEachValue, Diagnostic> {
    match expr {
        Expression::Object(object) => {
            let mut keys = Vec::with_capacity(object.len());
            for (key, _) in object.iter() {
                match key {
                    ObjectKey::Ident(ident) => keys.push(ident.to_string()),
                    ObjectKey::Expression(Expression::String(value)) => {
                        keys.push(value.value().to_string())
                    }
                    // Dynamic keys cannot be resolved statically.
                    ObjectKey::Expression(_) => return Ok(ForEachValue::Unknown),
                }
            }
            // Mapping semantics: keys iterate in lexical order.
            keys.sort_unstable();
            Ok(ForEachValue::Keys(keys))
        }
        Expression::Array(elements) => {
            let mut keys = Vec::new();
            for element in elements.iter() {
                match element {
                    Expression::String(value) => keys.push(value.value().to_string()),
                    Expression::Number(number) => keys.push(number.value().to_string()),
                    _ => return Ok(ForEachValue::Unknown),
                }
            }
            Ok(ForEachValue::Keys(keys))
        }
        Expression::FuncCall(func_call)
            if func_call.name.namespace.is_empty() && func_call.name.name.as_str() == "toset" =>
        {
            match func_call.args.iter().next() {
                Some(arg) if func_call.args.iter().count() == 1 => {
                    evaluate_for_each(arg, filename, source)
                }
                _ => Ok(ForEachValue::Unknown),
            }
        }
        Expression::Null(_) => {
            let range = SourceRange::from_span(filename, source, expr.span().unwrap_or_default());
            Err(Diagnostic::error(r#"Invalid "for_each" attribute; for_each cannot be null"#)
                .with_range(&range))
        }
        Expression::Parenthesis(parens) => evaluate_for_each(parens.inner(), filename, source),
        _ => Ok(ForEachValue::Unknown),
    }
}

/// Scans a module-call attribute expression for references to removed
/// language constructs. A hit aborts the whole discovery with a diagnostic
/// naming the file and range of the offending reference.
pub fn check_removed_attributes(
    expr: &Expression,
    filename: &str,
    source: &str,
) -> Result<(), Diagnostic> {
    let mut found: Option<std::ops::Range<usize>> = None;
    walk_traversals(expr, &mut |traversal| {
        if found.is_some() {
            return;
        }
        let Expression::Variable(root) = &traversal.expr else {
            return;
        };
        if root.as_str() != "terraform" {
            return;
        }
        let Some(op) = traversal.operators.first() else {
            return;
        };
        if let TraversalOperator::GetAttr(ident) = op.value() {
            if ident.as_str() == "env" {
                found = traversal.span();
            }
        }
    });

    match found {
        Some(span) => {
            let range = SourceRange::from_span(filename, source, span);
            Err(Diagnostic::error(TERRAFORM_ENV_REMOVED).with_range(&range))
        }
        None => Ok(()),
    }
}
