use indexmap::IndexMap;

use crate::hcl::expr::{Expression, ObjectKey, Traversal, TraversalOperator};
use crate::hcl::structure::{Block, BlockLabel};
use crate::hcl::template::Element;
use crate::types::diagnostics::Diagnostic;

#[derive(Debug, thiserror::Error)]
pub enum VisitorError {
    #[error("missing block label {0}")]
    MissingLabel(String),
    #[error("missing attribute {0}")]
    MissingAttribute(String),
    #[error("expected {0} for {1}")]
    TypeMismatch(String, String),
    #[error("expected a {0} literal")]
    TypeExpected(String),
}

impl From<VisitorError> for Diagnostic {
    fn from(e: VisitorError) -> Self {
        Diagnostic::error(e.to_string())
    }
}

pub fn visit_label(index: usize, name: &str, block: &Block) -> Result<String, VisitorError> {
    let label = block.labels.get(index).ok_or(VisitorError::MissingLabel(name.to_string()))?;
    match label {
        BlockLabel::String(literal) => Ok(literal.to_string()),
        BlockLabel::Ident(ident) => Ok(ident.to_string()),
    }
}

pub fn visit_required_string_literal_attribute(
    field_name: &str,
    block: &Block,
) -> Result<String, VisitorError> {
    let Some(attribute) = block.body.get_attribute(field_name) else {
        return Err(VisitorError::MissingAttribute(field_name.to_string()));
    };

    match &attribute.value {
        Expression::String(value) => Ok(value.to_string()),
        _ => Err(VisitorError::TypeExpected("string".into())),
    }
}

pub fn visit_optional_untyped_attribute(field_name: &str, block: &Block) -> Option<Expression> {
    block.body.get_attribute(field_name).map(|attribute| attribute.value.clone())
}

/// Address of one input variable referenced from an expression.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputVariable {
    pub name: String,
}

/// Walks the full expression sub-tree and collects every input-variable
/// reference, keyed by fully qualified name. For example:
/// ```hcl
/// val = format("%s-%s", var.a, var.b)
/// ```
/// yields `var.a` and `var.b`. Local values and resource references are
/// excluded, and duplicate references collapse to a single entry. Iteration
/// order of the returned map is unspecified.
pub fn collect_variable_references(expr: &Expression) -> IndexMap<String, InputVariable> {
    let mut references = IndexMap::new();
    walk_traversals(expr, &mut |traversal| {
        let Expression::Variable(root) = &traversal.expr else {
            return;
        };
        if root.as_str() != "var" {
            return;
        }
        let Some(op) = traversal.operators.first() else {
            return;
        };
        if let TraversalOperator::GetAttr(ident) = op.value() {
            references
                .insert(format!("var.{}", ident.as_str()), InputVariable { name: ident.to_string() });
        }
    });
    references
}

/// Boils an expression down to the traversals it contains, invoking `f` on
/// each of them, including traversals nested in interpolated string
/// segments, collections, operators, and function-call arguments.
pub fn walk_traversals<'a, F: FnMut(&'a Traversal)>(expr: &'a Expression, f: &mut F) {
    match expr {
        Expression::Bool(_)
        | Expression::Null(_)
        | Expression::Number(_)
        | Expression::String(_)
        | Expression::Variable(_) => {}
        Expression::Array(elements) => {
            for element in elements.iter() {
                walk_traversals(element, f);
            }
        }
        Expression::BinaryOp(op) => {
            walk_traversals(&op.lhs_expr, f);
            walk_traversals(&op.rhs_expr, f);
        }
        Expression::Conditional(cond) => {
            walk_traversals(&cond.cond_expr, f);
            walk_traversals(&cond.true_expr, f);
            walk_traversals(&cond.false_expr, f);
        }
        Expression::ForExpr(for_expr) => {
            walk_traversals(&for_expr.intro.collection_expr, f);
            walk_traversals(&for_expr.value_expr, f);
            if let Some(ref key_expr) = for_expr.key_expr {
                walk_traversals(key_expr, f);
            }
            if let Some(ref cond) = for_expr.cond {
                walk_traversals(&cond.expr, f);
            }
        }
        Expression::FuncCall(func_call) => {
            for arg in func_call.args.iter() {
                walk_traversals(arg, f);
            }
        }
        Expression::HeredocTemplate(heredoc) => {
            for element in heredoc.template.iter() {
                match element {
                    Element::Directive(_) | Element::Literal(_) => {}
                    Element::Interpolation(interpolation) => {
                        walk_traversals(&interpolation.expr, f);
                    }
                }
            }
        }
        Expression::Object(object) => {
            for (key, value) in object.iter() {
                match key {
                    ObjectKey::Expression(key_expr) => walk_traversals(key_expr, f),
                    ObjectKey::Ident(_) => {}
                }
                walk_traversals(value.expr(), f);
            }
        }
        Expression::Parenthesis(parens) => {
            walk_traversals(parens.inner(), f);
        }
        Expression::StringTemplate(template) => {
            for element in template.iter() {
                match element {
                    Element::Directive(_) | Element::Literal(_) => {}
                    Element::Interpolation(interpolation) => {
                        walk_traversals(&interpolation.expr, f);
                    }
                }
            }
        }
        Expression::UnaryOp(op) => {
            walk_traversals(&op.expr, f);
        }
        Expression::Traversal(traversal) => {
            for op in traversal.operators.iter() {
                if let TraversalOperator::Index(index_expr) = op.value() {
                    walk_traversals(index_expr, f);
                }
            }
            f(traversal.as_ref());
        }
    }
}
