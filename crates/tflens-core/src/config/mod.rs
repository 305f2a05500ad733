use std::collections::HashMap;

use indexmap::IndexMap;
use kit::hcl::expr::Expression;
use kit::hcl::structure::{Block, Body};
use kit::hcl::Span;
use kit::helpers::hcl::{
    visit_label, visit_optional_untyped_attribute, visit_required_string_literal_attribute,
};
use kit::types::diagnostics::Diagnostic;
use kit::types::position::SourceRange;

/// Attributes of a module call that configure the call itself rather than
/// binding a variable of the called module.
const CALL_META_ATTRIBUTES: [&str; 5] = ["source", "count", "for_each", "providers", "version"];

/// One module body: the declarations the analyzer consumes, with source
/// ranges attached to every attribute.
#[derive(Clone, Debug, Default)]
pub struct ModuleConfig {
    pub variables: IndexMap<String, Variable>,
    pub module_calls: IndexMap<String, ModuleCall>,
    pub resources: Vec<Resource>,
}

/// An input-variable declaration (`variable "foo" { ... }`).
#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    pub default: Option<Expression>,
    pub decl_range: SourceRange,
}

/// A resource block. Opaque to the core; rules inspect the body.
#[derive(Clone, Debug)]
pub struct Resource {
    pub resource_type: String,
    pub name: String,
    pub body: Body,
    pub decl_range: SourceRange,
}

/// One argument binding written in a module-call block.
#[derive(Clone, Debug)]
pub struct ModuleArgument {
    pub name: String,
    pub expr: Expression,
    pub range: SourceRange,
}

/// A module-call block (`module "name" { source = ... }`).
#[derive(Clone, Debug)]
pub struct ModuleCall {
    pub name: String,
    pub source: String,
    pub count: Option<Expression>,
    pub for_each: Option<Expression>,
    pub arguments: IndexMap<String, ModuleArgument>,
    /// Body of the called module. Left empty when the module source has not
    /// been resolved; discovery then yields a runner with no declarations.
    pub module: ModuleConfig,
    pub decl_range: SourceRange,
}

/// Analyzer settings consumed during module discovery.
#[derive(Clone, Debug, Default)]
pub struct AnalyzerConfig {
    /// Module call targets to skip entirely, keyed by call source verbatim.
    pub ignore_modules: HashMap<String, bool>,
}

impl ModuleConfig {
    /// Builds the structured tree from one file's contents. Module calls
    /// come back with an empty body; the loader attaches resolved child
    /// bodies afterwards.
    pub fn parse(filename: &str, source: &str) -> Result<Self, Diagnostic> {
        let body = kit::hcl::parser::parse_body(source)
            .map_err(|e| Diagnostic::error(format!("parsing error: {}", e)))?;
        Self::from_body(filename, source, &body)
    }

    pub fn from_body(filename: &str, source: &str, body: &Body) -> Result<Self, Diagnostic> {
        let mut config = ModuleConfig::default();
        for block in body.blocks() {
            match block.ident.value().as_str() {
                "variable" => {
                    let variable = visit_variable_block(filename, source, block)?;
                    config.variables.insert(variable.name.clone(), variable);
                }
                "module" => {
                    let call = visit_module_block(filename, source, block)?;
                    config.module_calls.insert(call.name.clone(), call);
                }
                "resource" => {
                    config.resources.push(visit_resource_block(filename, source, block)?);
                }
                // Other block types carry no module structure.
                _ => {}
            }
        }
        Ok(config)
    }
}

fn block_range(filename: &str, source: &str, block: &Block) -> SourceRange {
    SourceRange::from_span(filename, source, block.span().unwrap_or_default())
}

fn visit_variable_block(
    filename: &str,
    source: &str,
    block: &Block,
) -> Result<Variable, Diagnostic> {
    let name = visit_label(0, "name", block)?;
    let default = visit_optional_untyped_attribute("default", block);
    Ok(Variable { name, default, decl_range: block_range(filename, source, block) })
}

fn visit_module_block(
    filename: &str,
    source: &str,
    block: &Block,
) -> Result<ModuleCall, Diagnostic> {
    let name = visit_label(0, "name", block)?;
    let module_source = visit_required_string_literal_attribute("source", block)
        .map_err(|e| Diagnostic::from(e).with_range(&block_range(filename, source, block)))?;

    let mut arguments = IndexMap::new();
    for attribute in block.body.attributes() {
        let key = attribute.key.as_str();
        if CALL_META_ATTRIBUTES.contains(&key) {
            continue;
        }
        let range =
            SourceRange::from_span(filename, source, attribute.value.span().unwrap_or_default());
        arguments.insert(
            key.to_string(),
            ModuleArgument { name: key.to_string(), expr: attribute.value.clone(), range },
        );
    }

    Ok(ModuleCall {
        name,
        source: module_source,
        count: visit_optional_untyped_attribute("count", block),
        for_each: visit_optional_untyped_attribute("for_each", block),
        arguments,
        module: ModuleConfig::default(),
        decl_range: block_range(filename, source, block),
    })
}

fn visit_resource_block(
    filename: &str,
    source: &str,
    block: &Block,
) -> Result<Resource, Diagnostic> {
    let resource_type = visit_label(0, "type", block)?;
    let name = visit_label(1, "name", block)?;
    Ok(Resource {
        resource_type,
        name,
        body: block.body.clone(),
        decl_range: block_range(filename, source, block),
    })
}
