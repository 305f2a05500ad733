use std::sync::Arc;

use indexmap::IndexMap;
use kit::helpers::hcl::collect_variable_references;
use kit::types::diagnostics::Diagnostic;

use crate::config::ModuleCall;
use crate::eval::{check_removed_attributes, evaluate_count, evaluate_for_each, CountValue, ForEachValue};
use crate::runner::variables::{VariableForest, VariableId};
use crate::runner::{InstanceKey, Runner};

/// Walks the module-call tree below `root` and builds one runner per module
/// instance, pre-order. Ignored calls are skipped with their whole subtree;
/// a configuration error anywhere aborts the pass.
pub fn new_module_runners(root: &Runner) -> Result<Vec<Runner>, Diagnostic> {
    let mut forest = VariableForest::new();
    let mut runners = discover(root, &mut forest)?;
    let forest = Arc::new(forest);
    for runner in runners.iter_mut() {
        runner.forest = forest.clone();
    }
    Ok(runners)
}

fn discover(parent: &Runner, forest: &mut VariableForest) -> Result<Vec<Runner>, Diagnostic> {
    let mut runners = vec![];
    for (name, call) in parent.module.module_calls.iter() {
        if parent.config.ignore_modules.get(&call.source).copied().unwrap_or(false) {
            continue;
        }

        let filename = call.decl_range.filename.clone();
        let source = parent.file_source(&filename);
        check_call_attributes(call, &filename, &source)?;

        for key in expand_instances(call, &filename, &source)? {
            let mod_vars = bind_module_variables(parent, call, forest);
            let child = Runner::new_child(
                parent,
                parent.path.join(name, key.clone()),
                call.module.clone(),
                mod_vars,
            );
            let descendants = discover(&child, forest)?;
            runners.push(child);
            runners.extend(descendants);
        }
    }
    Ok(runners)
}

/// Rejects references to removed language attributes anywhere in the call's
/// expressions before instances are expanded.
fn check_call_attributes(call: &ModuleCall, filename: &str, source: &str) -> Result<(), Diagnostic> {
    if let Some(count) = &call.count {
        check_removed_attributes(count, filename, source)?;
    }
    if let Some(for_each) = &call.for_each {
        check_removed_attributes(for_each, filename, source)?;
    }
    for (_, argument) in call.arguments.iter() {
        check_removed_attributes(&argument.expr, filename, source)?;
    }
    Ok(())
}

/// Instance keys for one call. `count` wins over `for_each` when both are
/// present; a statically unresolvable expression degrades to a single
/// unkeyed instance so the module is still analyzed once.
fn expand_instances(
    call: &ModuleCall,
    filename: &str,
    source: &str,
) -> Result<Vec<InstanceKey>, Diagnostic> {
    if let Some(count) = &call.count {
        return Ok(match evaluate_count(count, filename, source)? {
            CountValue::Known(n) => (0..n).map(|i| InstanceKey::Index(i as i64)).collect(),
            CountValue::Unknown => vec![InstanceKey::None],
        });
    }
    if let Some(for_each) = &call.for_each {
        return Ok(match evaluate_for_each(for_each, filename, source)? {
            ForEachValue::Keys(keys) => keys.into_iter().map(InstanceKey::Key).collect(),
            ForEachValue::Unknown => vec![InstanceKey::None],
        });
    }
    Ok(vec![InstanceKey::None])
}

/// Records provenance for every argument bound at this call site. An
/// argument that references none of the caller's variables originates here;
/// one that does is chained to the caller-side nodes so issue attribution
/// can walk back to where the value was first written. References that
/// resolve to nothing are dropped.
fn bind_module_variables(
    parent: &Runner,
    call: &ModuleCall,
    forest: &mut VariableForest,
) -> IndexMap<String, VariableId> {
    let mut mod_vars = IndexMap::new();
    for (name, argument) in call.arguments.iter() {
        let references = collect_variable_references(&argument.expr);
        let id = if references.is_empty() {
            forest.push_root(argument.range.clone())
        } else {
            let parents: Vec<VariableId> = references
                .values()
                .filter_map(|variable| parent.mod_vars.get(&variable.name).copied())
                .collect();
            forest.push_child(parents, argument.range.clone())
        };
        mod_vars.insert(name.clone(), id);
    }
    mod_vars
}
