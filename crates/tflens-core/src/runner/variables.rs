use kit::types::position::SourceRange;

/// Handle to a node in a [`VariableForest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VariableId(usize);

/// Records how one input variable of one module instance is bound at its
/// call site.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleVariable {
    /// True when the binding expression resolves directly from the calling
    /// module's own source text, i.e. it references none of the caller's
    /// input variables.
    pub root: bool,
    /// Nodes of the calling module's own variables that feed this binding.
    /// Empty for root nodes, and for bindings whose references all dangle.
    pub parents: Vec<VariableId>,
    /// Range of the binding expression as written in the calling module.
    pub decl_range: SourceRange,
}

/// Arena of provenance nodes for one discovery pass. Parents are always
/// pushed before their children, so every node satisfies `parent < id` and
/// traversal cannot cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariableForest {
    nodes: Vec<ModuleVariable>,
}

impl VariableForest {
    pub fn new() -> Self {
        VariableForest { nodes: vec![] }
    }

    /// Adds an originating binding: the expression at the call site is a
    /// literal or otherwise variable-free.
    pub fn push_root(&mut self, decl_range: SourceRange) -> VariableId {
        self.nodes.push(ModuleVariable { root: true, parents: vec![], decl_range });
        VariableId(self.nodes.len() - 1)
    }

    /// Adds a binding that references caller variables. `parents` holds the
    /// caller-side nodes that survived resolution; dangling references were
    /// already dropped by the caller.
    pub fn push_child(&mut self, parents: Vec<VariableId>, decl_range: SourceRange) -> VariableId {
        debug_assert!(parents.iter().all(|parent| parent.0 < self.nodes.len()));
        self.nodes.push(ModuleVariable { root: false, parents, decl_range });
        VariableId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: VariableId) -> &ModuleVariable {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every path from a root ancestor down to `id`, outermost first. A root
    /// node yields the single path `[id]`. A non-root node with no surviving
    /// parents yields no paths: there is nothing to attribute to.
    pub fn root_paths(&self, id: VariableId) -> Vec<Vec<VariableId>> {
        let node = self.get(id);
        if node.root {
            return vec![vec![id]];
        }
        let mut paths = vec![];
        for &parent in &node.parents {
            for mut path in self.root_paths(parent) {
                path.push(id);
                paths.push(path);
            }
        }
        paths
    }

    /// Cycle-freedom invariant: module nesting is acyclic by construction,
    /// so every parent handle must predate the node holding it.
    #[cfg(test)]
    pub fn is_acyclic(&self) -> bool {
        self.nodes
            .iter()
            .enumerate()
            .all(|(id, node)| node.parents.iter().all(|parent| parent.0 < id))
    }
}
