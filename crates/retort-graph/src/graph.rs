use std::collections::HashMap;
use std::sync::Arc;

use retort_core::error::{Result, RetortError};

use crate::node::Node;
use crate::state::{State, StateSchema};

/// Predicate over the shared state, used by conditional edges.
pub type Predicate = Arc<dyn Fn(&State) -> bool + Send + Sync>;

/// One row of a conditional edge's decision table.
pub struct ConditionalArm {
    pub(crate) predicate: Predicate,
    pub(crate) target: String,
}

impl ConditionalArm {
    pub fn new<F>(target: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&State) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            target: target.into(),
        }
    }
}

/// Routing resolution compiled for one node. Each non-terminal node has
/// exactly one of these, never two.
pub(crate) enum CompiledEdge {
    Fixed(String),
    Conditional {
        arms: Vec<ConditionalArm>,
        otherwise: String,
    },
    /// Parallel branches (each a chain of fixed-edge nodes) converging on one
    /// join node. Branches are precompiled in declaration order.
    FanOut {
        branches: Vec<Vec<String>>,
        join: String,
    },
    Terminal,
}

/// An immutable, compiled agent graph.
///
/// Built once from a static declaration; one instance may serve many
/// independent runs concurrently since nodes keep no mutable state.
pub struct Graph {
    pub(crate) entry: String,
    pub(crate) nodes: HashMap<String, Arc<dyn Node>>,
    pub(crate) edges: HashMap<String, CompiledEdge>,
    pub(crate) schema: StateSchema,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("entry", &self.entry)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("schema", &self.schema)
            .finish()
    }
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.keys().map(|s| s.as_str()).collect()
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }
}

/// Declarative builder for [`Graph`]. All wiring errors surface from
/// [`GraphBuilder::compile`], before any run.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Arc<dyn Node>>,
    entry: Option<String>,
    schema: StateSchema,
    fixed: Vec<(String, String)>,
    conditionals: Vec<(String, Vec<ConditionalArm>, String)>,
    fan_outs: Vec<(String, Vec<String>)>,
    fan_ins: Vec<(Vec<String>, String)>,
    terminals: Vec<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, node: impl Node) -> Self {
        self.nodes.push(Arc::new(node));
        self
    }

    pub fn node_arc(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Fixed successor: `from` always goes to `to`.
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.fixed.push((from.into(), to.into()));
        self
    }

    /// Predicate-selected successor: the first arm whose predicate holds
    /// wins; `otherwise` catches the rest.
    pub fn conditional(
        mut self,
        from: impl Into<String>,
        arms: Vec<ConditionalArm>,
        otherwise: impl Into<String>,
    ) -> Self {
        self.conditionals.push((from.into(), arms, otherwise.into()));
        self
    }

    /// Parallel fan-out: all `members` run concurrently against the state as
    /// it was when `from` finished.
    pub fn fan_out(
        mut self,
        from: impl Into<String>,
        members: impl IntoIterator<Item = String>,
    ) -> Self {
        self.fan_outs
            .push((from.into(), members.into_iter().collect()));
        self
    }

    /// Join declaration: `join` runs exactly once, after every branch ending
    /// in one of `sources` has completed and merged.
    pub fn fan_in(
        mut self,
        sources: impl IntoIterator<Item = String>,
        join: impl Into<String>,
    ) -> Self {
        self.fan_ins
            .push((sources.into_iter().collect(), join.into()));
        self
    }

    /// Mark a terminal node.
    pub fn terminal(mut self, name: impl Into<String>) -> Self {
        self.terminals.push(name.into());
        self
    }

    /// Validate the declaration and produce an immutable [`Graph`].
    pub fn compile(self) -> Result<Graph> {
        let mut nodes: HashMap<String, Arc<dyn Node>> = HashMap::new();
        for node in self.nodes {
            let name = node.name().to_string();
            if nodes.insert(name.clone(), node).is_some() {
                return Err(compile_err(format!("duplicate node name '{name}'")));
            }
        }

        let entry = self
            .entry
            .ok_or_else(|| compile_err("no entry node declared"))?;
        let declared = |name: &str| nodes.contains_key(name);
        if !declared(&entry) {
            return Err(compile_err(format!("entry node '{entry}' is not declared")));
        }

        let mut edges: HashMap<String, CompiledEdge> = HashMap::new();
        let mut occupy = |edges: &mut HashMap<String, CompiledEdge>,
                          from: String,
                          edge: CompiledEdge|
         -> Result<()> {
            if edges.insert(from.clone(), edge).is_some() {
                return Err(compile_err(format!(
                    "node '{from}' has more than one routing strategy"
                )));
            }
            Ok(())
        };

        // Join sources resolve to their fan-in target; they behave as fixed
        // edges for branch chains.
        let mut join_sources: HashMap<String, String> = HashMap::new();
        for (sources, join) in &self.fan_ins {
            if !declared(join) {
                return Err(compile_err(format!("fan-in join '{join}' is not declared")));
            }
            for source in sources {
                if !declared(source) {
                    return Err(compile_err(format!(
                        "fan-in source '{source}' is not declared"
                    )));
                }
                if join_sources.insert(source.clone(), join.clone()).is_some() {
                    return Err(compile_err(format!(
                        "node '{source}' appears in more than one fan-in"
                    )));
                }
                occupy(&mut edges, source.clone(), CompiledEdge::Fixed(join.clone()))?;
            }
        }

        for (from, to) in self.fixed {
            if !declared(&from) || !declared(&to) {
                return Err(compile_err(format!(
                    "edge {from} -> {to} references an undeclared node"
                )));
            }
            occupy(&mut edges, from, CompiledEdge::Fixed(to))?;
        }

        for (from, arms, otherwise) in self.conditionals {
            if !declared(&from) || !declared(&otherwise) {
                return Err(compile_err(format!(
                    "conditional edge on '{from}' references an undeclared node"
                )));
            }
            for arm in &arms {
                if !declared(&arm.target) {
                    return Err(compile_err(format!(
                        "conditional arm target '{}' is not declared",
                        arm.target
                    )));
                }
            }
            occupy(&mut edges, from, CompiledEdge::Conditional { arms, otherwise })?;
        }

        for name in self.terminals {
            if !declared(&name) {
                return Err(compile_err(format!(
                    "terminal node '{name}' is not declared"
                )));
            }
            occupy(&mut edges, name, CompiledEdge::Terminal)?;
        }

        for (from, members) in self.fan_outs {
            if !declared(&from) {
                return Err(compile_err(format!(
                    "fan-out source '{from}' is not declared"
                )));
            }
            if members.is_empty() {
                return Err(compile_err(format!("fan-out from '{from}' has no members")));
            }
            let mut branches = Vec::with_capacity(members.len());
            let mut join: Option<String> = None;
            for member in &members {
                if !declared(member) {
                    return Err(compile_err(format!(
                        "fan-out member '{member}' is not declared"
                    )));
                }
                let (chain, branch_join) =
                    walk_branch(member, &join_sources, &edges, nodes.len())?;
                match join {
                    None => join = Some(branch_join),
                    Some(ref j) if *j == branch_join => {}
                    Some(ref j) => {
                        return Err(compile_err(format!(
                            "fan-out from '{from}' has branches joining at both '{j}' and '{branch_join}'"
                        )));
                    }
                }
                branches.push(chain);
            }
            let join = join.expect("non-empty fan-out has a join");
            occupy(&mut edges, from, CompiledEdge::FanOut { branches, join })?;
        }

        Ok(Graph {
            entry,
            nodes,
            edges,
            schema: self.schema,
        })
    }
}

/// Follow fixed edges from a fan-out member until a fan-in source is reached.
/// Returns the branch chain (member included, join excluded) and the join.
fn walk_branch(
    member: &str,
    join_sources: &HashMap<String, String>,
    edges: &HashMap<String, CompiledEdge>,
    node_count: usize,
) -> Result<(Vec<String>, String)> {
    let mut chain = Vec::new();
    let mut current = member.to_string();
    loop {
        if chain.len() > node_count {
            return Err(compile_err(format!(
                "fan-out branch starting at '{member}' does not converge on a join"
            )));
        }
        chain.push(current.clone());
        if let Some(join) = join_sources.get(&current) {
            return Ok((chain, join.clone()));
        }
        match edges.get(&current) {
            Some(CompiledEdge::Fixed(next)) => current = next.clone(),
            Some(_) => {
                return Err(compile_err(format!(
                    "fan-out branch node '{current}' must route through fixed edges only"
                )));
            }
            None => {
                return Err(compile_err(format!(
                    "fan-out branch dead-ends at '{current}' before reaching a join"
                )));
            }
        }
    }
}

fn compile_err(message: impl Into<String>) -> RetortError {
    RetortError::GraphCompile(message.into())
}
