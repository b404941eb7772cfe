//! DAG collection and per-schema evaluation plans.

use crate::node::{Node, NodeKind};
use spacefold_core::{Error, NodeId, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Deepest parent chain accepted when walking a graph.
pub const MAX_DAG_DEPTH: usize = 64;

/// Interns nodes by structural id so equal sub-computations are shared.
#[derive(Debug, Default)]
pub struct DagBuilder {
    nodes: HashMap<NodeId, Arc<Node>>,
}

impl DagBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the already interned node with the same id, or intern `node`.
    pub fn intern(&mut self, node: Result<Arc<Node>>) -> Result<Arc<Node>> {
        let node = node?;
        Ok(Arc::clone(self.nodes.entry(node.id().clone()).or_insert(node)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Every node reachable from `root` through parent links, root included.
pub fn collect_ancestors(root: &Arc<Node>) -> Result<Vec<Arc<Node>>> {
    fn visit(node: &Arc<Node>, depth: usize, seen: &mut HashSet<NodeId>, out: &mut Vec<Arc<Node>>) -> Result<()> {
        if depth > MAX_DAG_DEPTH {
            return Err(Error::MaxDagDepthExceeded {
                max_depth: MAX_DAG_DEPTH,
            });
        }
        if !seen.insert(node.id().clone()) {
            return Ok(());
        }
        for parent in node.parents() {
            visit(parent, depth + 1, seen, out)?;
        }
        out.push(Arc::clone(node));
        Ok(())
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    visit(root, 0, &mut seen, &mut out)?;
    Ok(out)
}

/// An immutable index graph.
#[derive(Debug, Clone)]
pub struct Dag {
    root: Arc<Node>,
    nodes: BTreeMap<NodeId, Arc<Node>>,
}

impl Dag {
    pub fn new(root: Arc<Node>) -> Result<Self> {
        let nodes = collect_ancestors(&root)?
            .into_iter()
            .map(|node| (node.id().clone(), node))
            .collect();
        Ok(Self { root, nodes })
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    pub fn node(&self, id: &NodeId) -> Option<&Arc<Node>> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.values()
    }

    pub fn event_aggregation_nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes
            .values()
            .filter(|node| matches!(node.kind(), NodeKind::EventAggregation(_)))
    }
}

/// A node scheduled in a plan, with the indices of the parents it reads.
#[derive(Debug, Clone)]
pub struct PlannedNode {
    pub node: Arc<Node>,
    pub parents: Vec<usize>,
}

/// Nodes needed to evaluate `target` for entities of one schema, grouped
/// into levels: every node's parents sit in earlier levels.
#[derive(Debug, Clone)]
pub struct EvaluationPlan {
    schema: String,
    levels: Vec<Vec<PlannedNode>>,
}

impl EvaluationPlan {
    pub fn new(target: &Arc<Node>, schema: &str) -> Result<Self> {
        let mut levels_by_id: HashMap<NodeId, usize> = HashMap::new();
        let mut planned: Vec<(usize, PlannedNode)> = Vec::new();
        level_of(target, schema, 0, &mut levels_by_id, &mut planned)?;

        let depth = planned.iter().map(|(level, _)| level + 1).max().unwrap_or(0);
        let mut levels = vec![Vec::new(); depth];
        for (level, node) in planned {
            levels[level].push(node);
        }
        tracing::debug!(
            target_node = %target.id(),
            schema,
            n_levels = levels.len(),
            "built evaluation plan"
        );
        Ok(Self {
            schema: schema.to_string(),
            levels,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn levels(&self) -> &[Vec<PlannedNode>] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

fn plan_parents(node: &Node, schema: &str) -> Vec<usize> {
    match node.kind() {
        NodeKind::Index { schemas, .. } => schemas
            .get(schema)
            .and_then(|id| node.parents().iter().position(|p| p.id() == id))
            .into_iter()
            .collect(),
        NodeKind::EventAggregation(_) => Vec::new(),
        _ => (0..node.parents().len()).collect(),
    }
}

fn level_of(
    node: &Arc<Node>,
    schema: &str,
    depth: usize,
    levels: &mut HashMap<NodeId, usize>,
    planned: &mut Vec<(usize, PlannedNode)>,
) -> Result<usize> {
    if depth > MAX_DAG_DEPTH {
        return Err(Error::MaxDagDepthExceeded {
            max_depth: MAX_DAG_DEPTH,
        });
    }
    if let Some(&level) = levels.get(node.id()) {
        return Ok(level);
    }
    let parents = plan_parents(node, schema);
    let mut level = 0;
    for &i in &parents {
        level = level.max(level_of(&node.parents()[i], schema, depth + 1, levels, planned)? + 1);
    }
    levels.insert(node.id().clone(), level);
    planned.push((
        level,
        PlannedNode {
            node: Arc::clone(node),
            parents,
        },
    ));
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacefold_core::FieldType;
    use spacefold_schema::{EmbeddingConfig, TransformationConfig};

    fn embedding(schema: &str) -> Arc<Node> {
        let field = Node::schema_field(schema, "v", FieldType::FloatList).unwrap();
        let transformation = Arc::new(TransformationConfig::new(EmbeddingConfig::Custom { length: 2 }));
        Node::embedding("s", schema, transformation, field, false).unwrap()
    }

    #[test]
    fn test_builder_shares_nodes() {
        let mut builder = DagBuilder::new();
        let a = builder.intern(Ok(embedding("p"))).unwrap();
        let b = builder.intern(Ok(embedding("p"))).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_plan_levels_per_schema() {
        let mut roots = BTreeMap::new();
        roots.insert("p".to_string(), embedding("p"));
        roots.insert("q".to_string(), embedding("q"));
        let index = Node::index("idx", &roots).unwrap();

        let dag = Dag::new(Arc::clone(&index)).unwrap();
        assert_eq!(dag.nodes().count(), 5);

        let plan = EvaluationPlan::new(&index, "p").unwrap();
        assert_eq!(plan.levels().len(), 3);
        assert_eq!(plan.len(), 3);
        assert!(matches!(plan.levels()[0][0].node.kind(), NodeKind::SchemaField { .. }));
        assert_eq!(plan.levels()[2][0].node.id(), index.id());
        assert_eq!(plan.levels()[2][0].parents.len(), 1);
    }

    #[test]
    fn test_depth_guard() {
        let transformation = Arc::new(TransformationConfig::new(EmbeddingConfig::Custom { length: 2 }));
        let mut node = Node::constant("p", spacefold_core::Vector::zeros(2)).unwrap();
        for _ in 0..=MAX_DAG_DEPTH {
            node = Node::embedding("s", "p", Arc::clone(&transformation), node, true).unwrap();
        }
        assert!(matches!(
            collect_ancestors(&node),
            Err(Error::MaxDagDepthExceeded { .. })
        ));
        assert!(EvaluationPlan::new(&node, "p").is_err());
    }
}
