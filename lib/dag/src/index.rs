//! Index declaration and graph construction.

use crate::effect::{Effect, EffectGroupKey, IndexConfig};
use crate::graph::{Dag, DagBuilder};
use crate::node::{EventAggregationParams, Node, NodeKind};
use spacefold_core::{Error, FieldType, Result, Vector, Weighted};
use spacefold_schema::{Schema, SchemaKind, Space};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// A named combination of spaces and effects, compiled into a node graph.
#[derive(Debug, Clone)]
pub struct Index {
    name: String,
    spaces: Vec<Space>,
    schemas: BTreeMap<String, Schema>,
    effects: Vec<Effect>,
    config: IndexConfig,
    schema_roots: BTreeMap<String, Arc<Node>>,
    dag: Dag,
}

#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    name: String,
    spaces: Vec<Space>,
    schemas: Vec<Schema>,
    effects: Vec<Effect>,
    config: IndexConfig,
}

impl IndexBuilder {
    #[must_use]
    pub fn space(mut self, space: Space) -> Self {
        self.spaces.push(space);
        self
    }

    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    #[must_use]
    pub fn effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Index> {
        Index::new(self.name, self.spaces, self.schemas, self.effects, self.config)
    }
}

impl Index {
    pub fn builder(name: impl Into<String>) -> IndexBuilder {
        IndexBuilder {
            name: name.into(),
            ..IndexBuilder::default()
        }
    }

    pub fn new(
        name: impl Into<String>,
        spaces: Vec<Space>,
        schemas: Vec<Schema>,
        effects: Vec<Effect>,
        config: IndexConfig,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidConfig("index name cannot be empty".to_string()));
        }
        config.validate()?;

        let mut schema_map = BTreeMap::new();
        for schema in schemas {
            schema.validate()?;
            if schema_map.insert(schema.name.clone(), schema).is_some() {
                return Err(Error::InvalidConfig(format!("schema declared twice in index '{}'", name)));
            }
        }
        validate_spaces(&spaces, &schema_map)?;
        validate_effects(&effects, &spaces, &schema_map)?;

        let mut indexed: BTreeSet<String> = spaces
            .iter()
            .flat_map(|space| space.schemas().map(str::to_string))
            .collect();
        indexed.extend(effects.iter().map(|e| e.affected.schema.clone()));

        let mut groups: BTreeMap<EffectGroupKey, Vec<&Effect>> = BTreeMap::new();
        for effect in &effects {
            groups.entry(effect.group_key()).or_default().push(effect);
        }

        let mut builder = DagBuilder::new();
        let mut schema_roots = BTreeMap::new();
        for schema in &indexed {
            let mut per_space = Vec::with_capacity(spaces.len());
            for space in &spaces {
                let base = base_node(&mut builder, space, schema, &schema_map)?;
                let node_groups: Vec<(&EffectGroupKey, &Vec<&Effect>)> = groups
                    .iter()
                    .filter(|(key, _)| key.space == space.id && key.affected.schema == *schema)
                    .collect();
                if node_groups.is_empty() {
                    per_space.push(base);
                    continue;
                }

                let mut parents = vec![Weighted::new(base, 1.0 - config.event_influence)];
                for (key, group) in node_groups {
                    let input = base_node(&mut builder, space, &key.affecting.schema, &schema_map)?;
                    let params = EventAggregationParams {
                        space: space.id.clone(),
                        event_schema: key.event_schema.clone(),
                        affected: key.affected.clone(),
                        affecting: key.affecting.clone(),
                        filters: group
                            .iter()
                            .map(|effect| Weighted::new(effect.filter.clone(), effect.multiplier))
                            .collect(),
                        transformation: Arc::clone(&space.transformation),
                        config: config.clone(),
                    };
                    let event_node = builder.intern(Node::event_aggregation(params, input))?;
                    parents.push(Weighted::new(event_node, config.event_influence));
                }
                per_space.push(builder.intern(Node::aggregation(
                    schema,
                    parents,
                    Arc::clone(&space.transformation),
                ))?);
            }

            let root = if per_space.len() > 1 {
                let lengths = spaces.iter().map(Space::length).collect();
                builder.intern(Node::concatenation(schema, per_space, lengths))?
            } else {
                per_space.remove(0)
            };
            schema_roots.insert(schema.clone(), root);
        }

        let dag = Dag::new(Node::index(&name, &schema_roots)?)?;
        tracing::info!(
            index = %name,
            n_spaces = spaces.len(),
            n_schemas = schema_roots.len(),
            n_nodes = dag.nodes().count(),
            "built index graph"
        );
        Ok(Self {
            name,
            spaces,
            schemas: schema_map,
            effects,
            config,
            schema_roots,
            dag,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spaces(&self) -> &[Space] {
        &self.spaces
    }

    pub fn space(&self, id: &str) -> Option<&Space> {
        self.spaces.iter().find(|s| s.id == id)
    }

    pub fn space_lengths(&self) -> Vec<usize> {
        self.spaces.iter().map(Space::length).collect()
    }

    /// Dimension of the index vector.
    pub fn length(&self) -> usize {
        self.spaces.iter().map(Space::length).sum()
    }

    /// Whether index vectors are concatenations of per-space parts.
    pub fn is_concatenated(&self) -> bool {
        self.spaces.len() > 1
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }

    /// Entity schemas with a vector in this index.
    pub fn indexed_schemas(&self) -> impl Iterator<Item = &str> {
        self.schema_roots.keys().map(String::as_str)
    }

    pub fn is_indexed(&self, schema: &str) -> bool {
        self.schema_roots.contains_key(schema)
    }

    pub fn schema_root(&self, schema: &str) -> Option<&Arc<Node>> {
        self.schema_roots.get(schema)
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Root of the graph.
    pub fn node(&self) -> &Arc<Node> {
        self.dag.root()
    }

    /// Event-aggregation nodes fed by events of `event_schema`.
    pub fn event_nodes_for(&self, event_schema: &str) -> Vec<Arc<Node>> {
        self.dag
            .event_aggregation_nodes()
            .filter(|node| matches!(node.kind(), NodeKind::EventAggregation(p) if p.event_schema == event_schema))
            .cloned()
            .collect()
    }
}

/// The space's own vector for `schema`: the embedded field, or a zero
/// constant when the space does not read this schema.
fn base_node(
    builder: &mut DagBuilder,
    space: &Space,
    schema: &str,
    schemas: &BTreeMap<String, Schema>,
) -> Result<Arc<Node>> {
    let Some(input) = space.input(schema) else {
        return builder.intern(Node::constant(schema, Vector::zeros(space.length())));
    };
    let field = schemas
        .get(schema)
        .and_then(|s| s.get_field(&input.field))
        .ok_or_else(|| Error::InvalidConfig(format!("unknown field {}.{}", schema, input.field)))?;
    let mut parent = builder.intern(Node::schema_field(schema, &input.field, field.field_type))?;
    if let Some(chunking) = input.chunking {
        parent = builder.intern(Node::chunking(parent, chunking))?;
    }
    builder.intern(Node::embedding(
        &space.id,
        schema,
        Arc::clone(&space.transformation),
        parent,
        field.nullable,
    ))
}

fn validate_spaces(spaces: &[Space], schemas: &BTreeMap<String, Schema>) -> Result<()> {
    if spaces.is_empty() {
        return Err(Error::InvalidConfig("an index needs at least one space".to_string()));
    }
    let mut ids = HashSet::new();
    for space in spaces {
        if !ids.insert(space.id.as_str()) {
            return Err(Error::InvalidConfig(format!("space '{}' added twice", space.id)));
        }
        space.build_transformation()?;
        if space.inputs.is_empty() {
            return Err(Error::InvalidConfig(format!("space '{}' is not bound to any schema", space.id)));
        }
        for (schema_name, input) in &space.inputs {
            let schema = schemas
                .get(schema_name)
                .ok_or_else(|| Error::InvalidConfig(format!("space '{}' reads unknown schema '{}'", space.id, schema_name)))?;
            if schema.kind != SchemaKind::Entity {
                return Err(Error::InvalidConfig(format!(
                    "space '{}' cannot read event schema '{}'",
                    space.id, schema_name
                )));
            }
            let field = schema.get_field(&input.field).ok_or_else(|| {
                Error::InvalidConfig(format!("schema '{}' has no field '{}'", schema_name, input.field))
            })?;
            if !space.transformation.embedding.accepts(field.field_type) {
                return Err(Error::InvalidConfig(format!(
                    "space '{}' cannot embed {} field '{}.{}'",
                    space.id, field.field_type, schema_name, input.field
                )));
            }
            if let Some(chunking) = &input.chunking {
                chunking.validate()?;
                if field.field_type != FieldType::String {
                    return Err(Error::InvalidConfig(format!(
                        "only string fields can be chunked, '{}.{}' is {}",
                        schema_name, input.field, field.field_type
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_effects(effects: &[Effect], spaces: &[Space], schemas: &BTreeMap<String, Schema>) -> Result<()> {
    for effect in effects {
        let space = spaces
            .iter()
            .find(|s| s.id == effect.space)
            .ok_or_else(|| Error::InvalidConfig(format!("effect refers to unknown space '{}'", effect.space)))?;
        let event_schema = schemas
            .get(&effect.event_schema)
            .filter(|s| s.is_event())
            .ok_or_else(|| Error::InvalidConfig(format!("'{}' is not an event schema of this index", effect.event_schema)))?;
        for reference in [&effect.affected, &effect.affecting] {
            if event_schema.reference_target(&reference.reference_field) != Some(reference.schema.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "event '{}' has no reference '{}' to schema '{}'",
                    effect.event_schema, reference.reference_field, reference.schema
                )));
            }
            if !matches!(schemas.get(&reference.schema), Some(s) if s.kind == SchemaKind::Entity) {
                return Err(Error::InvalidConfig(format!(
                    "effect references unknown entity schema '{}'",
                    reference.schema
                )));
            }
        }
        if space.input(&effect.affecting.schema).is_none() {
            return Err(Error::InvalidConfig(format!(
                "affecting schema '{}' is not bound to space '{}'",
                effect.affecting.schema, space.id
            )));
        }
        if !effect.multiplier.is_finite() {
            return Err(Error::InvalidConfig("effect multiplier must be finite".to_string()));
        }
    }
    Ok(())
}
