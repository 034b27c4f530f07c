use super::{array_field, entity_field, qualify, AliasGenerator, JoinContext, JoinNode};
use crate::error::{Error, Result};
use crate::executor::{FieldType, ProjectedField, Projection};
use crate::fetch::{FetchDescriptor, FetchTarget};
use crate::registry::{ClassMetadata, Registry};
use std::sync::Arc;

/// Joins and projections for one SELECT over a root class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGraph {
    class: String,
    relation: String,
    alias: String,
    /// Qualified root primary key columns
    primary_key: Vec<String>,
    fields: Vec<ProjectedField>,
    nodes: Vec<JoinNode>,
}

impl JoinGraph {
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn root_fields(&self) -> &[ProjectedField] {
        &self.fields
    }

    pub fn nodes(&self) -> &[JoinNode] {
        &self.nodes
    }

    /// Root fields first, then every node's fields in join order
    pub fn projected_fields(&self) -> Vec<&ProjectedField> {
        let mut out: Vec<&ProjectedField> = self.fields.iter().collect();
        for node in &self.nodes {
            node.collect_fields(&mut out);
        }
        out
    }

    pub fn projection(&self) -> Projection {
        Projection::new(self.projected_fields().into_iter().cloned().collect())
    }

    pub fn select_list(&self) -> String {
        self.projected_fields()
            .iter()
            .map(|f| f.render())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `table alias` followed by every join clause
    pub fn from_clause(&self) -> String {
        let mut out = format!("{} {}", self.relation, self.alias);
        for node in &self.nodes {
            node.render_into(&mut out);
        }
        out
    }

    /// Some projected field aggregates a to-many join
    pub fn is_aggregated(&self) -> bool {
        self.projected_fields().iter().any(|f| f.field_type.is_array())
    }

    /// Root primary key plus every to-one row expression, when aggregating
    pub fn group_by(&self) -> Vec<String> {
        if !self.is_aggregated() {
            return Vec::new();
        }
        let mut group_by = self.primary_key.clone();
        for field in self.projected_fields() {
            if matches!(field.field_type, FieldType::Entity(_)) && !group_by.contains(&field.expression) {
                group_by.push(field.expression.clone());
            }
        }
        group_by
    }
}

/// Builds a [`JoinGraph`] for a root class and a requested property list
///
/// Properties are processed in request order and duplicates are ignored,
/// so a fixed input always renders the same SQL.
///
/// # Example
///
/// ```no_run
/// use tether::join::JoinGraphBuilder;
/// # fn demo(registry: &tether::Registry) -> tether::Result<()> {
/// let graph = JoinGraphBuilder::new(registry).build("DummyPerson", &["name", "dogs"])?;
/// println!("SELECT {} FROM {}", graph.select_list(), graph.from_clause());
/// # Ok(())
/// # }
/// ```
pub struct JoinGraphBuilder<'r> {
    registry: &'r Registry,
}

impl<'r> JoinGraphBuilder<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    pub fn build<S: AsRef<str>>(&self, class: &str, properties: &[S]) -> Result<JoinGraph> {
        let metadata = self.registry.metadata(class)?;
        let structure = metadata.structure();
        let mut aliases = AliasGenerator::new();
        let root_alias = aliases.next_alias();

        let mut seen: Vec<&str> = Vec::with_capacity(properties.len());
        let mut fields = Vec::new();
        let mut nodes = Vec::new();

        for property in properties {
            let property = property.as_ref();
            if seen.contains(&property) {
                continue;
            }
            seen.push(property);

            match metadata.fetch(property) {
                Some(descriptor) if descriptor.is_relational() => {
                    let node = self.node_for(&metadata, descriptor, &root_alias, &mut aliases)?;
                    nodes.push(node);
                }
                _ if structure.has_field(property) => {
                    let sql_type = structure.field_type(property).unwrap_or("text");
                    fields.push(ProjectedField::new(
                        property,
                        qualify(&root_alias, property),
                        FieldType::Sql(sql_type.to_string()),
                    ));
                }
                _ => return Err(Error::unknown_property(metadata.name(), property)),
            }
        }

        let primary_key = structure
            .primary_key_fields()
            .iter()
            .map(|column| qualify(&root_alias, column))
            .collect();

        Ok(JoinGraph {
            class: metadata.name().to_string(),
            relation: structure.relation().to_string(),
            alias: root_alias,
            primary_key,
            fields,
            nodes,
        })
    }

    fn node_for(
        &self,
        metadata: &Arc<ClassMetadata>,
        descriptor: &FetchDescriptor,
        source_alias: &str,
        aliases: &mut AliasGenerator,
    ) -> Result<JoinNode> {
        match &descriptor.target {
            FetchTarget::Related {
                class,
                columns,
                collection,
            } => {
                let structure = self.registry.structure(class)?;
                let alias = aliases.next_alias();
                let field = if *collection {
                    array_field(&alias, class, &structure, &descriptor.property)
                } else {
                    entity_field(&alias, class, &structure, &descriptor.property)
                };
                Ok(JoinNode {
                    join_type: descriptor.join_type,
                    source_alias: source_alias.to_string(),
                    class: class.clone(),
                    relation: structure.relation().to_string(),
                    alias,
                    condition: columns.clone(),
                    fields: vec![field],
                    children: Vec::new(),
                })
            }
            FetchTarget::Through {
                mid_class,
                owner_columns,
                related_class,
                related_columns,
            } => {
                let mid_structure = self.registry.structure(mid_class)?;
                let related_structure = self.registry.structure(related_class)?;
                let mid_alias = aliases.next_alias();
                let related_alias = aliases.next_alias();
                let related = JoinNode {
                    join_type: descriptor.join_type,
                    source_alias: mid_alias.clone(),
                    class: related_class.clone(),
                    relation: related_structure.relation().to_string(),
                    fields: vec![array_field(
                        &related_alias,
                        related_class,
                        &related_structure,
                        &descriptor.property,
                    )],
                    alias: related_alias,
                    condition: related_columns.clone(),
                    children: Vec::new(),
                };
                Ok(JoinNode {
                    join_type: descriptor.join_type,
                    source_alias: source_alias.to_string(),
                    class: mid_class.clone(),
                    relation: mid_structure.relation().to_string(),
                    alias: mid_alias,
                    condition: owner_columns.clone(),
                    fields: Vec::new(),
                    children: vec![related],
                })
            }
            FetchTarget::Callback(callback) => {
                let mut context = JoinContext::new(
                    self.registry,
                    aliases,
                    metadata.name(),
                    source_alias,
                    &descriptor.property,
                );
                callback(&mut context)
            }
            FetchTarget::Field => Err(Error::configuration(
                metadata.name(),
                &descriptor.property,
                "a structure field has no join",
            )),
        }
    }
}
