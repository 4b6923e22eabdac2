//! Depth-bounded resolution plans.
//!
//! # Invariants
//!
//! - A plan is a finite tree: every branch ends at depth zero.
//! - Nesting depth `D` on a branch resolves exactly `D` levels of it; the
//!   references at level `D + 1` are left unresolved.
//! - A branch with no explicit depth that reaches a model already on its
//!   path is bounded by the target's `max_nesting_depth`, or by
//!   [`DEFAULT_CYCLE_DEPTH`].

use std::collections::HashMap;

use weave_schema::{FieldKind, ModelSchema, Registry};

use crate::error::ResolveResult;

/// Depth bound applied to unbounded branches that revisit a model.
pub const DEFAULT_CYCLE_DEPTH: u32 = 3;

/// Caller-supplied depth limits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DepthOptions {
    /// Levels to resolve from the root. `None` falls back to the model's
    /// `max_nesting_depth`, then to unbounded.
    pub nesting_depth: Option<u32>,
    /// Depth of the branch starting at the named fields of the root model.
    pub per_field: HashMap<String, u32>,
}

impl DepthOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.nesting_depth = Some(depth);
        self
    }

    pub fn with_field_depth(mut self, field: impl Into<String>, depth: u32) -> Self {
        self.per_field.insert(field.into(), depth);
        self
    }
}

/// One relation field to resolve, with the fields to resolve inside the
/// documents it brings in.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkNode {
    pub field: String,
    pub kind: FieldKind,
    pub target_model: String,
    pub target_collection: String,
    pub children: Vec<LinkNode>,
}

impl LinkNode {
    pub fn is_list(&self) -> bool {
        self.kind.is_list()
    }

    pub fn is_back_link(&self) -> bool {
        self.kind.is_back_link()
    }

    /// Temporary field the pipeline joins into.
    pub fn alias(&self) -> String {
        format!("_link_{}", self.field)
    }

    /// Depth of the subtree rooted here.
    pub fn depth(&self) -> u32 {
        1 + self.children.iter().map(LinkNode::depth).max().unwrap_or(0)
    }
}

/// The tree of relation fields to resolve for one model.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkPlan {
    pub model: String,
    pub nodes: Vec<LinkNode>,
}

impl LinkPlan {
    /// Plan resolution of `model` under `options`.
    pub fn build(registry: &Registry, model: &str, options: &DepthOptions) -> ResolveResult<Self> {
        let schema = registry.model(model)?;
        let budget = options.nesting_depth.or(schema.settings.max_nesting_depth);
        let mut path = vec![schema.name.clone()];
        let nodes = plan_nodes(registry, schema, budget, &mut path, Some(&options.per_field))?;
        Ok(Self {
            model: schema.name.clone(),
            nodes,
        })
    }

    /// Plan resolution of the single relation `field`, `depth` levels deep.
    pub fn for_field(registry: &Registry, model: &str, field: &str, depth: u32) -> ResolveResult<Self> {
        registry.relation(model, field)?;
        let mut plan = Self::build(registry, model, &DepthOptions::new().with_field_depth(field, depth))?;
        plan.nodes.retain(|n| n.field == field);
        Ok(plan)
    }

    /// A plan that resolves nothing.
    pub fn empty(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            nodes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Deepest level the plan resolves.
    pub fn depth(&self) -> u32 {
        self.nodes.iter().map(LinkNode::depth).max().unwrap_or(0)
    }
}

fn plan_nodes(
    registry: &Registry,
    schema: &ModelSchema,
    budget: Option<u32>,
    path: &mut Vec<String>,
    overrides: Option<&HashMap<String, u32>>,
) -> ResolveResult<Vec<LinkNode>> {
    let mut nodes = Vec::new();
    for field in schema.relation_fields() {
        let Some(target_name) = field.kind.target() else {
            continue;
        };
        let target = registry.model(target_name)?;

        let mut remaining = overrides
            .and_then(|o| o.get(&field.name).copied())
            .or(budget);
        if let Some(cap) = schema.settings.max_nesting_depths_per_field.get(&field.name) {
            remaining = Some(remaining.map_or(*cap, |r| r.min(*cap)));
        }
        if remaining.is_none() && path.iter().any(|m| m == target_name) {
            remaining = Some(target.settings.max_nesting_depth.unwrap_or(DEFAULT_CYCLE_DEPTH));
        }
        if remaining == Some(0) {
            continue;
        }

        path.push(target.name.clone());
        let children = plan_nodes(registry, target, remaining.map(|r| r - 1), path, None)?;
        path.pop();

        nodes.push(LinkNode {
            field: field.name.clone(),
            kind: field.kind.clone(),
            target_model: target.name.clone(),
            target_collection: target.collection().to_string(),
            children,
        });
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use weave_schema::{SchemaBuilder, Settings};

    fn registry() -> Registry {
        Registry::builder()
            .register_schema(
                SchemaBuilder::new("House")
                    .link_to("door", "Door")
                    .link_list_to("windows", "Window")
                    .build(),
            )
            .register_schema(SchemaBuilder::new("Door").build())
            .register_schema(SchemaBuilder::new("Window").link_to("lock", "Lock").build())
            .register_schema(SchemaBuilder::new("Lock").build())
            .register_schema(SchemaBuilder::new("SelfLink").link_to("link", "SelfLink").build())
            .register_schema(
                SchemaBuilder::new("WithBack")
                    .back_link_to("back_link", "WithLink", "link")
                    .build(),
            )
            .register_schema(SchemaBuilder::new("WithLink").link_to("link", "WithBack").build())
            .build()
            .unwrap()
    }

    fn chain(nodes: &[LinkNode]) -> Vec<&str> {
        let mut fields = Vec::new();
        let mut level = nodes;
        while let Some(node) = level.first() {
            fields.push(node.field.as_str());
            level = &node.children;
        }
        fields
    }

    #[test]
    fn acyclic_graph_resolves_fully_by_default() {
        let plan = LinkPlan::build(&registry(), "House", &DepthOptions::new()).unwrap();
        let fields: Vec<_> = plan.nodes.iter().map(|n| n.field.as_str()).collect();
        assert_eq!(fields, vec!["door", "windows"]);
        assert_eq!(plan.nodes[1].children[0].field, "lock");
        assert_eq!(plan.depth(), 2);
    }

    #[test]
    fn explicit_depth_cuts_the_tree() {
        let plan = LinkPlan::build(&registry(), "House", &DepthOptions::new().with_depth(1)).unwrap();
        assert!(plan.nodes.iter().all(|n| n.children.is_empty()));
        let none = LinkPlan::build(&registry(), "House", &DepthOptions::new().with_depth(0)).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn self_link_is_bounded_by_cycle_depth() {
        let plan = LinkPlan::build(&registry(), "SelfLink", &DepthOptions::new()).unwrap();
        assert_eq!(plan.depth(), DEFAULT_CYCLE_DEPTH);
        let plan = LinkPlan::build(&registry(), "SelfLink", &DepthOptions::new().with_depth(4)).unwrap();
        assert_eq!(chain(&plan.nodes), vec!["link"; 4]);
    }

    #[test]
    fn model_setting_bounds_cycles() {
        let registry = Registry::builder()
            .register_schema(
                SchemaBuilder::new("Node")
                    .link_to("next", "Node")
                    .settings(Settings::default().with_max_nesting_depth(2))
                    .build(),
            )
            .build()
            .unwrap();
        let plan = LinkPlan::build(&registry, "Node", &DepthOptions::new()).unwrap();
        assert_eq!(plan.depth(), 2);
    }

    #[test]
    fn per_field_depth_applies_to_the_root_branch() {
        let options = DepthOptions::new().with_field_depth("back_link", 2);
        let plan = LinkPlan::build(&registry(), "WithBack", &options).unwrap();
        assert_eq!(chain(&plan.nodes), vec!["back_link", "link"]);
    }

    #[test]
    fn mutual_links_are_bounded() {
        let plan = LinkPlan::build(&registry(), "WithBack", &DepthOptions::new()).unwrap();
        // back_link is free; the hop back to WithBack starts a cycle of 3.
        assert_eq!(plan.depth(), 1 + DEFAULT_CYCLE_DEPTH);
    }

    #[test]
    fn field_caps_from_settings() {
        let registry = Registry::builder()
            .register_schema(
                SchemaBuilder::new("Node")
                    .link_to("next", "Node")
                    .settings(Settings::default().with_field_depth("next", 1))
                    .build(),
            )
            .build()
            .unwrap();
        let plan = LinkPlan::build(&registry, "Node", &DepthOptions::new().with_depth(5)).unwrap();
        assert_eq!(plan.depth(), 1);
    }

    #[test]
    fn single_field_plan() {
        let plan = LinkPlan::for_field(&registry(), "House", "windows", 1).unwrap();
        assert_eq!(plan.nodes.len(), 1);
        assert_eq!(plan.nodes[0].field, "windows");
        assert!(plan.nodes[0].children.is_empty());
        assert!(LinkPlan::for_field(&registry(), "House", "roof", 1).is_err());
    }

    proptest! {
        #[test]
        fn depth_is_exactly_the_requested_bound(depth in 0u32..12) {
            let plan = LinkPlan::build(&registry(), "SelfLink", &DepthOptions::new().with_depth(depth)).unwrap();
            prop_assert_eq!(plan.depth(), depth);
        }
    }
}
