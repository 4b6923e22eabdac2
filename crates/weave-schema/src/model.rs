//! Explicit per-model schema descriptors.

use std::fmt;
use std::sync::Arc;

use crate::codec::FieldCodec;
use crate::document::Document;
use crate::settings::Settings;

/// What a field holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Ordinary data.
    Plain,
    /// A stored reference to one `target` document.
    Link { target: String },
    /// An ordered list of stored references to `target` documents.
    LinkList { target: String },
    /// The `target` document whose `original_field` links here. Never stored.
    BackLink {
        target: String,
        original_field: String,
    },
    /// Every `target` document whose `original_field` links here. Never stored.
    BackLinkList {
        target: String,
        original_field: String,
    },
}

impl FieldKind {
    /// Forward link, single or list.
    pub fn is_link(&self) -> bool {
        matches!(self, Self::Link { .. } | Self::LinkList { .. })
    }

    /// Back-link, single or list.
    pub fn is_back_link(&self) -> bool {
        matches!(self, Self::BackLink { .. } | Self::BackLinkList { .. })
    }

    pub fn is_relation(&self) -> bool {
        !matches!(self, Self::Plain)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::LinkList { .. } | Self::BackLinkList { .. })
    }

    /// Model at the other end of the relation.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Plain => None,
            Self::Link { target }
            | Self::LinkList { target }
            | Self::BackLink { target, .. }
            | Self::BackLinkList { target, .. } => Some(target.as_str()),
        }
    }

    /// Forward field on the target model that a back-link inverts.
    pub fn original_field(&self) -> Option<&str> {
        match self {
            Self::BackLink { original_field, .. } | Self::BackLinkList { original_field, .. } => {
                Some(original_field.as_str())
            }
            _ => None,
        }
    }
}

/// One declared field of a model.
#[derive(Clone)]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldKind,
    /// Construction fails when the field is absent or null.
    pub required: bool,
    pub codec: Option<Arc<dyn FieldCodec>>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            codec: None,
        }
    }
}

impl fmt::Debug for FieldSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSchema")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("codec", &self.codec.as_ref().map(|c| c.name()))
            .finish()
    }
}

/// Field layout and settings of one model.
#[derive(Clone, Debug)]
pub struct ModelSchema {
    pub name: String,
    /// Fields in declaration order; inherited fields first.
    pub fields: Vec<FieldSchema>,
    pub settings: Settings,
}

impl ModelSchema {
    /// Collection the model's documents live in.
    pub fn collection(&self) -> &str {
        self.settings.collection.as_deref().unwrap_or(&self.name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Link and back-link fields, in declaration order.
    pub fn relation_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.kind.is_relation())
    }

    /// Forward link fields, in declaration order.
    pub fn link_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.kind.is_link())
    }

    pub fn back_link_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.kind.is_back_link())
    }
}

/// Builder for [`ModelSchema`].
///
/// Inheritance is explicit: with [`extends`](Self::extends) the parent's
/// fields come first in the parent's order, the child's own fields follow in
/// declaration order, and a child field reusing a parent name replaces the
/// parent's entry where it stands. Settings always come from the child.
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    parent: Option<ModelSchema>,
    fields: Vec<FieldSchema>,
    settings: Settings,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            fields: Vec::new(),
            settings: Settings::default(),
        }
    }

    /// Inherit the fields of `parent`.
    pub fn extends(mut self, parent: ModelSchema) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Inherit the fields of the typed model `P`.
    pub fn extends_model<P: Document>(self) -> Self {
        self.extends(P::schema())
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Declare a field of any kind, replacing an earlier declaration of the
    /// same name.
    pub fn declare(mut self, field: FieldSchema) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn field(self, name: impl Into<String>) -> Self {
        self.declare(FieldSchema::new(name, FieldKind::Plain))
    }

    pub fn link<T: Document>(self, name: impl Into<String>) -> Self {
        self.link_to(name, T::MODEL)
    }

    pub fn link_to(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.declare(FieldSchema::new(
            name,
            FieldKind::Link {
                target: target.into(),
            },
        ))
    }

    pub fn link_list<T: Document>(self, name: impl Into<String>) -> Self {
        self.link_list_to(name, T::MODEL)
    }

    pub fn link_list_to(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.declare(FieldSchema::new(
            name,
            FieldKind::LinkList {
                target: target.into(),
            },
        ))
    }

    pub fn back_link<T: Document>(self, name: impl Into<String>, original_field: impl Into<String>) -> Self {
        self.back_link_to(name, T::MODEL, original_field)
    }

    pub fn back_link_to(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        original_field: impl Into<String>,
    ) -> Self {
        self.declare(FieldSchema::new(
            name,
            FieldKind::BackLink {
                target: target.into(),
                original_field: original_field.into(),
            },
        ))
    }

    pub fn back_link_list<T: Document>(
        self,
        name: impl Into<String>,
        original_field: impl Into<String>,
    ) -> Self {
        self.back_link_list_to(name, T::MODEL, original_field)
    }

    pub fn back_link_list_to(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        original_field: impl Into<String>,
    ) -> Self {
        self.declare(FieldSchema::new(
            name,
            FieldKind::BackLinkList {
                target: target.into(),
                original_field: original_field.into(),
            },
        ))
    }

    /// Mark `name` required, declaring it as a plain field if needed.
    pub fn required(mut self, name: &str) -> Self {
        if self.fields.iter().all(|f| f.name != name) {
            self = self.field(name);
        }
        for field in self.fields.iter_mut().filter(|f| f.name == name) {
            field.required = true;
        }
        self
    }

    /// Attach `codec` to `name`, declaring it as a plain field if needed.
    pub fn codec(mut self, name: &str, codec: impl FieldCodec + 'static) -> Self {
        if self.fields.iter().all(|f| f.name != name) {
            self = self.field(name);
        }
        let codec: Arc<dyn FieldCodec> = Arc::new(codec);
        for field in self.fields.iter_mut().filter(|f| f.name == name) {
            field.codec = Some(Arc::clone(&codec));
        }
        self
    }

    pub fn build(self) -> ModelSchema {
        let mut fields = self.parent.map(|p| p.fields).unwrap_or_default();
        for own in self.fields {
            match fields.iter_mut().find(|f| f.name == own.name) {
                Some(inherited) => *inherited = own,
                None => fields.push(own),
            }
        }
        ModelSchema {
            name: self.name,
            fields,
            settings: self.settings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TimestampMillis;

    fn names(schema: &ModelSchema) -> Vec<&str> {
        schema.fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn fields_keep_declaration_order() {
        let schema = SchemaBuilder::new("House")
            .field("name")
            .link_to("door", "Door")
            .link_list_to("windows", "Window")
            .back_link_to("owner", "Person", "house")
            .build();
        assert_eq!(names(&schema), vec!["name", "door", "windows", "owner"]);
        assert_eq!(schema.collection(), "House");
        let links: Vec<_> = schema.link_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(links, vec!["door", "windows"]);
        let back: Vec<_> = schema.back_link_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(back, vec!["owner"]);
    }

    #[test]
    fn inheritance_is_parent_first_with_in_place_override() {
        let parent = SchemaBuilder::new("Vehicle")
            .field("color")
            .link_to("engine", "Engine")
            .field("wheels")
            .build();
        let child = SchemaBuilder::new("Bus")
            .extends(parent)
            .field("seats")
            .link_to("engine", "DieselEngine")
            .settings(Settings::default().with_collection("buses"))
            .build();

        assert_eq!(names(&child), vec!["color", "engine", "wheels", "seats"]);
        assert_eq!(
            child.field("engine").unwrap().kind.target(),
            Some("DieselEngine")
        );
        assert_eq!(child.collection(), "buses");
    }

    #[test]
    fn inheritance_chains_stay_deterministic() {
        let base = SchemaBuilder::new("A").field("a").field("shared").build();
        let middle = SchemaBuilder::new("B").extends(base).field("b").build();
        let leaf = SchemaBuilder::new("C")
            .extends(middle)
            .field("c")
            .link_to("shared", "X")
            .build();
        assert_eq!(names(&leaf), vec!["a", "shared", "b", "c"]);
        assert!(leaf.field("shared").unwrap().kind.is_link());
    }

    #[test]
    fn required_and_codec_declare_missing_fields() {
        let schema = SchemaBuilder::new("Event")
            .required("title")
            .codec("at", TimestampMillis)
            .build();
        assert!(schema.field("title").unwrap().required);
        assert_eq!(
            schema.field("at").unwrap().codec.as_ref().map(|c| c.name()),
            Some("timestamp_millis")
        );
    }

    #[test]
    fn kind_helpers() {
        let kind = FieldKind::BackLinkList {
            target: "A".into(),
            original_field: "link".into(),
        };
        assert!(kind.is_back_link());
        assert!(kind.is_list());
        assert!(!kind.is_link());
        assert_eq!(kind.original_field(), Some("link"));
        assert!(!FieldKind::Plain.is_relation());
    }
}
