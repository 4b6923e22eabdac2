//! The model registry: built once, validated, then shared read-only.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use weave_store::DocumentStore;

use crate::document::Document;
use crate::error::{SchemaError, SchemaResult};
use crate::model::{FieldKind, ModelSchema};

/// Collects model schemas before validation.
///
/// Registration order does not matter: links may name models registered
/// later, and every cross-model check runs in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    schemas: Vec<ModelSchema>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the typed model `T`.
    pub fn register<T: Document>(self) -> Self {
        self.register_schema(T::schema())
    }

    pub fn register_schema(mut self, schema: ModelSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Validate every schema and freeze the registry.
    ///
    /// Rejects duplicate model names, relations to unregistered models, and
    /// back-links whose original field is not a forward link on the target
    /// pointing back at the declaring model.
    pub fn build(self) -> SchemaResult<Registry> {
        let mut models = HashMap::with_capacity(self.schemas.len());
        let mut order = Vec::with_capacity(self.schemas.len());
        for schema in self.schemas {
            if models.contains_key(&schema.name) {
                return Err(SchemaError::DuplicateModel(schema.name));
            }
            order.push(schema.name.clone());
            models.insert(schema.name.clone(), Arc::new(schema));
        }

        for schema in models.values() {
            for field in schema.relation_fields() {
                let Some(target_name) = field.kind.target() else {
                    continue;
                };
                let target = models.get(target_name).ok_or_else(|| SchemaError::UnknownTarget {
                    model: schema.name.clone(),
                    field: field.name.clone(),
                    target: target_name.to_string(),
                })?;
                if let Some(original) = field.kind.original_field() {
                    let forward = target.field(original).is_some_and(|f| {
                        f.kind.is_link() && f.kind.target() == Some(schema.name.as_str())
                    });
                    if !forward {
                        return Err(SchemaError::BackLinkIntegrity {
                            model: schema.name.clone(),
                            field: field.name.clone(),
                            target: target_name.to_string(),
                            original_field: original.to_string(),
                        });
                    }
                }
            }
        }

        info!(models = order.len(), "model registry built");
        Ok(Registry { models, order })
    }
}

/// Validated set of model schemas.
///
/// Immutable after [`RegistryBuilder::build`]; share it behind an `Arc`.
#[derive(Debug)]
pub struct Registry {
    models: HashMap<String, Arc<ModelSchema>>,
    order: Vec<String>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn model(&self, name: &str) -> SchemaResult<&ModelSchema> {
        self.models
            .get(name)
            .map(Arc::as_ref)
            .ok_or_else(|| SchemaError::UnknownModel(name.to_string()))
    }

    /// Shared handle to a model schema.
    pub fn model_arc(&self, name: &str) -> SchemaResult<Arc<ModelSchema>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownModel(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn collection_of(&self, name: &str) -> SchemaResult<&str> {
        Ok(self.model(name)?.collection())
    }

    /// Models in registration order.
    pub fn models(&self) -> impl Iterator<Item = &ModelSchema> {
        self.order.iter().filter_map(|name| self.models.get(name).map(Arc::as_ref))
    }

    /// Look up a relation field of `model`.
    pub fn relation(&self, model: &str, field: &str) -> SchemaResult<(&ModelSchema, &FieldKind)> {
        let schema = self.model(model)?;
        let kind = schema
            .field(field)
            .map(|f| &f.kind)
            .filter(|k| k.is_relation())
            .ok_or_else(|| SchemaError::UnknownField {
                model: model.to_string(),
                field: field.to_string(),
            })?;
        let target = kind.target().unwrap_or_default();
        Ok((self.model(target)?, kind))
    }

    /// Create every declared index. Existing indexes are left alone.
    pub fn init(&self, store: &dyn DocumentStore) -> SchemaResult<()> {
        let mut created = 0usize;
        for schema in self.models() {
            for index in &schema.settings.indexes {
                store.create_index(schema.collection(), index)?;
                debug!(model = %schema.name, index = %index.name, "index ensured");
                created += 1;
            }
        }
        info!(models = self.order.len(), indexes = created, "registry initialised");
        Ok(())
    }
}
