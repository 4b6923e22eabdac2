use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use weave_store::IndexModel;

/// Per-model configuration, resolved once when the registry is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Collection name. Defaults to the model name.
    pub collection: Option<String>,
    /// Check and regenerate a revision token on every write.
    pub use_revision: bool,
    /// Keep a snapshot of the stored form so that only changes are saved.
    pub use_state_management: bool,
    /// Replace nested objects wholesale in change sets instead of diffing
    /// them field by field.
    pub state_management_replace_objects: bool,
    /// Also keep the snapshot that preceded the last save.
    pub state_management_save_previous: bool,
    /// Store null fields. When `false` they are dropped from the record.
    pub keep_nulls: bool,
    /// Validate the document by re-constructing it before every write.
    pub validate_on_save: bool,
    /// Nesting depth used when a query does not ask for one.
    pub max_nesting_depth: Option<u32>,
    /// Upper bound on the nesting depth of individual fields.
    pub max_nesting_depths_per_field: HashMap<String, u32>,
    /// Indexes created by [`Registry::init`](crate::Registry::init).
    pub indexes: Vec<IndexModel>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            collection: None,
            use_revision: false,
            use_state_management: false,
            state_management_replace_objects: false,
            state_management_save_previous: false,
            keep_nulls: true,
            validate_on_save: false,
            max_nesting_depth: None,
            max_nesting_depths_per_field: HashMap::new(),
            indexes: Vec::new(),
        }
    }
}

impl Settings {
    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    pub fn with_revision(mut self) -> Self {
        self.use_revision = true;
        self
    }

    pub fn with_state_management(mut self) -> Self {
        self.use_state_management = true;
        self
    }

    pub fn with_replace_objects(mut self) -> Self {
        self.state_management_replace_objects = true;
        self
    }

    pub fn with_save_previous(mut self) -> Self {
        self.state_management_save_previous = true;
        self
    }

    pub fn without_nulls(mut self) -> Self {
        self.keep_nulls = false;
        self
    }

    pub fn with_validate_on_save(mut self) -> Self {
        self.validate_on_save = true;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: u32) -> Self {
        self.max_nesting_depth = Some(depth);
        self
    }

    pub fn with_field_depth(mut self, field: impl Into<String>, depth: u32) -> Self {
        self.max_nesting_depths_per_field.insert(field.into(), depth);
        self
    }

    pub fn with_index(mut self, index: IndexModel) -> Self {
        self.indexes.push(index);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_nulls_and_disable_tracking() {
        let settings = Settings::default();
        assert!(settings.keep_nulls);
        assert!(!settings.use_revision);
        assert!(!settings.use_state_management);
        assert_eq!(settings.max_nesting_depth, None);
    }

    #[test]
    fn deserializes_partial_documents() {
        let settings: Settings =
            serde_json::from_str(r#"{"collection": "houses", "use_revision": true}"#).unwrap();
        assert_eq!(settings.collection.as_deref(), Some("houses"));
        assert!(settings.use_revision);
        assert!(settings.keep_nulls);
    }

    #[test]
    fn builders_compose() {
        let settings = Settings::default()
            .with_state_management()
            .with_save_previous()
            .with_field_depth("back_link", 2)
            .with_index(IndexModel::ascending("name").unique());
        assert!(settings.use_state_management);
        assert!(settings.state_management_save_previous);
        assert_eq!(settings.max_nesting_depths_per_field["back_link"], 2);
        assert_eq!(settings.indexes.len(), 1);
    }
}
