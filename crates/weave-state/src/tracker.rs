//! Per-model state tracking policy.

use tracing::trace;
use weave_schema::{DocumentMeta, ModelSchema};
use weave_types::{record_id, Record};

use crate::diff::{capture, diff_states, StateDiff};
use crate::error::{StateError, StateResult};

/// Applies a model's state-management settings to document metadata.
#[derive(Clone, Copy, Debug)]
pub struct Tracker<'a> {
    schema: &'a ModelSchema,
}

impl<'a> Tracker<'a> {
    pub fn new(schema: &'a ModelSchema) -> Self {
        Self { schema }
    }

    pub fn is_enabled(&self) -> bool {
        self.schema.settings.use_state_management
    }

    /// Capture `stored` as the saved state of a persisted document,
    /// keeping the old snapshot as previous state when the model asks for
    /// it. A no-op when tracking is off or `stored` has no identifier.
    pub fn save_state(&self, meta: &mut DocumentMeta, stored: &Record) {
        if !self.is_enabled() || !matches!(record_id(stored), Ok(Some(_))) {
            return;
        }
        let snapshot = capture(stored);
        if self.schema.settings.state_management_save_previous {
            meta.previous_state = meta.saved_state.replace(snapshot);
        } else {
            meta.saved_state = Some(snapshot);
        }
        trace!(model = %self.schema.name, "state saved");
    }

    /// Changes of `current` relative to the saved state.
    pub fn changes(&self, meta: &DocumentMeta, current: &Record) -> StateResult<StateDiff> {
        let saved = self.saved(meta)?;
        Ok(diff_states(
            saved,
            current,
            self.schema.settings.state_management_replace_objects,
        ))
    }

    /// Returns `true` if `current` differs from the saved state.
    pub fn is_changed(&self, meta: &DocumentMeta, current: &Record) -> StateResult<bool> {
        Ok(self.saved(meta)? != current)
    }

    /// Changes made by the last save: previous state against saved state.
    /// Empty until the document has been saved twice.
    pub fn previous_changes(&self, meta: &DocumentMeta) -> StateResult<StateDiff> {
        self.check_previous()?;
        match (&meta.previous_state, &meta.saved_state) {
            (Some(previous), Some(saved)) => Ok(diff_states(
                previous,
                saved,
                self.schema.settings.state_management_replace_objects,
            )),
            _ => Ok(StateDiff::new()),
        }
    }

    /// Returns `true` if the last save changed anything.
    pub fn has_changed(&self, meta: &DocumentMeta) -> StateResult<bool> {
        Ok(!self.previous_changes(meta)?.is_empty())
    }

    /// The saved state to restore the document from.
    pub fn rollback(&self, meta: &DocumentMeta) -> StateResult<Record> {
        self.saved(meta).cloned()
    }

    fn saved<'m>(&self, meta: &'m DocumentMeta) -> StateResult<&'m Record> {
        if !self.is_enabled() {
            return Err(self.disabled("state management"));
        }
        meta.saved_state.as_ref().ok_or_else(|| StateError::StateNotSaved {
            model: self.schema.name.clone(),
        })
    }

    fn check_previous(&self) -> StateResult<()> {
        if !self.is_enabled() {
            return Err(self.disabled("state management"));
        }
        if !self.schema.settings.state_management_save_previous {
            return Err(self.disabled("previous state"));
        }
        Ok(())
    }

    fn disabled(&self, feature: &'static str) -> StateError {
        StateError::StateManagementDisabled {
            model: self.schema.name.clone(),
            feature,
        }
    }
}
