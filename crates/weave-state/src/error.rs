/// Errors raised by state tracking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// The model does not enable the requested tracking feature.
    #[error("state management is turned off for {model}: {feature}")]
    StateManagementDisabled { model: String, feature: &'static str },

    /// The document was never loaded or saved through the tracked path.
    #[error("no state was saved for this {model}")]
    StateNotSaved { model: String },

    /// A change could not be replayed onto another record because the
    /// path it targets runs through a missing or non-object value.
    #[error("cannot apply change at `{path}`")]
    ApplyChanges { path: String },
}

/// Convenience alias for state tracking.
pub type StateResult<T> = Result<T, StateError>;
