use crate::Value;

use super::Prerequisite;

/// Failure to evaluate the prerequisites of a toggle. Turns the whole evaluation into a default
/// result.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum PrerequisiteError {
    #[error("prerequisite deep overflow")]
    DeepOverflow,
    #[error("prerequisite not exist: {0}")]
    ToggleNotExist(String),
}

impl Prerequisite {
    /// `value` is the evaluated value of the prerequisite toggle. Values are compared by their
    /// textual form, so `"true"` on the wire satisfies a served `true`.
    pub(crate) fn is_satisfied_by(&self, value: Option<&Value>) -> bool {
        value.is_some_and(|value| value.to_string() == self.value.to_string())
    }
}
