use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Attributes of a [`User`]. All values are strings; numeric, semver, and datetime conditions
/// parse them when evaluated.
pub type Attributes = HashMap<String, String>;

/// A user toggles are evaluated for.
///
/// `key` identifies the user and is the default input for percentage rollouts.
///
/// ```
/// # use featureprobe::User;
/// let user = User::new("user-id")
///     .with_attr("city", "Paris")
///     .with_attr("age", "42");
/// assert_eq!(user.get("city"), Some("Paris"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    key: String,
    #[serde(default)]
    attrs: Attributes,
}

impl User {
    /// Create a user without attributes.
    pub fn new(key: impl Into<String>) -> User {
        User {
            key: key.into(),
            attrs: Attributes::new(),
        }
    }

    /// Add (or replace) an attribute, consuming and returning the user.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> User {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Add (or replace) an attribute.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(name.into(), value.into());
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        self.attrs.remove(name)
    }

    /// Replace all attributes.
    pub fn set_attrs(&mut self, attrs: Attributes) {
        self.attrs = attrs;
    }

    #[allow(missing_docs)]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[allow(missing_docs)]
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    #[allow(missing_docs)]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    #[allow(missing_docs)]
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }
}
