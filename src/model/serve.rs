use crate::{HitResult, User};

use super::Serve;

impl Serve {
    /// Variation index served to the user.
    pub fn eval_index(&self, user: &User, toggle_key: &str) -> HitResult {
        if let Some(select) = self.select {
            return HitResult::hit(select);
        }
        match &self.split {
            Some(split) => split.find_index(user, toggle_key),
            None => HitResult::miss_with_reason("serve has neither select nor split"),
        }
    }
}
