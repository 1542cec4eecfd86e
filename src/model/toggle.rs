use crate::{EvaluationResult, HitResult, User, Value};

use super::prerequisite::PrerequisiteError;
use super::{Segments, Toggle, Toggles};

impl Toggle {
    /// Evaluate the toggle for `user`.
    ///
    /// `default_value` is returned when no variation can be served. It also decides whether an
    /// integer variation is widened to a float. `max_prerequisites_deep` bounds the depth of
    /// prerequisite chains; exceeding it, or depending on an unknown toggle, yields the default
    /// serve result.
    pub fn eval(
        &self,
        user: &User,
        toggles: &Toggles,
        segments: &Segments,
        default_value: Option<&Value>,
        max_prerequisites_deep: u32,
    ) -> EvaluationResult {
        match self.do_eval(user, toggles, segments, default_value, max_prerequisites_deep) {
            Ok(result) => result,
            Err(err) => {
                log::warn!(target: "featureprobe",
                           toggle_key:display = self.key,
                           err:display;
                           "failed to evaluate prerequisites");
                self.default_result(user, default_value, &err.to_string())
            }
        }
    }

    fn do_eval(
        &self,
        user: &User,
        toggles: &Toggles,
        segments: &Segments,
        default_value: Option<&Value>,
        deep: u32,
    ) -> Result<EvaluationResult, PrerequisiteError> {
        if !self.enabled {
            return Ok(self.disabled_result(user, default_value));
        }

        if deep == 0 {
            return Err(PrerequisiteError::DeepOverflow);
        }

        if !self.prerequisites_satisfied(user, toggles, segments, deep)? {
            return Ok(self.default_result(user, default_value, "prerequisite not match"));
        }

        let mut warning = None;
        for (rule_index, rule) in self.rules.iter().enumerate() {
            let hit_result = rule.hit(user, segments, &self.key);
            if hit_result.hit {
                return Ok(self.hit_value(hit_result, default_value, Some(rule_index)));
            }
            if let Some(reason) = hit_result.reason.filter(|r| !r.is_empty()) {
                warning = Some(reason);
            }
        }

        Ok(self.default_result(user, default_value, warning.as_deref().unwrap_or_default()))
    }

    fn prerequisites_satisfied(
        &self,
        user: &User,
        toggles: &Toggles,
        segments: &Segments,
        deep: u32,
    ) -> Result<bool, PrerequisiteError> {
        for prerequisite in &self.prerequisites {
            let toggle = toggles
                .get(&prerequisite.key)
                .ok_or_else(|| PrerequisiteError::ToggleNotExist(prerequisite.key.clone()))?;
            let result = toggle.do_eval(user, toggles, segments, None, deep - 1)?;
            if !prerequisite.is_satisfied_by(result.value.as_ref()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn disabled_result(&self, user: &User, default_value: Option<&Value>) -> EvaluationResult {
        let hit_result = self.disabled_serve.eval_index(user, &self.key);
        let mut result = self.hit_value(hit_result, default_value, None);
        result.reason = "Toggle disabled".to_owned();
        result
    }

    fn default_result(
        &self,
        user: &User,
        default_value: Option<&Value>,
        warning: &str,
    ) -> EvaluationResult {
        let hit_result = self.default_serve.eval_index(user, &self.key);
        let mut result = self.hit_value(hit_result, default_value, None);
        result.reason = format!("Default rule hit. {warning}");
        result
    }

    fn hit_value(
        &self,
        hit_result: HitResult,
        default_value: Option<&Value>,
        rule_index: Option<usize>,
    ) -> EvaluationResult {
        let mut result = EvaluationResult {
            value: default_value.cloned(),
            rule_index,
            variation_index: hit_result.index,
            version: self.version,
            reason: hit_result.reason.unwrap_or_default(),
        };

        let Some(index) = hit_result.index else {
            return result;
        };

        match self.variations.get(index) {
            Some(variation) => {
                result.value = Some(variation.clone().widen_like(default_value));
                if let Some(rule_index) = rule_index {
                    result.reason = format!("Rule {rule_index} hit");
                }
            }
            None => {
                log::warn!(target: "featureprobe",
                           toggle_key:display = self.key,
                           index;
                           "variation index out of range");
                result.variation_index = None;
                result.reason = format!("variation index {index} out of range");
            }
        }
        result
    }
}
