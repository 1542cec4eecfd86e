use crate::sharder::{Sha1Sharder, Sharder, BUCKET_SIZE};
use crate::{HitResult, User};

use super::Split;

impl Split {
    /// Find the variation index of the user's bucket.
    ///
    /// The bucket is derived from `bucket_by` (or the user key) salted with `salt` (or the toggle
    /// key), so that the same user lands in independent buckets for different toggles.
    pub fn find_index(&self, user: &User, toggle_key: &str) -> HitResult {
        let hash_key = match self.bucket_by.as_deref().filter(|b| !b.is_empty()) {
            Some(bucket_by) => match user.get(bucket_by) {
                Some(value) => value,
                None => return HitResult::missing_attribute(user.key(), bucket_by),
            },
            None => user.key(),
        };

        let salt = self
            .salt
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(toggle_key);

        let bucket = Sha1Sharder.get_shard(format!("{hash_key}{salt}"), BUCKET_SIZE);
        self.index_of(bucket)
    }

    fn index_of(&self, bucket: u64) -> HitResult {
        let found = self
            .distribution
            .iter()
            .position(|ranges| ranges.iter().any(|range| range.contains(bucket)));

        match found {
            Some(index) => HitResult::hit(index).with_reason(format!("selected bucket {index}")),
            None => HitResult::miss_with_reason(format!(
                "bucket {bucket} is not in any distribution range"
            )),
        }
    }
}
