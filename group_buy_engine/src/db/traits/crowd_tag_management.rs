use std::collections::HashMap;

use super::DatabaseBackend;

/// Audience tag membership.
#[allow(async_fn_in_trait)]
pub trait CrowdTagManagement: DatabaseBackend {
    async fn check_user_in_tag(&self, tag_id: &str, user_id: &str) -> Result<bool, Self::Error>;

    /// Membership for each of `user_ids`. Every requested user appears in the result.
    async fn batch_check_users_in_tag(
        &self,
        tag_id: &str,
        user_ids: &[String],
    ) -> Result<HashMap<String, bool>, Self::Error>;

    async fn get_user_ids_by_tag_id(&self, tag_id: &str) -> Result<Vec<String>, Self::Error>;

    async fn count_users_by_tag_id(&self, tag_id: &str) -> Result<i64, Self::Error>;

    /// Adds users to a tag, ignoring those who are members already. Returns the number of users added.
    async fn add_users_to_tag(&self, tag_id: &str, user_ids: &[String]) -> Result<u64, Self::Error>;
}
