use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::to_millis;

pub async fn is_member(tag_id: &str, user_id: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM crowd_tags WHERE tag_id = $1 AND user_id = $2)")
        .bind(tag_id)
        .bind(user_id)
        .fetch_one(conn)
        .await
}

pub async fn batch_check(
    tag_id: &str,
    user_ids: &[String],
    conn: &mut SqliteConnection,
) -> Result<HashMap<String, bool>, sqlx::Error> {
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT user_id FROM crowd_tags WHERE tag_id = ");
    builder.push_bind(tag_id);
    builder.push(" AND user_id IN (");
    let mut ids = builder.separated(", ");
    for user_id in user_ids {
        ids.push_bind(user_id.as_str());
    }
    ids.push_unseparated(")");
    trace!("🗃️ Executing query: {}", builder.sql());
    let members: HashSet<String> = builder.build_query_scalar::<String>().fetch_all(conn).await?.into_iter().collect();
    let result = user_ids.iter().map(|u| (u.clone(), members.contains(u))).collect();
    Ok(result)
}

pub async fn user_ids_for_tag(tag_id: &str, conn: &mut SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT user_id FROM crowd_tags WHERE tag_id = $1 ORDER BY user_id")
        .bind(tag_id)
        .fetch_all(conn)
        .await
}

pub async fn count_for_tag(tag_id: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM crowd_tags WHERE tag_id = $1").bind(tag_id).fetch_one(conn).await
}

pub async fn add_users(
    tag_id: &str,
    user_ids: &[String],
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    if user_ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("INSERT INTO crowd_tags (tag_id, user_id, created_at) ");
    builder.push_values(user_ids, |mut row, user_id| {
        row.push_bind(tag_id).push_bind(user_id.as_str()).push_bind(to_millis(now));
    });
    builder.push(" ON CONFLICT(tag_id, user_id) DO NOTHING");
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}
