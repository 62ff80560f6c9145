//! Catalog reads, plus the upserts used to seed a catalog. Catalog administration happens elsewhere; the upserts exist
//! for fixtures and for importing snapshots.
use chrono::{DateTime, Utc};
use gb_common::helpers::{parse_boolean_flag, parse_percentage};
use log::trace;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use super::{from_millis, parse_column, to_millis};
use crate::db_types::{
    Activity,
    ActivityGoods,
    Discount,
    FlowSwitches,
    Money,
    Sku,
    CUT_PERCENTAGE_KEY,
    DOWNGRADE_SWITCH_KEY,
};

impl FromRow<'_, SqliteRow> for Activity {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            discount_id: row.try_get("discount_id")?,
            tag_id: row.try_get("tag_id")?,
            tag_scope: parse_column(row, "tag_scope")?,
            group_type: parse_column(row, "group_type")?,
            target_count: row.try_get("target_count")?,
            valid_seconds: row.try_get("valid_seconds")?,
            participation_limit: row.try_get("participation_limit")?,
            status: parse_column(row, "status")?,
            start_time: from_millis(row.try_get("start_time")?)?,
            end_time: from_millis(row.try_get("end_time")?)?,
        })
    }
}

impl FromRow<'_, SqliteRow> for ActivityGoods {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            activity_id: row.try_get("activity_id")?,
            goods_id: row.try_get("goods_id")?,
            source: row.try_get("source")?,
            channel: row.try_get("channel")?,
            discount_id: row.try_get("discount_id")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for Discount {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            discount_type: parse_column(row, "discount_type")?,
            market_plan: parse_column(row, "market_plan")?,
            market_expr: row.try_get("market_expr")?,
            tag_id: row.try_get("tag_id")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for Sku {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            goods_id: row.try_get("goods_id")?,
            goods_name: row.try_get("goods_name")?,
            original_price: Money::from(row.try_get::<i64, _>("original_price")?),
        })
    }
}

pub async fn fetch_activity(activity_id: i64, conn: &mut SqliteConnection) -> Result<Option<Activity>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM activities WHERE id = $1").bind(activity_id).fetch_optional(conn).await
}

pub async fn fetch_activity_goods(
    goods_id: &str,
    source: &str,
    channel: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ActivityGoods>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM activity_goods WHERE goods_id = $1 AND source = $2 AND channel = $3")
        .bind(goods_id)
        .bind(source)
        .bind(channel)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_discount(discount_id: i64, conn: &mut SqliteConnection) -> Result<Option<Discount>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM discounts WHERE id = $1").bind(discount_id).fetch_optional(conn).await
}

pub async fn fetch_sku(goods_id: &str, conn: &mut SqliteConnection) -> Result<Option<Sku>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM skus WHERE goods_id = $1").bind(goods_id).fetch_optional(conn).await
}

pub async fn fetch_flow_switches(conn: &mut SqliteConnection) -> Result<FlowSwitches, sqlx::Error> {
    let rows: Vec<(String, String, i64)> = sqlx::query_as(
        "SELECT config_key, config_value, version FROM dynamic_config WHERE config_key IN ($1, $2)",
    )
    .bind(DOWNGRADE_SWITCH_KEY)
    .bind(CUT_PERCENTAGE_KEY)
    .fetch_all(conn)
    .await?;
    let mut switches = FlowSwitches::default();
    for (key, value, version) in rows {
        switches.version = switches.version.max(version);
        match key.as_str() {
            DOWNGRADE_SWITCH_KEY => switches.downgraded = parse_boolean_flag(Some(value), false),
            CUT_PERCENTAGE_KEY => switches.cut_percentage = parse_percentage(Some(&value), 100),
            _ => {},
        }
    }
    trace!("🗃️ Flow switches at version {}: {switches:?}", switches.version);
    Ok(switches)
}

pub async fn upsert_activity(activity: &Activity, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO activities (
                id, name, discount_id, tag_id, tag_scope, group_type, target_count, valid_seconds,
                participation_limit, status, start_time, end_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                discount_id = excluded.discount_id,
                tag_id = excluded.tag_id,
                tag_scope = excluded.tag_scope,
                group_type = excluded.group_type,
                target_count = excluded.target_count,
                valid_seconds = excluded.valid_seconds,
                participation_limit = excluded.participation_limit,
                status = excluded.status,
                start_time = excluded.start_time,
                end_time = excluded.end_time
        "#,
    )
    .bind(activity.id)
    .bind(&activity.name)
    .bind(activity.discount_id)
    .bind(&activity.tag_id)
    .bind(activity.tag_scope.code())
    .bind(activity.group_type.code())
    .bind(activity.target_count)
    .bind(activity.valid_seconds)
    .bind(activity.participation_limit)
    .bind(activity.status.code())
    .bind(to_millis(activity.start_time))
    .bind(to_millis(activity.end_time))
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn upsert_activity_goods(goods: &ActivityGoods, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO activity_goods (activity_id, goods_id, source, channel, discount_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT(goods_id, source, channel) DO UPDATE SET
                activity_id = excluded.activity_id,
                discount_id = excluded.discount_id
        "#,
    )
    .bind(goods.activity_id)
    .bind(&goods.goods_id)
    .bind(&goods.source)
    .bind(&goods.channel)
    .bind(goods.discount_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn upsert_discount(discount: &Discount, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO discounts (id, name, discount_type, market_plan, market_expr, tag_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                discount_type = excluded.discount_type,
                market_plan = excluded.market_plan,
                market_expr = excluded.market_expr,
                tag_id = excluded.tag_id
        "#,
    )
    .bind(discount.id)
    .bind(&discount.name)
    .bind(discount.discount_type.code())
    .bind(discount.market_plan.code())
    .bind(&discount.market_expr)
    .bind(&discount.tag_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn upsert_sku(sku: &Sku, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO skus (goods_id, goods_name, original_price) VALUES ($1, $2, $3)
            ON CONFLICT(goods_id) DO UPDATE SET goods_name = excluded.goods_name, original_price = excluded.original_price
        "#,
    )
    .bind(&sku.goods_id)
    .bind(&sku.goods_name)
    .bind(sku.original_price.value())
    .execute(conn)
    .await?;
    Ok(())
}

/// Sets a dynamic config value, bumping its version.
pub async fn set_config(
    key: &str,
    value: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
            INSERT INTO dynamic_config (config_key, config_value, version, updated_at) VALUES ($1, $2, 1, $3)
            ON CONFLICT(config_key) DO UPDATE SET
                config_value = excluded.config_value,
                version = dynamic_config.version + 1,
                updated_at = excluded.updated_at
            RETURNING version;
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(to_millis(now))
    .fetch_one(conn)
    .await
}
