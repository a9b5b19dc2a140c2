//! Postgres 仓储（PgPromotionStore）
//!
//! 表结构见 `migrations/0001_promotions.sql`。`mark_sent` 仅在 `sent = FALSE` 时更新，
//! 重复标记视为成功。
//!
use super::{PromotionRepository, RecipientDirectory};
use crate::error::{DomainError, DomainResult as Result};
use crate::model::{Promotion, Restaurant};
use crate::value_object::{EmailAddress, PromotionId, RestaurantId};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::warn;

const PROMOTION_COLUMNS: &str = "id, restaurant_id, name, description, content, promotion_type, \
     available, start_date, end_date, sent, created_by, created_at, edited_by, edited_at";

#[derive(Clone)]
pub struct PgPromotionStore {
    pool: PgPool,
}

impl PgPromotionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn promotion_from_row(row: &PgRow) -> Result<Promotion> {
    Ok(Promotion::builder()
        .id(PromotionId::new(row.try_get("id")?))
        .restaurant_id(RestaurantId::new(row.try_get("restaurant_id")?))
        .name(row.try_get::<String, _>("name")?)
        .description(row.try_get::<String, _>("description")?)
        .content(row.try_get::<String, _>("content")?)
        .promotion_type(row.try_get::<String, _>("promotion_type")?)
        .available(row.try_get("available")?)
        .start_date(row.try_get("start_date")?)
        .end_date(row.try_get("end_date")?)
        .sent(row.try_get("sent")?)
        .maybe_created_by(row.try_get::<Option<String>, _>("created_by")?)
        .maybe_created_at(row.try_get("created_at")?)
        .maybe_edited_by(row.try_get::<Option<String>, _>("edited_by")?)
        .maybe_edited_at(row.try_get("edited_at")?)
        .build())
}

fn restaurant_from_row(row: &PgRow) -> Result<Restaurant> {
    Ok(Restaurant::builder()
        .id(RestaurantId::new(row.try_get("id")?))
        .name(row.try_get::<String, _>("name")?)
        .maybe_address(row.try_get::<Option<String>, _>("address")?)
        .maybe_phone(row.try_get::<Option<String>, _>("phone")?)
        .maybe_email(row.try_get::<Option<String>, _>("email")?)
        .maybe_website(row.try_get::<Option<String>, _>("website")?)
        .build())
}

#[async_trait]
impl PromotionRepository for PgPromotionStore {
    async fn fetch_pending(&self) -> Result<Vec<Promotion>> {
        let sql = format!("SELECT {PROMOTION_COLUMNS} FROM promotions WHERE sent = FALSE ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(promotion_from_row).collect()
    }

    async fn fetch_by_id(&self, id: PromotionId) -> Result<Option<Promotion>> {
        let sql = format!("SELECT {PROMOTION_COLUMNS} FROM promotions WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(promotion_from_row).transpose()
    }

    async fn fetch_restaurant(&self, id: RestaurantId) -> Result<Option<Restaurant>> {
        let row = sqlx::query(
            "SELECT id, name, address, phone, email, website FROM restaurants WHERE id = $1",
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(restaurant_from_row).transpose()
    }

    async fn mark_sent(&self, id: PromotionId) -> Result<()> {
        let updated = sqlx::query("UPDATE promotions SET sent = TRUE WHERE id = $1 AND sent = FALSE")
            .bind(id.value())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated > 0 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM promotions WHERE id = $1)")
            .bind(id.value())
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(DomainError::not_found(format!("promotion {id}")))
        }
    }
}

#[async_trait]
impl RecipientDirectory for PgPromotionStore {
    async fn subscribed_recipients(&self, restaurant: RestaurantId) -> Result<Vec<EmailAddress>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT email FROM promotion_subscriptions WHERE restaurant_id = $1 ORDER BY email",
        )
        .bind(restaurant.value())
        .fetch_all(&self.pool)
        .await?;

        // 历史数据里的脏地址跳过而不是让整批失败
        Ok(rows
            .into_iter()
            .filter_map(|raw| match EmailAddress::parse(raw.as_str()) {
                Ok(address) => Some(address),
                Err(err) => {
                    warn!(restaurant_id = %restaurant, error = %err, "skipping invalid subscriber address");
                    None
                }
            })
            .collect())
    }
}
