use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::ReadingStore;
use crate::{
    db::models::{GroupedRow, NewReading, Reading},
    error::StoreError,
    query::bucket::BucketKey,
};

/// Column list shared by every query that returns whole readings.
/// `NUMERIC` channels are cast so they decode as `f64`.
const READING_COLUMNS: &str = r#"
    id,
    device_id,
    recorded_at AS "timestamp",
    current_in::float8         AS current_in,
    current_out::float8        AS current_out,
    voltage_in::float8         AS voltage_in,
    voltage_out::float8        AS voltage_out,
    temperature::float8        AS temperature,
    battery_percentage::float8 AS battery_percentage,
    created_at
"#;

/// [`ReadingStore`] over the `sensor_data` table.
#[derive(Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// SQL form of [`BucketKey::floor`], evaluated in UTC and returned as
/// `timestamptz`. Raw groups by the timestamp itself.
fn bucket_expr(key: BucketKey) -> &'static str {
    match key {
        BucketKey::Raw => "recorded_at",
        BucketKey::TwoHour => {
            "(date_trunc('day', recorded_at AT TIME ZONE 'UTC') \
             + make_interval(hours => (floor(extract(hour FROM recorded_at AT TIME ZONE 'UTC') / 2) * 2)::int)) \
             AT TIME ZONE 'UTC'"
        }
        BucketKey::Day => "date_trunc('day', recorded_at AT TIME ZONE 'UTC') AT TIME ZONE 'UTC'",
        BucketKey::ThreeDay => {
            "(date_trunc('day', recorded_at AT TIME ZONE 'UTC') \
             - make_interval(days => (extract(doy FROM recorded_at AT TIME ZONE 'UTC')::int - 1) % 3)) \
             AT TIME ZONE 'UTC'"
        }
        BucketKey::IsoWeek => "date_trunc('week', recorded_at AT TIME ZONE 'UTC') AT TIME ZONE 'UTC'",
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn insert(&self, reading: NewReading) -> Result<Reading, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO sensor_data
                (device_id, recorded_at, current_in, current_out,
                 voltage_in, voltage_out, temperature, battery_percentage)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {READING_COLUMNS}
            "#
        );
        let c = reading.channels;
        let row = sqlx::query_as::<_, Reading>(&sql)
            .bind(&reading.device_id)
            .bind(reading.timestamp)
            .bind(c.current_in)
            .bind(c.current_out)
            .bind(c.voltage_in)
            .bind(c.voltage_out)
            .bind(c.temperature)
            .bind(c.battery_percentage)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn scan_range(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StoreError> {
        let sql = format!(
            r#"
            SELECT {READING_COLUMNS}
            FROM sensor_data
            WHERE device_id = $1
              AND recorded_at >= $2
              AND recorded_at <= $3
            ORDER BY recorded_at ASC
            "#
        );
        let rows = sqlx::query_as::<_, Reading>(&sql)
            .bind(device_id)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn scan_range_grouped(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        key: BucketKey,
    ) -> Result<Vec<GroupedRow>, StoreError> {
        let expr = bucket_expr(key);
        let sql = format!(
            r#"
            SELECT {expr}                         AS bucket_start,
                   COUNT(*)                       AS samples,
                   AVG(current_in)::float8        AS current_in,
                   AVG(current_out)::float8       AS current_out,
                   AVG(voltage_in)::float8        AS voltage_in,
                   AVG(voltage_out)::float8       AS voltage_out,
                   AVG(temperature)::float8       AS temperature,
                   AVG(battery_percentage)::float8 AS battery_percentage
            FROM sensor_data
            WHERE device_id = $1
              AND recorded_at >= $2
              AND recorded_at <= $3
            GROUP BY 1
            ORDER BY 1 ASC
            "#
        );
        let rows = sqlx::query_as::<_, GroupedRow>(&sql)
            .bind(device_id)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn min_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let min: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MIN(recorded_at) FROM sensor_data")
                .fetch_one(&self.pool)
                .await?;
        Ok(min)
    }

    async fn latest_row(
        &self,
        device_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<Reading>, StoreError> {
        let sql = format!(
            r#"
            SELECT {READING_COLUMNS}
            FROM sensor_data
            WHERE device_id = $1
              AND ($2::timestamptz IS NULL OR recorded_at >= $2)
            ORDER BY recorded_at DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, Reading>(&sql)
            .bind(device_id)
            .bind(since)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count_since(&self, since: Option<DateTime<Utc>>) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sensor_data \
             WHERE ($1::timestamptz IS NULL OR recorded_at >= $1)",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn scan_page(
        &self,
        device_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Reading>, i64), StoreError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sensor_data
            WHERE device_id = $1
              AND ($2::timestamptz IS NULL OR recorded_at >= $2)
              AND ($3::timestamptz IS NULL OR recorded_at <= $3)
            "#,
        )
        .bind(device_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"
            SELECT {READING_COLUMNS}
            FROM sensor_data
            WHERE device_id = $1
              AND ($2::timestamptz IS NULL OR recorded_at >= $2)
              AND ($3::timestamptz IS NULL OR recorded_at <= $3)
            ORDER BY recorded_at DESC
            OFFSET $4
            LIMIT $5
            "#
        );
        let rows = sqlx::query_as::<_, Reading>(&sql)
            .bind(device_id)
            .bind(start)
            .bind(end)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok((rows, total))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests (need a live database: DATABASE_URL=... cargo test -- --ignored)
// ---------------------------------------------------------------------------
