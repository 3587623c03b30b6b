use anyhow::Result;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use dotenvy::dotenv;
use log::warn;
use std::env;

use crate::error::{RollupError, StoreError};
use crate::rollup;
use crate::schema::*;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS raw_measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp BIGINT NOT NULL,
    node_id INTEGER NOT NULL,
    weight_g DOUBLE NOT NULL,
    rainfall_in DOUBLE NOT NULL,
    temperature_f DOUBLE NOT NULL,
    humidity_pct DOUBLE NOT NULL,
    zero_factor INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS hourly_aggregates (
    hour_start BIGINT NOT NULL,
    node_id INTEGER NOT NULL,
    total_rainfall_in DOUBLE NOT NULL,
    avg_temperature_f DOUBLE NOT NULL,
    avg_humidity_pct DOUBLE NOT NULL,
    measurement_count BIGINT NOT NULL,
    PRIMARY KEY (hour_start, node_id)
);

CREATE TABLE IF NOT EXISTS daily_aggregates (
    day_start BIGINT NOT NULL,
    node_id INTEGER NOT NULL,
    total_rainfall_in DOUBLE NOT NULL,
    avg_temperature_f DOUBLE NOT NULL,
    avg_humidity_pct DOUBLE NOT NULL,
    measurement_count BIGINT NOT NULL,
    PRIMARY KEY (day_start, node_id)
);
";

/// A validated reading ready for insertion. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = raw_measurements)]
pub struct NewMeasurement {
    pub timestamp: i64, // s since epoch, UTC
    pub node_id: i32,
    pub weight_g: f64,
    pub rainfall_in: f64,
    pub temperature_f: f64,
    pub humidity_pct: f64,
    pub zero_factor: i32,
}

/// A persisted reading. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Queryable, serde::Serialize)]
pub struct Measurement {
    pub id: i32,
    pub timestamp: i64, // s since epoch, UTC
    pub node_id: i32,
    pub weight_g: f64,
    pub rainfall_in: f64,
    pub temperature_f: f64,
    pub humidity_pct: f64,
    pub zero_factor: i32,
}

#[derive(Debug, Clone, PartialEq, Queryable, Insertable, serde::Serialize)]
#[diesel(table_name = hourly_aggregates)]
pub struct HourlyAggregate {
    pub hour_start: i64, // s since epoch, floored to the UTC hour
    pub node_id: i32,
    pub total_rainfall_in: f64,
    pub avg_temperature_f: f64,
    pub avg_humidity_pct: f64,
    pub measurement_count: i64,
}

#[derive(Debug, Clone, PartialEq, Queryable, Insertable, serde::Serialize)]
#[diesel(table_name = daily_aggregates)]
pub struct DailyAggregate {
    pub day_start: i64, // s since epoch, floored to the UTC day
    pub node_id: i32,
    pub total_rainfall_in: f64,
    pub avg_temperature_f: f64,
    pub avg_humidity_pct: f64,
    pub measurement_count: i64,
}

pub struct Db {
    conn: SqliteConnection,
}

impl Db {
    pub fn connect() -> Result<Self> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "raingauge.db".to_string());
        Self::open(&database_url)
    }

    pub fn open(database_url: &str) -> Result<Self> {
        let mut conn = SqliteConnection::establish(database_url)?;
        conn.batch_execute(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Append a validated measurement, then synchronously refresh the
    /// hourly and daily buckets it lands in.
    ///
    /// A failed append is `Unavailable` and persists nothing. A failed
    /// refresh after a durable append is `PartialWrite`: the raw row is
    /// kept and the buckets stay stale until the next refresh.
    pub fn insert_measurement(&mut self, new: &NewMeasurement) -> Result<Measurement, StoreError> {
        let stored: Measurement = self.conn.transaction(|conn| {
            use crate::schema::raw_measurements::dsl::*;
            diesel::insert_into(raw_measurements)
                .values(new)
                .execute(conn)?;
            raw_measurements.order(id.desc()).first(conn)
        })?;

        if let Err(e) = self.refresh_aggregates(stored.timestamp, stored.node_id) {
            warn!(
                "aggregate refresh failed for node {} at {}: {}",
                stored.node_id, stored.timestamp, e
            );
            return Err(StoreError::PartialWrite(e));
        }

        Ok(stored)
    }

    /// Recompute the hourly and daily buckets enclosing `timestamp` from
    /// the raw log. Idempotent; the repair path after a `PartialWrite`.
    pub fn refresh_aggregates(&mut self, timestamp: i64, node: i32) -> Result<(), RollupError> {
        rollup::refresh(&mut self.conn, timestamp, node)
    }

    /// Raw readings for a node in `[from, to)`, oldest first.
    pub fn raw_in_range(
        &mut self,
        node: i32,
        from: i64,
        to: i64,
    ) -> Result<Vec<Measurement>, StoreError> {
        use crate::schema::raw_measurements::dsl::*;
        let rows = raw_measurements
            .filter(node_id.eq(node))
            .filter(timestamp.ge(from))
            .filter(timestamp.lt(to))
            .order(timestamp.asc())
            .load(&mut self.conn)?;
        Ok(rows)
    }

    /// Hourly aggregates for a node with `from <= hour_start < to`,
    /// ascending. An empty or inverted range yields an empty Vec.
    pub fn hourly_in_range(
        &mut self,
        node: i32,
        from: i64,
        to: i64,
    ) -> Result<Vec<HourlyAggregate>, StoreError> {
        use crate::schema::hourly_aggregates::dsl::*;
        let rows = hourly_aggregates
            .filter(node_id.eq(node))
            .filter(hour_start.ge(from))
            .filter(hour_start.lt(to))
            .order(hour_start.asc())
            .load(&mut self.conn)?;
        Ok(rows)
    }

    /// Daily aggregates for a node with `from <= day_start < to`, ascending.
    pub fn daily_in_range(
        &mut self,
        node: i32,
        from: i64,
        to: i64,
    ) -> Result<Vec<DailyAggregate>, StoreError> {
        use crate::schema::daily_aggregates::dsl::*;
        let rows = daily_aggregates
            .filter(node_id.eq(node))
            .filter(day_start.ge(from))
            .filter(day_start.lt(to))
            .order(day_start.asc())
            .load(&mut self.conn)?;
        Ok(rows)
    }

    /// The most recent reading for a node, if any.
    pub fn latest_measurement(&mut self, node: i32) -> Result<Option<Measurement>, StoreError> {
        use crate::schema::raw_measurements::dsl::*;
        let row = raw_measurements
            .filter(node_id.eq(node))
            .order((timestamp.desc(), id.desc()))
            .first(&mut self.conn)
            .optional()?;
        Ok(row)
    }

    #[cfg(test)]
    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}
