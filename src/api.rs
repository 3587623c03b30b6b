use std::sync::{Arc, Mutex};

use actix_cors::Cors;
use actix_web::{
    get,
    http::header,
    post,
    web::{self, Data},
    App, HttpResponse, HttpServer, Responder,
};
use log::warn;

use crate::db::{DailyAggregate, Db, HourlyAggregate, Measurement};
use crate::decoder::{PayloadDecoder, DEFAULT_NODE_ID};
use crate::error::StoreError;
use crate::req::{ApiResponse, TimeRange};
use crate::utils;

// Default lookback windows applied when the caller supplies no range.
// Policy of this boundary layer; the store honors any explicit range.
const HOURLY_LOOKBACK_SECS: i64 = 24 * utils::HOUR_SECS;
const DAILY_LOOKBACK_SECS: i64 = 7 * utils::DAY_SECS;

#[derive(serde::Deserialize, Debug)]
struct RangeQuery {
    node_id: Option<i32>,
    start: Option<String>,
    end: Option<String>,
}

#[derive(serde::Deserialize, Debug)]
struct NodeQuery {
    node_id: Option<i32>,
}

/// Resolve an optional `[start, end]` pair against a default lookback
/// ending at `now`. `end` without `start` is ignored, matching the
/// lookback default.
fn resolve_range(query: &RangeQuery, lookback_secs: i64, now: i64) -> Result<(i64, i64), String> {
    match &query.start {
        Some(start) => {
            let from = utils::parse_instant(start)
                .ok_or_else(|| format!("unparseable start instant: {start:?}"))?;
            let to = match &query.end {
                Some(end) => utils::parse_instant(end)
                    .ok_or_else(|| format!("unparseable end instant: {end:?}"))?,
                None => now,
            };
            Ok((from, to))
        }
        None => Ok((now - lookback_secs, now)),
    }
}

#[get("/")]
async fn hello(_db: web::Data<Arc<Mutex<Db>>>) -> impl Responder {
    HttpResponse::Ok().body("raingauge-backend")
}

#[post("/measurements")]
async fn api_add_measurement(body: String, db: web::Data<Arc<Mutex<Db>>>) -> HttpResponse {
    let decoded = match PayloadDecoder::new().decode(&body) {
        Ok(m) => m,
        Err(e) => {
            warn!("rejected payload: {e}");
            return HttpResponse::Ok().json(ApiResponse::<Measurement>::error(e.to_string()));
        }
    };

    match db.lock() {
        Ok(mut db) => match db.insert_measurement(&decoded) {
            Ok(stored) => HttpResponse::Ok().json(ApiResponse::success(stored)),
            // the raw row is durable; report the stale aggregates
            Err(e @ StoreError::PartialWrite(_)) => {
                HttpResponse::Ok().json(ApiResponse::<Measurement>::error(e.to_string()))
            }
            Err(e) => HttpResponse::InternalServerError()
                .json(ApiResponse::<Measurement>::error(e.to_string())),
        },
        Err(_) => HttpResponse::InternalServerError()
            .json(ApiResponse::<Measurement>::error("store lock poisoned")),
    }
}

#[get("/data/hourly")]
async fn api_hourly(
    query: web::Query<RangeQuery>,
    db: web::Data<Arc<Mutex<Db>>>,
) -> HttpResponse {
    let (from, to) = match resolve_range(&query, HOURLY_LOOKBACK_SECS, utils::now_secs()) {
        Ok(range) => range,
        Err(message) => {
            return HttpResponse::BadRequest()
                .json(ApiResponse::<Vec<HourlyAggregate>>::error(message))
        }
    };
    let node = query.node_id.unwrap_or(DEFAULT_NODE_ID);

    match db.lock() {
        Ok(mut db) => match db.hourly_in_range(node, from, to) {
            Ok(rows) => HttpResponse::Ok()
                .json(ApiResponse::success_in_range(rows, TimeRange::new(from, to))),
            Err(e) => HttpResponse::InternalServerError()
                .json(ApiResponse::<Vec<HourlyAggregate>>::error(e.to_string())),
        },
        Err(_) => HttpResponse::InternalServerError()
            .json(ApiResponse::<Vec<HourlyAggregate>>::error("store lock poisoned")),
    }
}

#[get("/data/daily")]
async fn api_daily(query: web::Query<RangeQuery>, db: web::Data<Arc<Mutex<Db>>>) -> HttpResponse {
    let (from, to) = match resolve_range(&query, DAILY_LOOKBACK_SECS, utils::now_secs()) {
        Ok(range) => range,
        Err(message) => {
            return HttpResponse::BadRequest()
                .json(ApiResponse::<Vec<DailyAggregate>>::error(message))
        }
    };
    let node = query.node_id.unwrap_or(DEFAULT_NODE_ID);

    match db.lock() {
        Ok(mut db) => match db.daily_in_range(node, from, to) {
            Ok(rows) => HttpResponse::Ok()
                .json(ApiResponse::success_in_range(rows, TimeRange::new(from, to))),
            Err(e) => HttpResponse::InternalServerError()
                .json(ApiResponse::<Vec<DailyAggregate>>::error(e.to_string())),
        },
        Err(_) => HttpResponse::InternalServerError()
            .json(ApiResponse::<Vec<DailyAggregate>>::error("store lock poisoned")),
    }
}

#[get("/data/raw")]
async fn api_raw(query: web::Query<RangeQuery>, db: web::Data<Arc<Mutex<Db>>>) -> HttpResponse {
    let (from, to) = match resolve_range(&query, HOURLY_LOOKBACK_SECS, utils::now_secs()) {
        Ok(range) => range,
        Err(message) => {
            return HttpResponse::BadRequest()
                .json(ApiResponse::<Vec<Measurement>>::error(message))
        }
    };
    let node = query.node_id.unwrap_or(DEFAULT_NODE_ID);

    match db.lock() {
        Ok(mut db) => match db.raw_in_range(node, from, to) {
            Ok(rows) => HttpResponse::Ok()
                .json(ApiResponse::success_in_range(rows, TimeRange::new(from, to))),
            Err(e) => HttpResponse::InternalServerError()
                .json(ApiResponse::<Vec<Measurement>>::error(e.to_string())),
        },
        Err(_) => HttpResponse::InternalServerError()
            .json(ApiResponse::<Vec<Measurement>>::error("store lock poisoned")),
    }
}

#[get("/data/current")]
async fn api_current(query: web::Query<NodeQuery>, db: web::Data<Arc<Mutex<Db>>>) -> HttpResponse {
    let node = query.node_id.unwrap_or(DEFAULT_NODE_ID);
    match db.lock() {
        Ok(mut db) => match db.latest_measurement(node) {
            Ok(Some(m)) => HttpResponse::Ok().json(ApiResponse::success(m)),
            Ok(None) => {
                HttpResponse::Ok().json(ApiResponse::<Measurement>::error("No data available"))
            }
            Err(e) => HttpResponse::InternalServerError()
                .json(ApiResponse::<Measurement>::error(e.to_string())),
        },
        Err(_) => HttpResponse::InternalServerError()
            .json(ApiResponse::<Measurement>::error("store lock poisoned")),
    }
}

pub async fn new_http_server(db: Arc<Mutex<Db>>, bind: String) -> std::io::Result<()> {
    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(db.clone()))
            .service(hello)
            .service(api_add_measurement)
            .service(api_hourly)
            .service(api_daily)
            .service(api_raw)
            .service(api_current)
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST"])
                    .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
                    .allowed_header(header::CONTENT_TYPE)
                    .max_age(3600),
            )
    })
    .bind(bind)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn query(start: Option<&str>, end: Option<&str>) -> RangeQuery {
        RangeQuery {
            node_id: None,
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }

    #[test]
    fn defaults_to_lookback_ending_now() {
        let range = resolve_range(&query(None, None), HOURLY_LOOKBACK_SECS, NOW).unwrap();
        assert_eq!(range, (NOW - HOURLY_LOOKBACK_SECS, NOW));
    }

    #[test]
    fn honors_explicit_instants() {
        let range = resolve_range(
            &query(Some("1970-01-01T00:00:00Z"), Some("1970-01-01T01:00:00Z")),
            DAILY_LOOKBACK_SECS,
            NOW,
        )
        .unwrap();
        assert_eq!(range, (0, 3600));
    }

    #[test]
    fn open_ended_explicit_start_ends_now() {
        let range = resolve_range(&query(Some("1970-01-01T00:00:00Z"), None), 0, NOW).unwrap();
        assert_eq!(range, (0, NOW));
    }

    #[test]
    fn rejects_unparseable_instants() {
        assert!(resolve_range(&query(Some("yesterday"), None), 0, NOW).is_err());
        assert!(
            resolve_range(&query(Some("1970-01-01T00:00:00Z"), Some("later")), 0, NOW).is_err()
        );
    }
}
