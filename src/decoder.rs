//! Decoder for raw node payloads.
//!
//! A reading arrives as a single comma-separated line in fixed order:
//! `WEIGHT_G,RAINFALL_IN,TEMPERATURE_F,HUMIDITY_PCT,ZERO_FACTOR`.
//! Decoding is all-or-nothing: one bad field rejects the whole reading,
//! and nothing is persisted here.

use chrono::Utc;

use crate::db::NewMeasurement;
use crate::error::DecodeError;

/// Single-node deployments report as node 1.
pub const DEFAULT_NODE_ID: i32 = 1;

const FIELD_COUNT: usize = 5;

// Inclusive valid envelopes per field.
const WEIGHT_G_RANGE: (f64, f64) = (-2000.0, 2000.0);
const RAINFALL_IN_RANGE: (f64, f64) = (0.0, 15.0);
const TEMPERATURE_F_RANGE: (f64, f64) = (-20.0, 140.0);
const HUMIDITY_PCT_RANGE: (f64, f64) = (0.0, 100.0);
const ZERO_FACTOR_RANGE: (f64, f64) = (7000.0, 10_000.0);

#[derive(Debug, Clone, Copy)]
pub struct PayloadDecoder {
    node_id: i32,
}

impl Default for PayloadDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadDecoder {
    pub fn new() -> Self {
        Self {
            node_id: DEFAULT_NODE_ID,
        }
    }

    /// Decoder stamping measurements with an explicit node id, for
    /// transports that track more than one node.
    #[allow(unused)]
    pub fn for_node(node_id: i32) -> Self {
        Self { node_id }
    }

    /// Decode a payload, timestamping it with the current instant.
    pub fn decode(&self, raw: &str) -> Result<NewMeasurement, DecodeError> {
        self.decode_at(raw, Utc::now().timestamp())
    }

    /// Decode a payload with an injected instant. Deterministic for a
    /// given input and timestamp.
    pub fn decode_at(&self, raw: &str, timestamp: i64) -> Result<NewMeasurement, DecodeError> {
        let parts: Vec<&str> = raw.trim().split(',').collect();
        if parts.len() != FIELD_COUNT {
            return Err(DecodeError::MalformedPayload(format!(
                "expected {} fields, got {}",
                FIELD_COUNT,
                parts.len()
            )));
        }

        let weight = parse_float(parts[0], "weight_g")?;
        let rainfall = parse_float(parts[1], "rainfall_in")?;
        let temperature = parse_float(parts[2], "temperature_f")?;
        let humidity = parse_float(parts[3], "humidity_pct")?;
        let zero_factor = parse_int(parts[4], "zero_factor")?;

        check_range("weight_g", weight, WEIGHT_G_RANGE)?;
        check_range("rainfall_in", rainfall, RAINFALL_IN_RANGE)?;
        check_range("temperature_f", temperature, TEMPERATURE_F_RANGE)?;
        check_range("humidity_pct", humidity, HUMIDITY_PCT_RANGE)?;
        check_range("zero_factor", zero_factor as f64, ZERO_FACTOR_RANGE)?;

        Ok(NewMeasurement {
            timestamp,
            node_id: self.node_id,
            weight_g: round_to(weight, 3),
            rainfall_in: round_to(rainfall, 4),
            temperature_f: round_to(temperature, 1),
            humidity_pct: round_to(humidity, 1),
            zero_factor,
        })
    }
}

fn parse_float(token: &str, field: &'static str) -> Result<f64, DecodeError> {
    token
        .trim()
        .parse()
        .map_err(|_| DecodeError::MalformedPayload(format!("unparseable {field}: {token:?}")))
}

fn parse_int(token: &str, field: &'static str) -> Result<i32, DecodeError> {
    token
        .trim()
        .parse()
        .map_err(|_| DecodeError::MalformedPayload(format!("unparseable {field}: {token:?}")))
}

fn check_range(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<(), DecodeError> {
    // RangeInclusive::contains also rejects NaN.
    if !(min..=max).contains(&value) {
        return Err(DecodeError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}
