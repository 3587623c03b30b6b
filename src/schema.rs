diesel::table! {
    raw_measurements (id) {
        id -> Integer,
        timestamp -> BigInt,
        node_id -> Integer,
        weight_g -> Double,
        rainfall_in -> Double,
        temperature_f -> Double,
        humidity_pct -> Double,
        zero_factor -> Integer,
    }
}

diesel::table! {
    hourly_aggregates (hour_start, node_id) {
        hour_start -> BigInt,
        node_id -> Integer,
        total_rainfall_in -> Double,
        avg_temperature_f -> Double,
        avg_humidity_pct -> Double,
        measurement_count -> BigInt,
    }
}

diesel::table! {
    daily_aggregates (day_start, node_id) {
        day_start -> BigInt,
        node_id -> Integer,
        total_rainfall_in -> Double,
        avg_temperature_f -> Double,
        avg_humidity_pct -> Double,
        measurement_count -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    raw_measurements,
    hourly_aggregates,
    daily_aggregates,
);
