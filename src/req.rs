use crate::utils;

/// Wire envelope for every API response: `{"status":"success","data":...}`
/// or `{"status":"error","message":...}`. Range queries echo the resolved
/// window as `timeRange`.
#[derive(Debug, serde::Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    Success {
        data: T,
        #[serde(rename = "timeRange", skip_serializing_if = "Option::is_none")]
        time_range: Option<TimeRange>,
    },
    Error {
        message: String,
    },
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::Success {
            data,
            time_range: None,
        }
    }

    pub fn success_in_range(data: T, time_range: TimeRange) -> Self {
        Self::Success {
            data,
            time_range: Some(time_range),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl TimeRange {
    pub fn new(from: i64, to: i64) -> Self {
        Self {
            start: utils::format_instant(from),
            end: utils::format_instant(to),
        }
    }
}
