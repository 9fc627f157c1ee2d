//! Shared error mapping and column codecs for the sqlx persistence layer

use application::error::ApplicationError;
use chrono::{DateTime, SecondsFormat, Utc};

/// Map a sqlx error to an application-layer error
pub fn map_sqlx_error(e: sqlx::Error) -> ApplicationError {
    match e {
        sqlx::Error::RowNotFound => {
            ApplicationError::NotFound("Database record not found".to_string())
        },
        sqlx::Error::Database(db_err) => {
            ApplicationError::Storage(format!("Database error: {db_err}"))
        },
        other => ApplicationError::Storage(format!("Database error: {other}")),
    }
}

/// A stored value that no longer decodes
pub(crate) fn corrupt(column: &str, detail: impl std::fmt::Display) -> ApplicationError {
    ApplicationError::Internal(format!("Invalid stored {column}: {detail}"))
}

/// Fixed-width RFC 3339 so that text comparison orders chronologically
pub(crate) fn format_datetime(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, ApplicationError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt("datetime", e))
}

pub(crate) fn parse_optional_datetime(
    s: Option<&str>,
) -> Result<Option<DateTime<Utc>>, ApplicationError> {
    s.map(parse_datetime).transpose()
}

pub(crate) fn parse_json(column: &str, s: &str) -> Result<serde_json::Value, ApplicationError> {
    serde_json::from_str(s).map_err(|e| corrupt(column, e))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn datetime_round_trip_is_exact() {
        let now = Utc::now();
        assert_eq!(parse_datetime(&format_datetime(now)).unwrap(), now);
    }

    #[test]
    fn formatted_datetimes_sort_chronologically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let b = a + chrono::Duration::nanoseconds(1_500);
        let c = a + chrono::Duration::seconds(1);
        let mut texts = vec![format_datetime(c), format_datetime(a), format_datetime(b)];
        texts.sort();
        assert_eq!(
            texts,
            vec![format_datetime(a), format_datetime(b), format_datetime(c)]
        );
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            ApplicationError::NotFound(_)
        ));
    }

    #[test]
    fn pool_errors_map_to_storage() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            ApplicationError::Storage(_)
        ));
    }
}
