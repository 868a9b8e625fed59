//! Timestamp rendering for the three wire formats.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::error::SerializationError;
use crate::schema::TimestampFormat;

const HTTP_DATE: &[time::format_description::BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Seconds since the Unix epoch, with sub-second precision.
pub fn epoch_seconds(value: OffsetDateTime) -> f64 {
    value.unix_timestamp_nanos() as f64 / 1_000_000_000.0
}

/// # Errors
///
/// Fails for non-finite or out-of-range values.
pub fn from_epoch_seconds(seconds: f64) -> Result<OffsetDateTime, SerializationError> {
    if !seconds.is_finite() {
        return Err(invalid(seconds.to_string(), "epoch seconds must be finite"));
    }
    let nanos = (seconds * 1_000_000_000.0).round() as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|error| invalid(seconds.to_string(), &error.to_string()))
}

/// Renders a timestamp as text in `format`.
///
/// # Errors
///
/// Fails when the timestamp cannot be represented in the format.
pub fn format_timestamp(
    value: OffsetDateTime,
    format: TimestampFormat,
) -> Result<String, SerializationError> {
    let utc = value.to_offset(UtcOffset::UTC);
    match format {
        TimestampFormat::DateTime => utc
            .format(&Rfc3339)
            .map_err(|error| invalid(utc.to_string(), &error.to_string())),
        TimestampFormat::HttpDate => utc
            .format(HTTP_DATE)
            .map_err(|error| invalid(utc.to_string(), &error.to_string())),
        TimestampFormat::EpochSeconds => {
            if utc.nanosecond() == 0 {
                Ok(utc.unix_timestamp().to_string())
            } else {
                Ok(format!("{:.3}", epoch_seconds(utc)))
            }
        }
    }
}

/// Parses text produced by [`format_timestamp`].
///
/// # Errors
///
/// Fails when `value` is not a valid timestamp in `format`.
pub fn parse_timestamp(
    value: &str,
    format: TimestampFormat,
) -> Result<OffsetDateTime, SerializationError> {
    match format {
        TimestampFormat::DateTime => OffsetDateTime::parse(value, &Rfc3339)
            .map_err(|error| invalid(value.to_owned(), &error.to_string())),
        TimestampFormat::HttpDate => PrimitiveDateTime::parse(value, HTTP_DATE)
            .map(PrimitiveDateTime::assume_utc)
            .map_err(|error| invalid(value.to_owned(), &error.to_string())),
        TimestampFormat::EpochSeconds => {
            let seconds: f64 = value
                .trim()
                .parse()
                .map_err(|_| invalid(value.to_owned(), "expected a number of seconds"))?;
            from_epoch_seconds(seconds)
        }
    }
}

fn invalid(value: String, reason: &str) -> SerializationError {
    SerializationError::InvalidTimestamp {
        value,
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn http_dates_use_gmt() {
        let value = datetime!(2014-04-29 18:30:38 UTC);
        let rendered = format_timestamp(value, TimestampFormat::HttpDate).expect("format");

        assert_eq!(rendered, "Tue, 29 Apr 2014 18:30:38 GMT");
        assert_eq!(
            parse_timestamp(&rendered, TimestampFormat::HttpDate).expect("parse"),
            value
        );
    }

    #[test]
    fn epoch_seconds_keep_millisecond_fractions() {
        let value = datetime!(2020-01-01 00:00:00.5 UTC);
        let rendered = format_timestamp(value, TimestampFormat::EpochSeconds).expect("format");

        assert_eq!(rendered, "1577836800.500");
        assert_eq!(
            parse_timestamp(&rendered, TimestampFormat::EpochSeconds).expect("parse"),
            value
        );
    }

    #[test]
    fn date_times_are_normalized_to_utc() {
        let value = datetime!(2020-01-01 02:00:00 +02:00);
        assert_eq!(
            format_timestamp(value, TimestampFormat::DateTime).expect("format"),
            "2020-01-01T00:00:00Z"
        );
    }

    #[test]
    fn non_finite_epoch_seconds_are_rejected() {
        assert!(from_epoch_seconds(f64::NAN).is_err());
    }
}
