use chrono::{DateTime, Datelike, Timelike, Utc};
use common::Result;
use datafusion::arrow::array::{Array, Int32Array, Int64Array, StringArray, TimestampMillisecondArray};
use datafusion::arrow::datatypes::{DataType, TimeUnit};
use datafusion::common::DataFusionError;
use datafusion::execution::context::SessionContext;
use datafusion::logical_expr::ColumnarValue;
use datafusion::logical_expr::{create_udf, Volatility};
use datafusion::scalar::ScalarValue;
use std::sync::Arc;

// The engine is built without its datetime kernels, so the calendar
// derivations live in these UDFs. All of them interpret instants as UTC.

/// Registers all UDFs with the SessionContext
pub fn register_udfs(ctx: &SessionContext) -> Result<()> {
    // Epoch-milliseconds to timestamp, truncated to whole seconds
    let from_epoch_ms = create_udf(
        "from_epoch_ms",
        vec![DataType::Int64],
        DataType::Timestamp(TimeUnit::Millisecond, None),
        Volatility::Immutable,
        Arc::new(|args| epoch_ms_to_timestamp(args).map_err(|e| DataFusionError::Internal(e.to_string()))),
    );

    // Named calendar part of a UTC timestamp
    let date_part_utc = create_udf(
        "date_part_utc",
        vec![
            DataType::Utf8,
            DataType::Timestamp(TimeUnit::Millisecond, None),
        ],
        DataType::Int32,
        Volatility::Immutable,
        Arc::new(|args| extract_date_part(args).map_err(|e| DataFusionError::Internal(e.to_string()))),
    );

    // Three-letter English day name
    let weekday_abbrev = create_udf(
        "weekday_abbrev",
        vec![DataType::Timestamp(TimeUnit::Millisecond, None)],
        DataType::Utf8,
        Volatility::Immutable,
        Arc::new(|args| format_weekday(args).map_err(|e| DataFusionError::Internal(e.to_string()))),
    );

    // Register all UDFs
    ctx.register_udf(from_epoch_ms);
    ctx.register_udf(date_part_utc);
    ctx.register_udf(weekday_abbrev);

    Ok(())
}

enum DatePart {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl DatePart {
    fn parse(name: &str) -> Option<DatePart> {
        match name {
            "hour" => Some(DatePart::Hour),
            "day" => Some(DatePart::Day),
            "week" => Some(DatePart::Week),
            "month" => Some(DatePart::Month),
            "year" => Some(DatePart::Year),
            _ => None,
        }
    }

    fn extract(&self, dt: &DateTime<Utc>) -> i32 {
        match self {
            DatePart::Hour => dt.hour() as i32,
            DatePart::Day => dt.day() as i32,
            // ISO 8601 week number, 1-53
            DatePart::Week => dt.iso_week().week() as i32,
            DatePart::Month => dt.month() as i32,
            DatePart::Year => dt.year(),
        }
    }
}

/// Converts epoch milliseconds to an Arrow timestamp with the
/// sub-second part dropped
fn epoch_ms_to_timestamp(args: &[ColumnarValue]) -> Result<ColumnarValue> {
    let int_array = match &args[0] {
        ColumnarValue::Array(array) => array
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| DataFusionError::Internal("Expected int64 array".to_string()))?,
        ColumnarValue::Scalar(_) => {
            return Err(DataFusionError::Internal("Scalar inputs not supported".to_string()).into());
        }
    };

    let result: TimestampMillisecondArray = int_array
        .iter()
        .map(|opt_ms| opt_ms.map(|ms| (ms / 1000) * 1000))
        .collect();

    Ok(ColumnarValue::Array(Arc::new(result)))
}

/// Extracts one calendar part (hour, day, week, month, year) from a
/// millisecond timestamp
fn extract_date_part(args: &[ColumnarValue]) -> Result<ColumnarValue> {
    // Call sites pass the part name as a literal, which arrives as a scalar.
    let part_name = match &args[0] {
        ColumnarValue::Scalar(ScalarValue::Utf8(Some(name))) => name.clone(),
        ColumnarValue::Array(array) => {
            let names = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| DataFusionError::Internal("Expected string array".to_string()))?;
            if names.is_empty() || names.is_null(0) {
                return Err(
                    DataFusionError::Internal("Date part name must not be null".to_string()).into(),
                );
            }
            names.value(0).to_string()
        }
        _ => {
            return Err(
                DataFusionError::Internal("Date part name must be a string".to_string()).into(),
            );
        }
    };

    let part = DatePart::parse(&part_name).ok_or_else(|| {
        DataFusionError::Internal(format!("Unsupported date part '{part_name}'"))
    })?;

    let ts_array = match &args[1] {
        ColumnarValue::Array(array) => array
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .ok_or_else(|| {
                DataFusionError::Internal("Expected millisecond timestamp array".to_string())
            })?,
        ColumnarValue::Scalar(_) => {
            return Err(DataFusionError::Internal("Scalar inputs not supported".to_string()).into());
        }
    };

    let result: Int32Array = ts_array
        .iter()
        .map(|opt_ms| {
            opt_ms
                .and_then(DateTime::from_timestamp_millis)
                .map(|dt| part.extract(&dt))
        })
        .collect();

    Ok(ColumnarValue::Array(Arc::new(result)))
}

/// Formats a millisecond timestamp as a three-letter day name ("Mon".."Sun")
fn format_weekday(args: &[ColumnarValue]) -> Result<ColumnarValue> {
    let ts_array = match &args[0] {
        ColumnarValue::Array(array) => array
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .ok_or_else(|| {
                DataFusionError::Internal("Expected millisecond timestamp array".to_string())
            })?,
        ColumnarValue::Scalar(_) => {
            return Err(DataFusionError::Internal("Scalar inputs not supported".to_string()).into());
        }
    };

    let result: StringArray = ts_array
        .iter()
        .map(|opt_ms| {
            opt_ms
                .and_then(DateTime::from_timestamp_millis)
                .map(|dt| dt.format("%a").to_string())
        })
        .collect();

    Ok(ColumnarValue::Array(Arc::new(result)))
}
