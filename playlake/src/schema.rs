use arrow::datatypes::{DataType, Field, Schema};
use lazy_static::lazy_static;

// Raw source schemas, declared exactly as the files arrive. Reads never fall
// back to schema inference.

/// One song-catalog record (`song_data/*/*/*/*.json`, one JSON object per
/// file or line). `year` arrives as a string in this feed; it is kept as-is
/// down to the parquet layer, where it also serves as a partition key.
pub fn song_record_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_longitude", DataType::Float64, true),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_name", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("title", DataType::Utf8, true),
        Field::new("duration", DataType::Float64, true),
        Field::new("year", DataType::Utf8, true),
    ])
}

/// One listening event (`log_data/*/*/*.json`, NDJSON). `iteminSession`
/// carries the upstream feed's misspelling; the files spell it
/// `itemInSession`, so this column reads as null until the feed is fixed.
/// `ts` is epoch milliseconds.
pub fn log_record_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist", DataType::Utf8, true),
        Field::new("auth", DataType::Utf8, true),
        Field::new("firstName", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("iteminSession", DataType::Int64, true),
        Field::new("lastName", DataType::Utf8, true),
        Field::new("length", DataType::Float64, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("method", DataType::Utf8, true),
        Field::new("page", DataType::Utf8, true),
        Field::new("registration", DataType::Float64, true),
        Field::new("sessionId", DataType::Int64, true),
        Field::new("song", DataType::Utf8, true),
        Field::new("status", DataType::Int64, true),
        Field::new("ts", DataType::Int64, true),
        Field::new("userAgent", DataType::Utf8, true),
        Field::new("userId", DataType::Utf8, true),
    ])
}

pub enum RawSchema {
    Songs,
    Logs,
}

pub fn get_raw_schema(which: RawSchema) -> &'static Schema {
    match which {
        RawSchema::Songs => &SONG_RECORD_SCHEMA,
        RawSchema::Logs => &LOG_RECORD_SCHEMA,
    }
}

// Lazy-loaded static schemas
lazy_static! {
    static ref SONG_RECORD_SCHEMA: Schema = song_record_schema();
    static ref LOG_RECORD_SCHEMA: Schema = log_record_schema();
}
