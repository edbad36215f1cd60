pub mod logs;
pub mod songs;
pub mod udf;
pub mod write;

pub use logs::LogProcessor;
pub use songs::SongProcessor;
pub use udf::register_udfs;
pub use write::TableWriter;

use crate::storage::S3Manager;
use common::config::Settings;
use common::{Error, Result};
use datafusion::arrow::datatypes::Schema;
use datafusion::prelude::*;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Source layouts, relative to the input URI.
pub const SONG_DATA_GLOB: &str = "song_data/*/*/*/*.json";
pub const LOG_DATA_GLOB: &str = "log_data/*/*/*.json";

/// The two halves of a run, for `--only`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Songs,
    Logs,
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "songs" => Ok(Stage::Songs),
            "logs" => Ok(Stage::Logs),
            other => Err(Error::InvalidInput(format!(
                "Unknown stage '{}', expected 'songs' or 'logs'",
                other
            ))),
        }
    }
}

/// Coordinates the two source stages over one DataFusion session.
pub struct PlaylakeProcessor {
    ctx: Arc<SessionContext>,
    s3_manager: S3Manager,
    songs: SongProcessor,
    logs: LogProcessor,
    run_id: String,
}

/// Session options the pipeline depends on: the source globs span nested
/// directories, which DataFusion skips unless told otherwise.
pub(crate) fn session_config() -> SessionConfig {
    let mut config = SessionConfig::new();
    config
        .options_mut()
        .execution
        .listing_table_ignore_subdirectory = false;
    config
}

impl PlaylakeProcessor {
    pub fn new(settings: &Settings) -> Result<Self> {
        let ctx = Arc::new(SessionContext::new_with_config(session_config()));
        register_udfs(&ctx)?;

        let run_id = Uuid::new_v4().to_string();
        let writer = Arc::new(TableWriter::new(
            settings.pipeline.write_mode,
            run_id.clone(),
        ));
        let s3_manager = S3Manager::from_settings(settings);

        Ok(Self {
            songs: SongProcessor::new(ctx.clone(), writer.clone()),
            logs: LogProcessor::new(ctx.clone(), writer, settings.pipeline.join),
            ctx,
            s3_manager,
            run_id,
        })
    }

    /// Registers object stores for the locations this run touches. Input
    /// storage that cannot be reached means there is nothing to extract, so
    /// those failures surface as `SourceUnavailable`.
    async fn prepare_stores(&self, input_uri: &str, output_uri: &str) -> Result<()> {
        if let Err(e) = self.s3_manager.register_for_uri(&self.ctx, input_uri).await {
            return Err(match e {
                Error::Storage(msg) | Error::AwsSdk(msg) => Error::SourceUnavailable(msg),
                other => other,
            });
        }
        self.s3_manager
            .register_for_uri(&self.ctx, output_uri)
            .await?;
        Ok(())
    }

    pub async fn run(
        &self,
        input_uri: &str,
        output_uri: &str,
        only: Option<Stage>,
    ) -> Result<()> {
        info!(
            run_id = %self.run_id,
            input = input_uri,
            output = output_uri,
            "Starting warehouse run"
        );
        self.prepare_stores(input_uri, output_uri).await?;

        if only.is_none_or(|stage| stage == Stage::Songs) {
            self.songs.process(input_uri, output_uri).await?;
        }
        if only.is_none_or(|stage| stage == Stage::Logs) {
            self.logs.process(input_uri, output_uri).await?;
        }

        info!(run_id = %self.run_id, "Warehouse run complete");
        Ok(())
    }
}

/// Scans NDJSON under the declared schema. No inference, ever: a file that
/// disagrees with the schema is an error, not a silently widened column.
pub(crate) async fn read_ndjson(
    ctx: &SessionContext,
    uri: &str,
    schema: &'static Schema,
) -> Result<DataFrame> {
    let options = NdJsonReadOptions::default().schema(schema);
    ctx.read_json(uri.to_string(), options)
        .await
        .map_err(Error::from_scan)
}

/// Zero records from a source scan means the glob matched nothing usable.
pub(crate) async fn ensure_nonempty(df: &DataFrame, source: &str, searched: &str) -> Result<()> {
    let rows = df.clone().count().await.map_err(Error::from_scan)?;
    if rows == 0 {
        return Err(Error::SourceUnavailable(format!(
            "{} produced no records (searched '{}')",
            source, searched
        )));
    }
    Ok(())
}

pub(crate) fn join_uri(base: &str, suffix: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, suffix)
    } else {
        format!("{}/{}", base, suffix)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{Value, json};
    use std::path::Path;

    pub fn song(
        song_id: &str,
        title: &str,
        artist_id: &str,
        artist_name: &str,
        year: &str,
        duration: f64,
    ) -> Value {
        json!({
            "artist_id": artist_id,
            "artist_latitude": 35.14968,
            "artist_longitude": -90.04892,
            "artist_location": "Memphis, TN",
            "artist_name": artist_name,
            "song_id": song_id,
            "title": title,
            "duration": duration,
            "year": year,
            "num_songs": 1
        })
    }

    pub fn next_song(
        user: (&str, &str, &str, &str),
        level: &str,
        artist: &str,
        song: &str,
        length: f64,
        ts: i64,
        session_id: i64,
    ) -> Value {
        let (user_id, first, last, gender) = user;
        json!({
            "artist": artist,
            "auth": "Logged In",
            "firstName": first,
            "gender": gender,
            "itemInSession": 0,
            "lastName": last,
            "length": length,
            "level": level,
            "location": "San Jose-Sunnyvale-Santa Clara, CA",
            "method": "PUT",
            "page": "NextSong",
            "registration": 1540919166796.0,
            "sessionId": session_id,
            "song": song,
            "status": 200,
            "ts": ts,
            "userAgent": "\"Mozilla/5.0 (X11; Linux x86_64)\"",
            "userId": user_id
        })
    }

    pub fn page_view(user: (&str, &str, &str, &str), page: &str, ts: i64) -> Value {
        let (user_id, first, last, gender) = user;
        json!({
            "artist": null,
            "auth": "Logged In",
            "firstName": first,
            "gender": gender,
            "itemInSession": 0,
            "lastName": last,
            "length": null,
            "level": "free",
            "location": "San Jose-Sunnyvale-Santa Clara, CA",
            "method": "GET",
            "page": page,
            "registration": 1540919166796.0,
            "sessionId": 500,
            "song": null,
            "status": 200,
            "ts": ts,
            "userAgent": "\"Mozilla/5.0 (X11; Linux x86_64)\"",
            "userId": user_id
        })
    }

    /// Writes one JSON object per line, creating parent directories.
    pub fn write_ndjson(path: &Path, records: &[Value]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let lines: Vec<String> = records.iter().map(|record| record.to_string()).collect();
        std::fs::write(path, lines.join("\n")).unwrap();
    }
}
