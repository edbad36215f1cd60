use crate::processor::write::TableWriter;
use crate::processor::{LOG_DATA_GLOB, SONG_DATA_GLOB, ensure_nonempty, join_uri, read_ndjson};
use crate::schema::{RawSchema, get_raw_schema};
use common::config::JoinMode;
use common::{Error, Result};
use datafusion::arrow::array::{ArrayRef, Int64Array, RecordBatch};
use datafusion::arrow::compute::concat_batches;
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use datafusion::common::JoinType;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

/// Derives the `users`, `time` and `songplays` tables from the activity
/// logs. Only `NextSong` events count as plays; everything else is noise.
pub struct LogProcessor {
    ctx: Arc<SessionContext>,
    writer: Arc<TableWriter>,
    join_mode: JoinMode,
}

impl LogProcessor {
    pub fn new(ctx: Arc<SessionContext>, writer: Arc<TableWriter>, join_mode: JoinMode) -> Self {
        Self {
            ctx,
            writer,
            join_mode,
        }
    }

    pub async fn process(&self, input_uri: &str, output_uri: &str) -> Result<()> {
        let source = join_uri(input_uri, LOG_DATA_GLOB);
        info!(source = %source, "Reading activity logs");
        let logs = read_ndjson(&self.ctx, &source, get_raw_schema(RawSchema::Logs)).await?;
        ensure_nonempty(&logs, "activity logs", &source).await?;

        let plays = logs.filter(col("page").eq(lit("NextSong")))?;

        self.write_users(plays.clone(), output_uri).await?;
        self.write_time(plays.clone(), output_uri).await?;
        self.write_songplays(plays, input_uri, output_uri).await?;

        Ok(())
    }

    async fn write_users(&self, plays: DataFrame, output_uri: &str) -> Result<()> {
        // Full-row dedup: a user keeps one row per level they were seen on.
        // ident() keeps the camelCase source names from being folded to
        // lowercase during column resolution.
        let users = plays
            .select(vec![
                ident("userId").alias("user_id"),
                ident("firstName").alias("first_name"),
                ident("lastName").alias("last_name"),
                col("gender"),
                col("level"),
            ])?
            .distinct()?;
        self.writer
            .write(&self.ctx, users, &join_uri(output_uri, "users"), "users", &[])
            .await?;
        Ok(())
    }

    async fn write_time(&self, plays: DataFrame, output_uri: &str) -> Result<()> {
        let from_epoch_ms = plays.registry().udf("from_epoch_ms")?;
        let date_part_utc = plays.registry().udf("date_part_utc")?;
        let weekday_abbrev = plays.registry().udf("weekday_abbrev")?;

        // Events in the same wall-clock second collapse to one time row.
        let start_time = from_epoch_ms.call(vec![col("ts")]);
        let time = plays
            .select(vec![
                start_time.clone().alias("start_time"),
                date_part_utc
                    .call(vec![lit("hour"), start_time.clone()])
                    .alias("hour"),
                date_part_utc
                    .call(vec![lit("day"), start_time.clone()])
                    .alias("day"),
                date_part_utc
                    .call(vec![lit("week"), start_time.clone()])
                    .alias("week"),
                date_part_utc
                    .call(vec![lit("month"), start_time.clone()])
                    .alias("month"),
                date_part_utc
                    .call(vec![lit("year"), start_time.clone()])
                    .alias("year"),
                weekday_abbrev.call(vec![start_time]).alias("weekday"),
            ])?
            .distinct()?;
        self.writer
            .write(
                &self.ctx,
                time,
                &join_uri(output_uri, "time"),
                "time",
                &["year", "month"],
            )
            .await?;
        Ok(())
    }

    async fn write_songplays(
        &self,
        plays: DataFrame,
        input_uri: &str,
        output_uri: &str,
    ) -> Result<()> {
        // Fresh catalog scan, so this stage also works on its own.
        let catalog_source = join_uri(input_uri, SONG_DATA_GLOB);
        let songs =
            read_ndjson(&self.ctx, &catalog_source, get_raw_schema(RawSchema::Songs)).await?;
        ensure_nonempty(&songs, "song catalog", &catalog_source).await?;

        let joined = match self.join_mode {
            JoinMode::Loose => songs.join(
                plays,
                JoinType::Inner,
                &["artist_name"],
                &["artist"],
                None,
            )?,
            JoinMode::Strict => songs.join(
                plays,
                JoinType::Inner,
                &["artist_name", "title", "duration"],
                &["artist", "song", "length"],
                None,
            )?,
        };

        let from_epoch_ms = joined.registry().udf("from_epoch_ms")?;
        let date_part_utc = joined.registry().udf("date_part_utc")?;
        let start_time = from_epoch_ms.call(vec![col("ts")]);

        let events = joined
            .select(vec![
                start_time.clone().alias("start_time"),
                ident("userId").alias("user_id"),
                col("level"),
                col("song_id"),
                col("artist_id"),
                ident("sessionId").alias("session_id"),
                // The play's location is the artist's, not the listener's.
                col("artist_location").alias("location"),
                ident("userAgent"),
                date_part_utc
                    .call(vec![lit("month"), start_time.clone()])
                    .alias("month"),
                date_part_utc
                    .call(vec![lit("year"), start_time])
                    .alias("year"),
            ])?
            .distinct()?;

        let batches = events.collect().await.map_err(Error::from_scan)?;
        let matched: usize = batches.iter().map(|batch| batch.num_rows()).sum();
        if matched == 0 {
            info!("No events matched the song catalog. Skipping songplays write.");
            return Ok(());
        }

        let songplays = assign_songplay_ids(&self.ctx, batches)?;
        self.writer
            .write(
                &self.ctx,
                songplays,
                &join_uri(output_uri, "songplays"),
                "songplays",
                &["year", "month"],
            )
            .await?;
        Ok(())
    }
}

/// Prepends a dense `songplay_id` to the already-deduplicated play batches.
/// Ids restart at zero each run: they are unique within a run's output, not
/// across appended runs.
fn assign_songplay_ids(ctx: &SessionContext, batches: Vec<RecordBatch>) -> Result<DataFrame> {
    let input_schema = batches[0].schema();
    let combined = concat_batches(&input_schema, &batches)?;

    let mut fields: Vec<Field> = vec![Field::new("songplay_id", DataType::Int64, false)];
    fields.extend(input_schema.fields().iter().map(|f| f.as_ref().clone()));
    let schema = Arc::new(Schema::new(fields));

    let ids = Int64Array::from_iter_values(0..combined.num_rows() as i64);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(combined.num_columns() + 1);
    columns.push(Arc::new(ids));
    columns.extend(combined.columns().iter().cloned());
    let numbered = RecordBatch::try_new(schema, columns)?;

    Ok(ctx.read_batch(numbered)?)
}
