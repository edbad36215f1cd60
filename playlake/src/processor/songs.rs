use crate::processor::write::TableWriter;
use crate::processor::{SONG_DATA_GLOB, ensure_nonempty, join_uri, read_ndjson};
use crate::schema::{RawSchema, get_raw_schema};
use common::Result;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

/// Derives the `songs` and `artists` tables from the song catalog.
pub struct SongProcessor {
    ctx: Arc<SessionContext>,
    writer: Arc<TableWriter>,
}

impl SongProcessor {
    pub fn new(ctx: Arc<SessionContext>, writer: Arc<TableWriter>) -> Self {
        Self { ctx, writer }
    }

    pub async fn process(&self, input_uri: &str, output_uri: &str) -> Result<()> {
        let source = join_uri(input_uri, SONG_DATA_GLOB);
        info!(source = %source, "Reading song catalog");
        let df = read_ndjson(&self.ctx, &source, get_raw_schema(RawSchema::Songs)).await?;
        ensure_nonempty(&df, "song catalog", &source).await?;

        // A song appearing in several catalog drops collapses to one row.
        let songs = df
            .clone()
            .select_columns(&["song_id", "artist_id", "year", "duration"])?
            .distinct()?;
        self.writer
            .write(
                &self.ctx,
                songs,
                &join_uri(output_uri, "songs"),
                "songs",
                &["year", "artist_id"],
            )
            .await?;

        let artists = df
            .select_columns(&[
                "artist_id",
                "artist_name",
                "artist_location",
                "artist_latitude",
                "artist_longitude",
            ])?
            .distinct()?;
        self.writer
            .write(
                &self.ctx,
                artists,
                &join_uri(output_uri, "artists"),
                "artists",
                &[],
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::fixtures;
    use common::Error;
    use common::config::WriteMode;
    use datafusion::arrow::datatypes::DataType;

    fn processor(ctx: &Arc<SessionContext>) -> SongProcessor {
        let writer = Arc::new(TableWriter::new(WriteMode::Append, "test-run".to_string()));
        SongProcessor::new(ctx.clone(), writer)
    }

    fn seed_catalog(input: &std::path::Path) {
        fixtures::write_ndjson(
            &input.join("song_data/A/A/A/TRAAAAA.json"),
            &[
                fixtures::song("SOS1", "Song One", "AR1", "Artist One", "1994", 201.5),
                // Same record twice in one file.
                fixtures::song("SOS1", "Song One", "AR1", "Artist One", "1994", 201.5),
            ],
        );
        fixtures::write_ndjson(
            &input.join("song_data/A/A/B/TRAAAAB.json"),
            // Same record again in another file.
            &[fixtures::song("SOS1", "Song One", "AR1", "Artist One", "1994", 201.5)],
        );
        fixtures::write_ndjson(
            &input.join("song_data/A/B/A/TRAABAA.json"),
            &[fixtures::song("SOS2", "Song Two", "AR1", "Artist One", "2001", 145.2)],
        );
        fixtures::write_ndjson(
            &input.join("song_data/B/A/A/TRBAAAA.json"),
            &[fixtures::song("SOS3", "Song Three", "AR2", "Artist Two", "1994", 98.0)],
        );
    }

    #[tokio::test]
    async fn derives_deduplicated_songs_and_artists() {
        let ctx = Arc::new(SessionContext::new_with_config(crate::processor::session_config()));
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        seed_catalog(&input);

        processor(&ctx)
            .process(input.to_str().unwrap(), output.to_str().unwrap())
            .await
            .unwrap();

        // Repeated catalog records collapse to one row per song.
        let songs = ctx
            .read_parquet(
                output.join("songs").to_str().unwrap(),
                ParquetReadOptions::default().table_partition_cols(vec![
                    ("year".to_string(), DataType::Utf8),
                    ("artist_id".to_string(), DataType::Utf8),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(songs.count().await.unwrap(), 3);

        // The string year is a partition key, verbatim.
        assert!(output.join("songs/year=1994/artist_id=AR1").is_dir());
        assert!(output.join("songs/year=2001/artist_id=AR1").is_dir());
        assert!(output.join("songs/year=1994/artist_id=AR2").is_dir());

        // Artists dedup across all their songs; the table is unpartitioned.
        let artists = ctx
            .read_parquet(
                output.join("artists").to_str().unwrap(),
                ParquetReadOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(artists.count().await.unwrap(), 2);
        assert!(!output.join("artists/artist_id=AR1").exists());
    }

    #[tokio::test]
    async fn missing_song_data_is_source_unavailable() {
        let ctx = Arc::new(SessionContext::new_with_config(crate::processor::session_config()));
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        std::fs::create_dir_all(&input).unwrap();

        let err = processor(&ctx)
            .process(input.to_str().unwrap(), output.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
        assert!(!output.join("songs").exists());
    }

    #[tokio::test]
    async fn numeric_year_in_source_is_schema_mismatch() {
        let ctx = Arc::new(SessionContext::new_with_config(crate::processor::session_config()));
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");

        let mut record = fixtures::song("SOS1", "Song One", "AR1", "Artist One", "1994", 201.5);
        record["year"] = serde_json::json!(1994);
        fixtures::write_ndjson(&input.join("song_data/A/A/A/TRAAAAA.json"), &[record]);

        let err = processor(&ctx)
            .process(input.to_str().unwrap(), output.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)), "got {err:?}");
    }
}
