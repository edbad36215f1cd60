use common::config::WriteMode;
use common::{Error, Result};
use datafusion::arrow::array::{Array, ArrayRef};
use datafusion::common::config::TableParquetOptions;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::datasource::listing::ListingTableUrl;
use datafusion::prelude::*;
use datafusion::scalar::ScalarValue;
use futures::TryStreamExt;
use object_store::path::Path;
use tracing::{debug, info};

/// Writes derived tables as hive-partitioned parquet. Writes are per-table:
/// a failure mid-run leaves tables that were already written in place.
pub struct TableWriter {
    mode: WriteMode,
    run_id: String,
}

impl TableWriter {
    pub fn new(mode: WriteMode, run_id: String) -> Self {
        Self { mode, run_id }
    }

    /// Writes `df` under `table_uri`, partitioned by `partition_cols` (hive
    /// layout, `col=value` directories). Returns the number of rows written.
    ///
    /// In `Append` mode new files land next to existing ones. In
    /// `OverwritePartitions` mode the objects under every partition this
    /// frame is about to produce are deleted first; for an unpartitioned
    /// table that means the whole table prefix.
    pub async fn write(
        &self,
        ctx: &SessionContext,
        df: DataFrame,
        table_uri: &str,
        table: &str,
        partition_cols: &[&str],
    ) -> Result<usize> {
        let rows = df.clone().count().await.map_err(Error::from_scan)?;

        if self.mode == WriteMode::OverwritePartitions {
            self.clear_target(ctx, df.clone(), table_uri, partition_cols)
                .await?;
        }

        let mut write_options = DataFrameWriteOptions::new();
        if !partition_cols.is_empty() {
            write_options = write_options
                .with_partition_by(partition_cols.iter().map(|c| c.to_string()).collect());
        }

        df.write_parquet(table_uri, write_options, Some(self.parquet_options(table)))
            .await
            .map_err(Error::from_scan)?;

        info!(table, rows, uri = table_uri, mode = ?self.mode, "Wrote table");
        Ok(rows)
    }

    fn parquet_options(&self, table: &str) -> TableParquetOptions {
        let mut options = TableParquetOptions::new();
        options.global.compression = Some("snappy".to_string());
        options
            .key_value_metadata
            .insert("playlake:run_id".to_string(), Some(self.run_id.clone()));
        options
            .key_value_metadata
            .insert("playlake:table".to_string(), Some(table.to_string()));
        options
    }

    async fn clear_target(
        &self,
        ctx: &SessionContext,
        df: DataFrame,
        table_uri: &str,
        partition_cols: &[&str],
    ) -> Result<()> {
        let url = ListingTableUrl::parse(table_uri)?;
        let store = ctx.runtime_env().object_store(&url)?;
        let base = url.prefix();

        let prefixes: Vec<Path> = if partition_cols.is_empty() {
            vec![base.clone()]
        } else {
            self.partition_prefixes(df, partition_cols)
                .await?
                .into_iter()
                .map(|suffix| Path::from(format!("{}/{}", base.as_ref(), suffix)))
                .collect()
        };

        for prefix in prefixes {
            let mut targets = Vec::new();
            {
                let mut objects = store.list(Some(&prefix));
                while let Some(meta) = objects.try_next().await? {
                    targets.push(meta.location);
                }
            }
            if targets.is_empty() {
                continue;
            }
            debug!(prefix = %prefix, objects = targets.len(), "Clearing partition before write");
            for location in &targets {
                store.delete(location).await?;
            }
        }

        Ok(())
    }

    /// Distinct `col=value/...` suffixes this frame will write to, rendered
    /// the same way the parquet sink renders them.
    async fn partition_prefixes(
        &self,
        df: DataFrame,
        partition_cols: &[&str],
    ) -> Result<Vec<String>> {
        let batches = df
            .select_columns(partition_cols)?
            .distinct()?
            .collect()
            .await
            .map_err(Error::from_scan)?;

        let mut prefixes = Vec::new();
        for batch in &batches {
            'rows: for row in 0..batch.num_rows() {
                let mut parts = Vec::with_capacity(partition_cols.len());
                for (idx, column) in partition_cols.iter().enumerate() {
                    let array = batch.column(idx);
                    if array.is_null(row) {
                        // A null key lands in the sink's fallback directory;
                        // leave that one alone rather than guess its name.
                        continue 'rows;
                    }
                    parts.push(format!("{}={}", column, scalar_string(array, row)?));
                }
                prefixes.push(parts.join("/"));
            }
        }
        Ok(prefixes)
    }
}

fn scalar_string(array: &ArrayRef, row: usize) -> Result<String> {
    let value = ScalarValue::try_from_array(array, row)?;
    Ok(value.to_string())
}
