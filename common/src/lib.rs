use arrow::error::ArrowError;
use aws_smithy_runtime_api::client::result::CreateUnhandledError;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use datafusion::error::DataFusionError;
use parquet::errors::ParquetError;
use thiserror::Error;
use url::ParseError;

pub mod config;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("S3 error: {0}")]
    S3(#[from] aws_sdk_s3::Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),
}

impl Error {
    /// Classifies an error coming out of a source scan. A row that fails to
    /// decode under the declared schema surfaces from the engine as an Arrow
    /// JSON error somewhere down the cause chain; everything else passes
    /// through unchanged.
    pub fn from_scan(err: DataFusionError) -> Self {
        let is_decode = matches!(
            err.find_root(),
            DataFusionError::ArrowError(ArrowError::JsonError(_), _)
        );
        if is_decode {
            Error::SchemaMismatch(format!("source rows do not match the declared schema: {err}"))
        } else {
            Error::DataFusion(err)
        }
    }
}

// Implement From for various SdkError types
impl<E: std::fmt::Debug + CreateUnhandledError> From<SdkError<E, Response>> for Error {
    fn from(err: SdkError<E, Response>) -> Self {
        Error::AwsSdk(format!("{:?}", err))
    }
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        Error::Storage(format!("Object store error: {}", err))
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidInput(format!("URL parse error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_errors_classify_json_decode_as_schema_mismatch() {
        let decode = DataFusionError::ArrowError(
            ArrowError::JsonError("whilst decoding field 'year': failed to parse".to_string()),
            None,
        );
        assert!(matches!(
            Error::from_scan(decode),
            Error::SchemaMismatch(_)
        ));

        // The same root cause wrapped in context still classifies.
        let wrapped = DataFusionError::Context(
            "reading song_data".to_string(),
            Box::new(DataFusionError::ArrowError(
                ArrowError::JsonError("bad row".to_string()),
                None,
            )),
        );
        assert!(matches!(
            Error::from_scan(wrapped),
            Error::SchemaMismatch(_)
        ));
    }

    #[test]
    fn scan_errors_pass_other_failures_through() {
        let planning = DataFusionError::Plan("no such column".to_string());
        assert!(matches!(Error::from_scan(planning), Error::DataFusion(_)));
    }
}
