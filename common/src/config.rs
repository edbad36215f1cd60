use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub aws: AwsCredentials,
    #[serde(default)]
    pub s3: S3Settings,
    #[serde(default)]
    pub data: DataLocations,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AwsCredentials {
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3Settings {
    /// Custom endpoint for S3-compatible stores (MinIO, localstack). When
    /// set, path-style addressing and plain HTTP are allowed.
    pub endpoint: Option<String>,
    #[serde(default = "default_s3_region")]
    pub region: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataLocations {
    #[serde(default = "default_input_uri")]
    pub input_uri: String,
    #[serde(default = "default_output_uri")]
    pub output_uri: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineSettings {
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default)]
    pub join: JoinMode,
}

/// How table writes treat data already present at the destination.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Add new files next to whatever is already there. Re-running the same
    /// input produces duplicate rows.
    #[default]
    Append,
    /// Delete the objects under every partition the run is about to produce,
    /// then write. Re-runs replace exactly the partitions they recompute.
    OverwritePartitions,
}

/// Key used when matching listening events against the song catalog.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum JoinMode {
    /// Artist name only. Two songs by the same artist both match an event,
    /// so one event can yield several songplays.
    #[default]
    Loose,
    /// Artist name, song title and duration.
    Strict,
}

impl Default for S3Settings {
    fn default() -> Self {
        S3Settings {
            endpoint: None,
            region: default_s3_region(),
        }
    }
}

impl Default for DataLocations {
    fn default() -> Self {
        DataLocations {
            input_uri: default_input_uri(),
            output_uri: default_output_uri(),
        }
    }
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_input_uri() -> String {
    "s3://udacity-dend/".to_string()
}

fn default_output_uri() -> String {
    "s3://playlake/".to_string()
}

impl Settings {
    /// Loads settings from an optional TOML file overlaid with
    /// `PLAYLAKE__`-prefixed environment variables
    /// (e.g. `PLAYLAKE__DATA__OUTPUT_URI`).
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("PLAYLAKE").separator("__"));

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        debug!(
            input = %settings.data.input_uri,
            output = %settings.data.output_uri,
            "Loaded settings"
        );

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::new("/nonexistent/playlake").unwrap();
        assert_eq!(settings.s3.region, "us-east-1");
        assert_eq!(settings.s3.endpoint, None);
        assert_eq!(settings.data.input_uri, "s3://udacity-dend/");
        assert_eq!(settings.pipeline.write_mode, WriteMode::Append);
        assert_eq!(settings.pipeline.join, JoinMode::Loose);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playlake.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[aws]
access_key_id = "minio"
secret_access_key = "minio123"

[s3]
endpoint = "http://localhost:9000"

[data]
input_uri = "file:///srv/streams/"

[pipeline]
write_mode = "overwrite-partitions"
join = "strict"
"#
        )
        .unwrap();

        let settings = Settings::new(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.aws.access_key_id, "minio");
        assert_eq!(
            settings.s3.endpoint.as_deref(),
            Some("http://localhost:9000")
        );
        assert_eq!(settings.data.input_uri, "file:///srv/streams/");
        assert_eq!(settings.data.output_uri, "s3://playlake/");
        assert_eq!(
            settings.pipeline.write_mode,
            WriteMode::OverwritePartitions
        );
        assert_eq!(settings.pipeline.join, JoinMode::Strict);
    }
}
