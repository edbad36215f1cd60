pub mod processor;
pub mod schema;
pub mod storage;

use common::Result;
use common::config::Settings;
use processor::{PlaylakeProcessor, Stage};
use tracing::info;

/// Command-line overrides applied on top of the loaded settings.
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    pub input_uri: Option<String>,
    pub output_uri: Option<String>,
    pub only: Option<Stage>,
}

/// Runs the complete warehouse ETL: loads settings, wires the session and
/// stores, then executes the requested stages.
pub async fn run_pipeline(config_path: &str, overrides: RunOverrides) -> Result<()> {
    let settings = Settings::new(config_path)?;

    let input_uri = overrides
        .input_uri
        .unwrap_or_else(|| settings.data.input_uri.clone());
    let output_uri = overrides
        .output_uri
        .unwrap_or_else(|| settings.data.output_uri.clone());
    info!(input = %input_uri, output = %output_uri, "Loaded configuration");

    let processor = PlaylakeProcessor::new(&settings)?;
    processor.run(&input_uri, &output_uri, overrides.only).await
}
