use clap::{Arg, Command};
use playlake::RunOverrides;
use playlake::processor::Stage;
use std::process;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let matches = Command::new("playlake")
        .version("1.0")
        .about("Builds the streaming-analytics warehouse from song and activity data")
        .subcommand(
            Command::new("run")
                .about("Run the warehouse ETL")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                )
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_name("URI")
                        .help("Overrides the input location (s3://bucket/ or a local path)"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("URI")
                        .help("Overrides the output location"),
                )
                .arg(
                    Arg::new("only")
                        .long("only")
                        .value_name("STAGE")
                        .help("Runs a single stage: 'songs' or 'logs'"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let config_path = run_matches
                .get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/playlake.toml");

            let only = match run_matches.get_one::<String>("only") {
                Some(raw) => match raw.parse::<Stage>() {
                    Ok(stage) => Some(stage),
                    Err(e) => {
                        eprintln!("{}", e);
                        process::exit(2);
                    }
                },
                None => None,
            };

            let overrides = RunOverrides {
                input_uri: run_matches.get_one::<String>("input").cloned(),
                output_uri: run_matches.get_one::<String>("output").cloned(),
                only,
            };

            if let Err(e) = playlake::run_pipeline(config_path, overrides).await {
                eprintln!("Pipeline error: {}", e);
                process::exit(1);
            }
        }
        _ => {
            println!("No subcommand specified. Use --help for usage information.");
            process::exit(1);
        }
    }
}
