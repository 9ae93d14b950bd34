use clap::{Command, Arg};
use std::process;
use tracing_subscriber::EnvFilter;


#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let matches = Command::new("ETL Pipeline Manager")
        .version("1.0")
        .about("Loads song and activity JSON logs into star-schema parquet tables")
        .subcommand(
            Command::new("etl")
                .about("Run the ETL pipeline")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("etl", etl_matches)) => {
            let config_path = etl_matches.get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/etl.toml");
            println!("Starting ETL pipeline with config: {}", config_path);

            if let Err(e) = etl::run_etl_pipeline(config_path).await {
                eprintln!("ETL pipeline error: {}", e);
                process::exit(1);
            }
        },

        _ => {
            eprintln!("Please specify a valid subcommand");
            process::exit(1);
        }
    }
}
