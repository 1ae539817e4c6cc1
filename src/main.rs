use std::process;

use clap::Parser;
use sql_lineage_analyzer::{
    app::run_command,
    cli::Cli,
    config::Config,
    error::AppResult
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run() -> AppResult<i32> {
    let cli = Cli::parse();
    let config = Config::load()?;
    let output = run_command(cli.command, config)?;

    for block in &output.stdout {
        print!("{}", block);
        if !block.ends_with('\n') {
            println!();
        }
    }
    for line in &output.stderr {
        eprintln!("{}", line);
    }
    Ok(output.exit_code)
}
