use std::process;

use clap::{Arg, Command};
use log::{error, info};
use tokio::signal;

mod config;
mod daemon;

use config::Config;
use daemon::Daemon;

#[tokio::main]
async fn main() {
    env_logger::init();

    let matches = Command::new("mwfdd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("MWFD - multi-worker Named Data Networking forwarding daemon")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/mwfd/mwfdd.conf"),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("N")
                .help("Override the configured number of forwarding workers"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    info!("config file: {}", config_path);

    let mut config = match Config::load(config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("failed to load configuration: {:#}", err);
            process::exit(1);
        }
    };
    if let Some(workers) = matches.get_one::<String>("workers") {
        match workers.parse::<usize>() {
            Ok(n) if n > 0 => config.forwarding.workers = n,
            _ => {
                error!("invalid worker count {:?}", workers);
                process::exit(1);
            }
        }
    }

    let mut daemon = Daemon::new(config);
    if let Err(err) = daemon.start().await {
        error!("failed to start daemon: {:#}", err);
        process::exit(1);
    }

    signal::ctrl_c().await.expect("failed to listen for ctrl+c");

    if let Some(status) = daemon.status() {
        info!(
            "final status: {} interests in, {} data in, {} satisfied, {} unsatisfied",
            status.n_in_interests, status.n_in_data, status.n_satisfied, status.n_unsatisfied
        );
    }
    daemon.stop().await;
}
