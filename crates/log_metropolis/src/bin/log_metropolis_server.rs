use std::env;
use std::process;

use log_metropolis::{load_feed_server_config_from, FeedServer};
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = load_feed_server_config_from(|key| env::var(key).ok());
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--demo" => config.demo = true,
            "--addr" => match args.next() {
                Some(addr) => config.bind_addr = addr,
                None => {
                    eprintln!("--addr requires a value");
                    process::exit(2);
                }
            },
            other => {
                eprintln!("unknown argument: {other}");
                eprintln!("usage: log_metropolis_server [--addr HOST:PORT] [--demo]");
                process::exit(2);
            }
        }
    }

    info!(
        target: "log_metropolis::server",
        addr = %config.bind_addr,
        tick_ms = config.tick_interval.as_millis() as u64,
        demo = config.demo,
        "feed server starting"
    );

    let server = FeedServer::new(config);
    if let Err(err) = server.run() {
        error!(target: "log_metropolis::server", error = %err, "feed server failed");
        process::exit(1);
    }
}
