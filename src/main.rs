extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate tokio;

use std::io::Write;

use chrono::Local;
use clap::Parser;
use env_logger::Env;
use log::{info, warn};

use crate::config::{Cli, Config};
use crate::locator::{DeviceLister, SerialLister};
use crate::port::SerialOpener;
use crate::streamer::Streamer;
use crate::telemetry::HostSampler;

mod config;
mod locator;
mod port;
mod shutdown;
mod streamer;
mod telemetry;

fn init_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    if cli.list_devices {
        for c in SerialLister.candidates()? {
            println!("{}\t{}", c.port, c.description);
        }
        return Ok(());
    }

    let config = Config::resolve(&cli)?;
    info!(
        "Looking for {} (tick {:?}, backoff {:?}, {} baud)",
        config.identity.match_pattern(),
        config.tick,
        config.backoff,
        config.baud_rate
    );

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                trigger.fire();
            }
            // Without a signal handler the process simply runs until killed.
            Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
        }
    });

    let opener = SerialOpener::new(config.baud_rate);
    Streamer::new(config, SerialLister, opener, HostSampler::new(), shutdown)
        .run()
        .await;

    Ok(())
}
