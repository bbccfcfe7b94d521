#![deny(unsafe_code)]

//! `geobroker` executable
//!
//! Reads one JSON encoded packet per line from stdin and writes every produced packet as one
//! JSON line to stdout. Logs go to stderr and/or the configured log file.

use structopt::StructOpt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use geobroker::context::BrokerContext;
use geobroker::logger::{config_logger, logger_init};
use geobroker::logic::new_logic;
use geobroker::types::{Packet, Rx};
use geobroker::worker::Dispatcher;
use geobroker::Result;
use geobroker_conf::{Options, Settings};

#[tokio::main]
async fn main() {
    //init config
    let settings = Settings::init(Options::from_args()).expect("settings init failed");

    //init log
    logger_init(config_logger(&settings.log), settings.log.level).expect("logger init failed");

    let _ = Settings::logs();

    if let Err(e) = run(settings).await {
        log::error!("geobroker exit, {:?}", e);
        std::process::exit(1);
    }
    log::info!("geobroker exit");
}

async fn run(settings: &'static Settings) -> Result<()> {
    let scx = BrokerContext::from_settings(settings)?;
    log::info!("{:?}", scx);

    let logic = new_logic(settings.broker.strategy, scx);
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::start(logic, settings.broker.workers, settings.broker.queue_max, tx);
    let writer = tokio::spawn(write_outbound(rx));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => match serde_json::from_str::<Packet>(&line) {
                    Ok(packet) => dispatcher.dispatch(packet).await?,
                    Err(e) => log::warn!("malformed packet dropped, {}, {:?}", e, line),
                },
                None => break,
            },
            _ = &mut ctrl_c => {
                log::info!("ctrl-c received, shutting down");
                break;
            }
        }
    }

    dispatcher.stop().await?;
    writer.await??;
    Ok(())
}

async fn write_outbound(mut rx: Rx) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(out) = rx.recv().await {
        let mut line = serde_json::to_vec(&out)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
        stdout.flush().await?;
    }
    Ok(())
}
