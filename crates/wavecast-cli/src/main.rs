//! Wavecast CLI — host-side driver for the streaming core
//!
//! Wires the controller to OS sockets, a directory-backed config store, and
//! a file (or discarding) audio sink. Useful for exercising stations and
//! watching titles without appliance hardware.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wavecast::audio::{AudioSink, Player};
use wavecast::config::buffer::AUDIO_RING_CAPACITY;
use wavecast::control::{Controller, RunOutcome};
use wavecast::error::Result;
use wavecast::net::HostTransport;
use wavecast::store::{ConfigStore, FsStore, AP_LIST, STATION_LIST};
use wavecast::stream::RingBuffer;

#[derive(Parser)]
#[command(name = "wavecast", about = "Internet radio streaming driver", version)]
struct Cli {
    /// Directory holding webradio.lst and wifiap.lst
    #[arg(short, long, default_value = "./wavecast.d")]
    config_dir: PathBuf,

    /// Replace the station list with this single URI before starting
    #[arg(short, long)]
    station: Option<String>,

    /// Write received audio to this file instead of discarding it
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Sink writing payload bytes to any writer, tracking volume
struct WriterSink {
    out: Box<dyn Write + Send>,
    written: u64,
    reported: u64,
}

impl WriterSink {
    fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            written: 0,
            reported: 0,
        }
    }
}

impl AudioSink for WriterSink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.out.write_all(data)?;
        self.written += data.len() as u64;
        if self.written - self.reported >= 1024 * 1024 {
            self.reported = self.written;
            tracing::info!(bytes = self.written, "audio received");
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "wavecast stopped");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let store = FsStore::open(&cli.config_dir)?;

    if let Some(station) = &cli.station {
        store.save_list(STATION_LIST, format!("{station}\r\n").as_bytes())?;
    }
    // the host link is OS-managed, but the controller still walks the list
    if store.load_list(AP_LIST).is_err() {
        store.save_list(AP_LIST, b"hostnet/\r\n")?;
    }

    let sink = match &cli.output {
        Some(path) => {
            let file = File::create(path)?;
            WriterSink::new(Box::new(file))
        }
        None => WriterSink::new(Box::new(io::sink())),
    };

    let ring = Arc::new(RingBuffer::new());
    ring.init(AUDIO_RING_CAPACITY)?;
    let player = Player::spawn(ring.clone(), sink);

    let mut controller = Controller::new(HostTransport::new(), store, player.handle(), ring);

    let (metadata_tx, metadata_rx) = crossbeam_channel::unbounded();
    controller.set_metadata_sender(metadata_tx);
    thread::spawn(move || {
        for meta in metadata_rx {
            tracing::info!(
                artist = meta.artist.as_deref().unwrap_or("-"),
                title = meta.title.as_deref().unwrap_or("-"),
                "now playing"
            );
        }
    });

    match controller.run()? {
        RunOutcome::Provisioning => {
            tracing::warn!("no reachable network configuration, exiting");
        }
    }
    player.shutdown();
    Ok(())
}
