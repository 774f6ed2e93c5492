//! Wavecast — internet-radio streaming core
//!
//! The platform-independent half of an internet-radio appliance: joins a
//! WiFi network, connects to a shoutcast/icecast-style stream, strips the
//! interleaved ICY metadata, and feeds the audio payload through a bounded
//! ring buffer to an external decoder. Station and access-point lists are
//! rotated on failure; exhausting the access-point list falls back to a
//! provisioning access point.
//!
//! Platform specifics (WiFi radio, decoder SPI, list storage) live behind
//! the `Transport`, `AudioSink`, and `ConfigStore` capability traits; a
//! host adapter over OS sockets is provided in [`net`].
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wavecast::audio::Player;
//! use wavecast::config::buffer::AUDIO_RING_CAPACITY;
//! use wavecast::control::Controller;
//! use wavecast::net::HostTransport;
//! use wavecast::store::FsStore;
//! use wavecast::stream::RingBuffer;
//!
//! # fn main() -> wavecast::error::Result<()> {
//! # struct NullSink;
//! # impl wavecast::audio::AudioSink for NullSink {
//! #     fn write(&mut self, _data: &[u8]) -> wavecast::error::Result<()> { Ok(()) }
//! # }
//! let ring = Arc::new(RingBuffer::new());
//! ring.init(AUDIO_RING_CAPACITY)?;
//! let player = Player::spawn(ring.clone(), NullSink);
//! let store = FsStore::open("/var/lib/wavecast")?;
//! let mut controller = Controller::new(HostTransport::new(), store, player.handle(), ring);
//! controller.run()?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod control;
pub mod error;
pub mod net;
pub mod store;
pub mod stream;
pub mod transport;
