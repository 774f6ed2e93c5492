//! Playback context
//!
//! A dedicated thread drains the ring buffer into the audio sink. Start and
//! stop use hysteresis: playback begins only once the buffer is completely
//! full and stops once it is completely empty, so a buffer hovering near
//! empty does not chatter the decoder on and off.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::playback::{DRAIN_SLEEP_MS, IDLE_SLEEP_MS, PLAY_CHUNK_SIZE};
use crate::error::Result;
use crate::stream::buffer::RingBuffer;

/// Byte consumer for the decoder chip. `write` may block on the hardware
/// ready signal; the core only pushes bytes and never inspects registers.
pub trait AudioSink: Send + 'static {
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Put the decoder back into a clean state after an aborted stream
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Controller-side hook for decoder resets
pub trait DecoderControl: Send {
    fn reset(&mut self);
}

/// No-op decoder control for targets without a resettable decoder
pub struct NoopDecoder;

impl DecoderControl for NoopDecoder {
    fn reset(&mut self) {}
}

/// Handle to the playback thread; routes decoder resets onto it
#[derive(Clone)]
pub struct PlayerHandle {
    reset_requested: Arc<AtomicBool>,
}

impl DecoderControl for PlayerHandle {
    fn reset(&mut self) {
        self.reset_requested.store(true, Ordering::SeqCst);
    }
}

/// Owns the playback thread
pub struct Player {
    stop_flag: Arc<AtomicBool>,
    reset_requested: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Player {
    /// Spawn the playback thread draining `ring` into `sink`.
    pub fn spawn<S: AudioSink>(ring: Arc<RingBuffer>, sink: S) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let reset_requested = Arc::new(AtomicBool::new(false));

        let thread_stop = stop_flag.clone();
        let thread_reset = reset_requested.clone();
        let handle = thread::Builder::new()
            .name("wavecast-playback".to_string())
            .spawn(move || play_loop(ring, sink, thread_stop, thread_reset))
            .expect("failed to spawn playback thread");

        Self {
            stop_flag,
            reset_requested,
            handle: Some(handle),
        }
    }

    pub fn handle(&self) -> PlayerHandle {
        PlayerHandle {
            reset_requested: self.reset_requested.clone(),
        }
    }

    /// Stop the thread and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

fn play_loop<S: AudioSink>(
    ring: Arc<RingBuffer>,
    mut sink: S,
    stop_flag: Arc<AtomicBool>,
    reset_requested: Arc<AtomicBool>,
) {
    let mut started = false;
    let mut chunk = [0u8; PLAY_CHUNK_SIZE];

    while !stop_flag.load(Ordering::Relaxed) {
        if reset_requested.swap(false, Ordering::SeqCst) {
            if let Err(e) = sink.reset() {
                tracing::warn!(error = %e, "decoder reset failed");
            }
        }

        match ring.percentage_fill() {
            Ok(0) => started = false,
            Ok(100) => started = true,
            Ok(_) => {}
            Err(_) => break, // buffer destroyed, playback is over
        }

        if started {
            match ring.get(&mut chunk) {
                Ok(n) => {
                    if n > 0 {
                        if let Err(e) = sink.write(&chunk[..n]) {
                            tracing::error!(error = %e, "audio sink write failed");
                            break;
                        }
                    }
                }
                Err(_) => break,
            }
            thread::sleep(Duration::from_millis(DRAIN_SLEEP_MS));
        } else {
            thread::sleep(Duration::from_millis(IDLE_SLEEP_MS));
        }
    }
}
