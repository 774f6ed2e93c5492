//! ICY stream demultiplexer
//!
//! Separates interleaved ICY metadata from audio payload in a live byte
//! stream and forwards only the payload into the audio ring buffer. The
//! stream begins with an HTTP response header; header bytes are accumulated
//! here (a read may end mid-header) and handed to the header parser, never
//! to the ring.
//!
//! Nothing may be assumed about alignment between network reads and
//! metadata boundaries: a metadata block, its one-byte length prefix, and
//! the header terminator can each fall anywhere inside or across reads.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::config::control::FEED_RETRY_SLEEP_MS;
use crate::config::network::{ICY_SCRATCH_SIZE, MAX_HEADER_BYTES};
use crate::error::{RadioError, Result};
use crate::stream::buffer::RingBuffer;
use crate::stream::header;
use crate::stream::metadata::{self, StreamMetadata};

/// Outcome of one `feed` call
#[derive(Debug, PartialEq, Eq)]
pub enum Feed<'a> {
    /// The header terminator has not been seen yet; feed the next read
    NeedMoreHeaderBytes,
    /// Header complete. `payload` is the tail of this read following the
    /// terminator (empty when the terminator coincided with the read end).
    /// It has NOT been forwarded: the controller validates the status line
    /// first and feeds the tail back in on a 200.
    HeaderComplete { payload: &'a [u8] },
    /// Payload bytes forwarded to the ring buffer in this call
    Streamed(usize),
}

enum Mode {
    Header,
    Payload,
}

/// Stateful demultiplexer for one connection attempt.
///
/// `init` resets all counters; call it before the first `feed` of every
/// attempt. State is mutated only by `feed`, from the network context.
pub struct StreamDemuxer {
    ring: Arc<RingBuffer>,
    metadata_tx: Option<Sender<StreamMetadata>>,
    mode: Mode,
    header_buf: Vec<u8>,
    /// Audio bytes between metadata blocks; 0 = no interleaving
    metaint: usize,
    /// Audio bytes delivered since the last metadata block start
    metaint_cnt: usize,
    /// Remaining bytes of the current metadata block (incl. length byte)
    skip_next_bytes: usize,
    /// Reassembles one metadata block across read boundaries
    meta_scratch: Vec<u8>,
    last_title: String,
}

impl StreamDemuxer {
    pub fn new(ring: Arc<RingBuffer>) -> Self {
        Self {
            ring,
            metadata_tx: None,
            mode: Mode::Header,
            header_buf: Vec::new(),
            metaint: 0,
            metaint_cnt: 0,
            skip_next_bytes: 0,
            meta_scratch: Vec::new(),
            last_title: String::new(),
        }
    }

    /// Publish distinct stream titles on `tx` as metadata blocks complete
    pub fn set_metadata_sender(&mut self, tx: Sender<StreamMetadata>) {
        self.metadata_tx = Some(tx);
    }

    /// Reset for a new connection attempt
    pub fn init(&mut self) {
        self.mode = Mode::Header;
        self.header_buf.clear();
        self.metaint = 0;
        self.metaint_cnt = 0;
        self.skip_next_bytes = 0;
        self.meta_scratch.clear();
        self.last_title.clear();
    }

    /// The accumulated header block, valid after `HeaderComplete`
    pub fn header_block(&self) -> &[u8] {
        &self.header_buf
    }

    /// Title of the most recent metadata block, if any
    pub fn current_title(&self) -> Option<&str> {
        (!self.last_title.is_empty()).then_some(self.last_title.as_str())
    }

    /// Consume one network read.
    pub fn feed<'a>(&mut self, buf: &'a [u8]) -> Result<Feed<'a>> {
        match self.mode {
            Mode::Header => self.feed_header(buf),
            Mode::Payload => self.feed_payload(buf).map(Feed::Streamed),
        }
    }

    fn feed_header<'a>(&mut self, buf: &'a [u8]) -> Result<Feed<'a>> {
        let old_len = self.header_buf.len();
        self.header_buf.extend_from_slice(buf);

        // The terminator may span the previous read boundary
        let scan_from = old_len.saturating_sub(3);
        let found = self.header_buf[scan_from..]
            .windows(4)
            .position(|w| w == b"\r\n\r\n");

        let Some(rel) = found else {
            if self.header_buf.len() > MAX_HEADER_BYTES {
                return Err(RadioError::Protocol("response header too large".into()));
            }
            return Ok(Feed::NeedMoreHeaderBytes);
        };

        let header_end = scan_from + rel + 4;
        let consumed_from_buf = header_end - old_len;
        self.header_buf.truncate(header_end);

        self.metaint = header::icy_metaint(&self.header_buf);
        self.metaint_cnt = 0;
        self.skip_next_bytes = 0;
        self.meta_scratch.clear();
        self.mode = Mode::Payload;
        tracing::debug!(metaint = self.metaint, "response header complete");

        Ok(Feed::HeaderComplete {
            payload: &buf[consumed_from_buf..],
        })
    }

    fn feed_payload(&mut self, buf: &[u8]) -> Result<usize> {
        let mut pos = 0;
        let mut forwarded = 0;

        while pos < buf.len() {
            if self.skip_next_bytes > 0 {
                let take = self.skip_next_bytes.min(buf.len() - pos);
                self.capture_metadata(&buf[pos..pos + take])?;
                self.skip_next_bytes -= take;
                pos += take;
                if self.skip_next_bytes == 0 {
                    self.finish_metadata_block();
                }
                continue;
            }

            if self.metaint > 0 {
                let until_boundary = self.metaint - self.metaint_cnt;
                let avail = buf.len() - pos;
                if avail > until_boundary {
                    // The length byte is inside this read: play up to the
                    // boundary, then start skipping length byte + block.
                    forwarded += self.forward(&buf[pos..pos + until_boundary])?;
                    pos += until_boundary;
                    let block_len = buf[pos] as usize * 16;
                    self.skip_next_bytes = block_len + 1;
                    self.metaint_cnt = self.metaint;
                } else {
                    forwarded += self.forward(&buf[pos..])?;
                    self.metaint_cnt += avail;
                    pos = buf.len();
                }
            } else {
                forwarded += self.forward(&buf[pos..])?;
                pos = buf.len();
            }
        }
        Ok(forwarded)
    }

    /// Accumulate skipped bytes for title reconstruction. Overflow is an
    /// error: truncating would desynchronize the boundary arithmetic.
    fn capture_metadata(&mut self, bytes: &[u8]) -> Result<()> {
        if self.meta_scratch.len() + bytes.len() > ICY_SCRATCH_SIZE {
            return Err(RadioError::MetadataOverflow);
        }
        self.meta_scratch.extend_from_slice(bytes);
        Ok(())
    }

    fn finish_metadata_block(&mut self) {
        self.metaint_cnt = 0;
        // scratch[0] is the length byte, the rest is padded metadata text
        if self.meta_scratch.len() > 1 {
            if let Some(title) = metadata::icy_title(&self.meta_scratch[1..]) {
                if title != self.last_title {
                    tracing::info!(%title, "stream title");
                    if let Some(tx) = &self.metadata_tx {
                        let _ = tx.send(StreamMetadata::from_icy_title(&title));
                    }
                    self.last_title = title;
                }
            }
        }
        self.meta_scratch.clear();
    }

    /// Push payload into the ring, retrying truncated puts. `put` never
    /// blocks; the short sleep paces the producer against the playback
    /// context draining the buffer.
    fn forward(&self, mut data: &[u8]) -> Result<usize> {
        let total = data.len();
        while !data.is_empty() {
            let accepted = self.ring.put(data)?;
            data = &data[accepted..];
            if !data.is_empty() {
                thread::sleep(Duration::from_millis(FEED_RETRY_SLEEP_MS));
            }
        }
        Ok(total)
    }

    #[cfg(test)]
    fn counters(&self) -> (usize, usize) {
        (self.metaint_cnt, self.skip_next_bytes)
    }
}
