//! Configuration constants for the wavecast engine

/// Audio ring buffer configuration
pub mod buffer {
    /// Ring buffer capacity in bytes, sized for the decoder's input FIFO pace
    pub const AUDIO_RING_CAPACITY: usize = 4096;
}

/// Network-related configuration
pub mod network {
    /// Socket receive buffer size (bytes)
    pub const RECV_BUFFER_SIZE: usize = 1024;

    /// Scratch buffer for reassembling one ICY metadata block (bytes).
    /// A block larger than this aborts the stream rather than desynchronize
    /// the boundary arithmetic.
    pub const ICY_SCRATCH_SIZE: usize = 1024;

    /// Upper bound on an accumulated HTTP response header (bytes)
    pub const MAX_HEADER_BYTES: usize = 4096;

    /// TCP connect timeout in seconds
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Socket read timeout; expiry is reported as `RecvOutcome::WouldBlock`
    pub const RECV_POLL_TIMEOUT_MS: u64 = 100;

    /// Sleep between empty socket polls (milliseconds)
    pub const RECV_IDLE_SLEEP_MS: u64 = 10;
}

/// WiFi link configuration
pub mod wifi {
    /// Bounded wait for IP acquisition after a join attempt (seconds)
    pub const JOIN_TIMEOUT_SECS: u64 = 6;

    /// SSID broadcast in provisioning mode
    pub const PROVISIONING_SSID: &str = "wavecast";
}

/// Playback context configuration
pub mod playback {
    /// Bytes drained from the ring per sink write
    pub const PLAY_CHUNK_SIZE: usize = 256;

    /// Sleep between chunk writes while playing (milliseconds)
    pub const DRAIN_SLEEP_MS: u64 = 10;

    /// Sleep while waiting for the buffer to fill (milliseconds)
    pub const IDLE_SLEEP_MS: u64 = 500;
}

/// Connection controller configuration
pub mod control {
    /// Redirects followed per connection attempt before the station is
    /// treated as failed. The original design had no bound; two stations
    /// redirecting to each other would loop forever.
    pub const MAX_REDIRECTS: usize = 5;

    /// Sleep before retrying a truncated ring buffer put (milliseconds)
    pub const FEED_RETRY_SLEEP_MS: u64 = 10;
}
