//! Connection controller
//!
//! The state machine that sequences WiFi join, station connect, header
//! parsing, and streaming, and that rotates through the station and
//! access-point lists on failure. All per-attempt errors are absorbed here
//! and turned into "try the next station/AP"; only configuration-store and
//! allocation failures escape `run` for the host runner to decide policy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::audio::DecoderControl;
use crate::config::control::MAX_REDIRECTS;
use crate::config::network::{RECV_BUFFER_SIZE, RECV_IDLE_SLEEP_MS};
use crate::config::wifi::{JOIN_TIMEOUT_SECS, PROVISIONING_SSID};
use crate::error::Result;
use crate::store::{ConfigStore, AP_LIST, STATION_LIST};
use crate::stream::buffer::RingBuffer;
use crate::stream::demux::{Feed, StreamDemuxer};
use crate::stream::header;
use crate::stream::metadata::StreamMetadata;
use crate::stream::resolver::StreamLocation;
use crate::transport::{Connection, RecvOutcome, Transport};

pub mod lists;

/// Controller states. `HtmlHeader` and `AudioStream` are only held while a
/// connection is being pumped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotConnected,
    LinkConnected,
    LoadLocation,
    HtmlHeader,
    AudioStream,
}

/// Why `run` returned
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// No configured access point was reachable; the device now broadcasts
    /// its own open AP and waits for reconfiguration.
    Provisioning,
}

/// Signals from the administrative interface. Replacing a list resets its
/// cursor to the first record.
#[derive(Clone, Default)]
pub struct ReloadHandle {
    stations: Arc<AtomicBool>,
    aps: Arc<AtomicBool>,
}

impl ReloadHandle {
    pub fn reload_first_station(&self) {
        self.stations.store(true, Ordering::SeqCst);
    }

    pub fn reload_first_ap(&self) {
        self.aps.store(true, Ordering::SeqCst);
    }
}

/// How one connection attempt ended
enum AttemptEnd {
    /// Follow `Location` without advancing the station index
    Redirect(String),
    /// Transport/protocol/demux failure: clear, reset, rotate
    StreamError,
    LinkLost,
    ReloadStations,
    ReloadAps,
}

/// Orchestrates the streaming pipeline against the capability traits.
///
/// Owns the session state (current location, list cursors) and the demuxer;
/// shares only the ring buffer with the playback context.
pub struct Controller<T: Transport, C: ConfigStore, D: DecoderControl> {
    transport: T,
    store: C,
    decoder: D,
    ring: Arc<RingBuffer>,
    demux: StreamDemuxer,
    state: State,
    /// Station URI or redirect target currently being tried
    location: String,
    /// False while following a redirect, bypassing the station list
    use_list: bool,
    station_index: usize,
    ap_index: usize,
    redirects: usize,
    reload: ReloadHandle,
}

impl<T: Transport, C: ConfigStore, D: DecoderControl> Controller<T, C, D> {
    pub fn new(transport: T, store: C, decoder: D, ring: Arc<RingBuffer>) -> Self {
        let demux = StreamDemuxer::new(ring.clone());
        Self {
            transport,
            store,
            decoder,
            ring,
            demux,
            state: State::NotConnected,
            location: String::new(),
            use_list: true,
            station_index: 1,
            ap_index: 1,
            redirects: 0,
            reload: ReloadHandle::default(),
        }
    }

    /// Handle for the administrative interface to signal list replacement
    pub fn reload_handle(&self) -> ReloadHandle {
        self.reload.clone()
    }

    /// Publish stream titles on `tx` as they change
    pub fn set_metadata_sender(&mut self, tx: Sender<StreamMetadata>) {
        self.demux.set_metadata_sender(tx);
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn station_index(&self) -> usize {
        self.station_index
    }

    /// Run the controller until it falls back to provisioning mode or hits
    /// a fatal condition. Per-attempt failures never return.
    pub fn run(&mut self) -> Result<RunOutcome> {
        loop {
            if self.reload.aps.swap(false, Ordering::SeqCst) {
                self.ap_index = 1;
                self.state = State::NotConnected;
            }
            if self.reload.stations.swap(false, Ordering::SeqCst) {
                self.use_list = true;
                self.station_index = 1;
                if self.state != State::NotConnected {
                    self.state = State::LoadLocation;
                }
            }
            if self.state != State::NotConnected && !self.transport.link_up() {
                tracing::warn!("wifi link lost");
                self.state = State::NotConnected;
            }

            match self.state {
                State::NotConnected => {
                    if let Some(outcome) = self.join_any_ap()? {
                        return Ok(outcome);
                    }
                }
                State::LinkConnected => self.state = State::LoadLocation,
                State::LoadLocation | State::HtmlHeader | State::AudioStream => {
                    self.connect_and_stream()?;
                }
            }
        }
    }

    /// Walk the AP list from the first record until a join succeeds. An
    /// exhausted list is the designed fallback into provisioning mode.
    fn join_any_ap(&mut self) -> Result<Option<RunOutcome>> {
        self.ap_index = 1;
        let text = self.store.load_list(AP_LIST)?;
        let text = String::from_utf8_lossy(&text).into_owned();
        loop {
            match lists::ap_record(&text, self.ap_index)? {
                None => {
                    tracing::warn!("no reachable access point, starting provisioning AP");
                    self.transport.start_access_point(PROVISIONING_SSID)?;
                    return Ok(Some(RunOutcome::Provisioning));
                }
                Some(credential) => {
                    tracing::info!(ssid = %credential.ssid, "joining access point");
                    let joined = self
                        .transport
                        .join(&credential, Duration::from_secs(JOIN_TIMEOUT_SECS))?;
                    if joined {
                        tracing::info!(ssid = %credential.ssid, "link up");
                        self.state = State::LinkConnected;
                        return Ok(None);
                    }
                    tracing::warn!(ssid = %credential.ssid, "join failed");
                    self.ap_index += 1;
                }
            }
        }
    }

    /// One connection attempt: resolve the location, connect, send the GET
    /// request, then pump received bytes until the attempt ends.
    fn connect_and_stream(&mut self) -> Result<()> {
        if self.use_list {
            let text = self.store.load_list(STATION_LIST)?;
            let text = String::from_utf8_lossy(&text).into_owned();
            let (record, effective) = lists::station_record(&text, self.station_index)?;
            self.station_index = effective;
            self.location = record;
            self.redirects = 0;
        }

        let location = match StreamLocation::parse(&self.location) {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!(location = %self.location, error = %e, "unusable station record");
                self.next_station();
                return Ok(());
            }
        };

        tracing::info!(
            host = %location.host,
            port = location.port,
            secure = location.secure,
            "connecting"
        );
        let mut conn = match self
            .transport
            .connect(&location.host, location.port, location.secure)
        {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "connect failed");
                self.next_station();
                return Ok(());
            }
        };
        if let Err(e) = conn.send(location.request().as_bytes()) {
            tracing::warn!(error = %e, "request send failed");
            self.next_station();
            return Ok(());
        }

        self.state = State::HtmlHeader;
        let end = self.pump(&mut conn)?;
        drop(conn);
        self.finish_attempt(end)
    }

    /// Receive loop for one open connection. Recoverable errors become
    /// `AttemptEnd`s; fatal ones propagate.
    fn pump(&mut self, conn: &mut T::Conn) -> Result<AttemptEnd> {
        self.demux.init();
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            if self.reload.aps.swap(false, Ordering::SeqCst) {
                return Ok(AttemptEnd::ReloadAps);
            }
            if self.reload.stations.swap(false, Ordering::SeqCst) {
                return Ok(AttemptEnd::ReloadStations);
            }
            if !self.transport.link_up() {
                tracing::warn!("wifi link lost during stream");
                return Ok(AttemptEnd::LinkLost);
            }

            let n = match conn.recv(&mut buf) {
                Ok(RecvOutcome::Data(n)) => n,
                Ok(RecvOutcome::WouldBlock) => {
                    thread::sleep(Duration::from_millis(RECV_IDLE_SLEEP_MS));
                    continue;
                }
                Ok(RecvOutcome::Closed) => {
                    tracing::info!("connection closed by origin");
                    return Ok(AttemptEnd::StreamError);
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(error = %e, "receive failed");
                    return Ok(AttemptEnd::StreamError);
                }
                Err(e) => return Err(e),
            };

            match self.handle_read(&buf[..n]) {
                Ok(None) => {}
                Ok(Some(end)) => return Ok(end),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(error = %e, "stream aborted");
                    return Ok(AttemptEnd::StreamError);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Route one received read through the demuxer and, once the header is
    /// complete, through the header parser.
    fn handle_read(&mut self, data: &[u8]) -> Result<Option<AttemptEnd>> {
        match self.demux.feed(data)? {
            Feed::NeedMoreHeaderBytes => Ok(None),
            Feed::HeaderComplete { payload } => {
                let head = header::parse_response(self.demux.header_block())?;
                self.use_list = head.use_list;

                if let Some(target) = head.location {
                    tracing::info!(status = head.status, %target, "redirected");
                    return Ok(Some(AttemptEnd::Redirect(target)));
                }
                if head.status != 200 {
                    tracing::warn!(status = head.status, "stream refused");
                    return Ok(Some(AttemptEnd::StreamError));
                }

                tracing::info!(
                    station = head.station_name.as_deref().unwrap_or("-"),
                    content_type = head.content_type.as_deref().unwrap_or("-"),
                    bitrate = head.bitrate.unwrap_or(0),
                    metaint = head.icy_metaint,
                    "headers accepted, streaming"
                );
                self.state = State::AudioStream;
                if !payload.is_empty() {
                    self.demux.feed(payload)?;
                }
                Ok(None)
            }
            Feed::Streamed(_) => Ok(None),
        }
    }

    fn finish_attempt(&mut self, end: AttemptEnd) -> Result<()> {
        match end {
            AttemptEnd::Redirect(target) => {
                self.redirects += 1;
                if self.redirects > MAX_REDIRECTS {
                    tracing::warn!(limit = MAX_REDIRECTS, "redirect limit reached");
                    self.abort_stream()?;
                } else {
                    self.location = target;
                    self.use_list = false;
                    self.state = State::LoadLocation;
                }
            }
            AttemptEnd::StreamError => self.abort_stream()?,
            AttemptEnd::LinkLost | AttemptEnd::ReloadAps => {
                self.state = State::NotConnected;
            }
            AttemptEnd::ReloadStations => {
                self.ring.clear()?;
                self.decoder.reset();
                self.use_list = true;
                self.station_index = 1;
                self.redirects = 0;
                self.state = State::LoadLocation;
            }
        }
        Ok(())
    }

    /// Abnormal stream end: discard buffered audio, put the decoder back
    /// into a clean state, and move to the next station.
    fn abort_stream(&mut self) -> Result<()> {
        self.ring.clear()?;
        self.decoder.reset();
        self.next_station();
        Ok(())
    }

    fn next_station(&mut self) {
        self.use_list = true;
        self.station_index += 1;
        self.redirects = 0;
        self.state = State::LoadLocation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RadioError;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    // --- scripted transport ---

    enum Item {
        Data(Vec<u8>),
        WouldBlock,
        Closed,
        /// Take the link down, then report WouldBlock
        DropLink,
        FireReloadStations(ReloadHandle),
    }

    struct ScriptedConn {
        script: VecDeque<Item>,
        link: Arc<AtomicBool>,
    }

    impl Connection for ScriptedConn {
        fn send(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8]) -> Result<RecvOutcome> {
            match self.script.pop_front() {
                None | Some(Item::Closed) => Ok(RecvOutcome::Closed),
                Some(Item::WouldBlock) => Ok(RecvOutcome::WouldBlock),
                Some(Item::DropLink) => {
                    self.link.store(false, Ordering::SeqCst);
                    Ok(RecvOutcome::WouldBlock)
                }
                Some(Item::FireReloadStations(handle)) => {
                    handle.reload_first_station();
                    Ok(RecvOutcome::WouldBlock)
                }
                Some(Item::Data(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(RecvOutcome::Data(data.len()))
                }
            }
        }
    }

    struct MockTransport {
        joins: VecDeque<bool>,
        /// One entry per expected connect; `None` refuses the connection.
        /// When exhausted the link is dropped so `run` can terminate.
        conns: VecDeque<Option<Vec<Item>>>,
        link: Arc<AtomicBool>,
        connects: Arc<Mutex<Vec<(String, u16, bool)>>>,
        ap_started: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(joins: Vec<bool>, conns: Vec<Option<Vec<Item>>>) -> Self {
            Self {
                joins: joins.into(),
                conns: conns.into(),
                link: Arc::new(AtomicBool::new(true)),
                connects: Arc::new(Mutex::new(Vec::new())),
                ap_started: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Transport for MockTransport {
        type Conn = ScriptedConn;

        fn join(&mut self, _credential: &lists::ApCredential, _timeout: Duration) -> Result<bool> {
            match self.joins.pop_front() {
                Some(ok) => {
                    if ok {
                        self.link.store(true, Ordering::SeqCst);
                    }
                    Ok(ok)
                }
                None => Ok(false),
            }
        }

        fn link_up(&self) -> bool {
            self.link.load(Ordering::SeqCst)
        }

        fn start_access_point(&mut self, _ssid: &str) -> Result<()> {
            self.ap_started.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn connect(&mut self, host: &str, port: u16, secure: bool) -> Result<ScriptedConn> {
            self.connects
                .lock()
                .unwrap()
                .push((host.to_string(), port, secure));
            match self.conns.pop_front() {
                Some(Some(script)) => Ok(ScriptedConn {
                    script: script.into(),
                    link: self.link.clone(),
                }),
                Some(None) => Err(RadioError::Transport("connection refused".into())),
                None => {
                    self.link.store(false, Ordering::SeqCst);
                    Err(RadioError::Transport("connection refused".into()))
                }
            }
        }
    }

    struct MemStore {
        lists: HashMap<&'static str, Vec<u8>>,
    }

    impl MemStore {
        fn new(stations: &str, aps: &str) -> Self {
            let mut lists = HashMap::new();
            lists.insert(STATION_LIST, stations.as_bytes().to_vec());
            lists.insert(AP_LIST, aps.as_bytes().to_vec());
            Self { lists }
        }
    }

    impl ConfigStore for MemStore {
        fn load_list(&self, name: &str) -> Result<Vec<u8>> {
            self.lists
                .get(name)
                .cloned()
                .ok_or_else(|| RadioError::Config(format!("no list {name}")))
        }

        fn save_list(&self, _name: &str, _data: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct CountingDecoder {
        resets: Arc<Mutex<usize>>,
    }

    impl DecoderControl for CountingDecoder {
        fn reset(&mut self) {
            *self.resets.lock().unwrap() += 1;
        }
    }

    fn controller(
        transport: MockTransport,
        stations: &str,
    ) -> Controller<MockTransport, MemStore, CountingDecoder> {
        let ring = Arc::new(RingBuffer::new());
        ring.init(64).unwrap();
        Controller::new(
            transport,
            MemStore::new(stations, "HomeNet/hunter2"),
            CountingDecoder::default(),
            ring,
        )
    }

    fn ring_contents(ring: &RingBuffer) -> Vec<u8> {
        let mut out = vec![0u8; 1024];
        let n = ring.get(&mut out).unwrap();
        out.truncate(n);
        out
    }

    const OK_META8: &[u8] = b"HTTP/1.1 200 OK\r\nicy-metaint: 8\r\n\r\n";

    // --- end-to-end ---

    #[test]
    fn stream_with_metadata_reaches_ring_intact() {
        // Header, then "12345678" + length byte 0 + "ABCDEFGH" split across
        // two reads at an arbitrary offset.
        let mut payload = Vec::new();
        payload.extend_from_slice(b"12345678");
        payload.push(0);
        payload.extend_from_slice(b"ABCDEFGH");

        let mut first = OK_META8.to_vec();
        first.extend_from_slice(&payload[..5]);

        let transport = MockTransport::new(
            vec![true],
            vec![Some(vec![
                Item::Data(first),
                Item::WouldBlock,
                Item::Data(payload[5..].to_vec()),
                Item::DropLink,
            ])],
        );
        let mut ctl = controller(transport, "http://radio.example:8000/live");

        assert_eq!(ctl.run().unwrap(), RunOutcome::Provisioning);
        assert_eq!(ring_contents(&ctl.ring), b"12345678ABCDEFGH");
    }

    #[test]
    fn station_rotation_walks_list_and_wraps() {
        // three refusals walk the whole list; the fourth wraps to the first
        // record and hits the exhausted script, which drops the link
        let transport = MockTransport::new(vec![true], vec![None, None, None]);
        let connects = transport.connects.clone();
        let mut ctl = controller(
            transport,
            "http://a.example/1\r\nhttp://b.example/2\r\nhttp://c.example/3",
        );

        assert_eq!(ctl.run().unwrap(), RunOutcome::Provisioning);
        let hosts: Vec<String> = connects.lock().unwrap().iter().map(|c| c.0.clone()).collect();
        assert_eq!(hosts, ["a.example", "b.example", "c.example", "a.example"]);
    }

    #[test]
    fn redirect_followed_without_advancing_station() {
        let redirect =
            b"HTTP/1.1 302 Found\r\nLocation: http://redir.example/stream\r\n\r\n".to_vec();
        let mut stream = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
        stream.extend_from_slice(b"AUDIO");

        let transport = MockTransport::new(
            vec![true],
            vec![
                Some(vec![Item::Data(redirect)]),
                Some(vec![Item::Data(stream), Item::DropLink]),
            ],
        );
        let connects = transport.connects.clone();
        let mut ctl = controller(transport, "http://first.example/s");

        assert_eq!(ctl.run().unwrap(), RunOutcome::Provisioning);
        let log = connects.lock().unwrap();
        assert_eq!(log[0].0, "first.example");
        assert_eq!(log[1].0, "redir.example");
        assert_eq!(ctl.station_index(), 1);
        assert_eq!(ring_contents(&ctl.ring), b"AUDIO");
    }

    #[test]
    fn non_200_clears_and_rotates() {
        let transport = MockTransport::new(
            vec![true],
            vec![Some(vec![Item::Data(
                b"HTTP/1.1 404 Not Found\r\n\r\n".to_vec(),
            )])],
        );
        let connects = transport.connects.clone();
        let mut ctl = controller(transport, "http://only.example/s");
        let resets = ctl.decoder.resets.clone();

        assert_eq!(ctl.run().unwrap(), RunOutcome::Provisioning);
        // rotated past the single record and wrapped back to it
        assert_eq!(connects.lock().unwrap().len(), 2);
        assert_eq!(*resets.lock().unwrap(), 1);
    }

    #[test]
    fn malformed_header_rotates_instead_of_halting() {
        let transport = MockTransport::new(
            vec![true],
            vec![Some(vec![Item::Data(b"ICY 200 OK\r\n\r\n".to_vec())])],
        );
        let connects = transport.connects.clone();
        let mut ctl = controller(transport, "http://only.example/s");

        assert_eq!(ctl.run().unwrap(), RunOutcome::Provisioning);
        assert_eq!(connects.lock().unwrap().len(), 2);
    }

    #[test]
    fn metadata_overflow_aborts_stream_and_rotates() {
        let mut read = b"HTTP/1.1 200 OK\r\nicy-metaint:4\r\n\r\n".to_vec();
        read.extend_from_slice(b"abcd");
        read.push(255); // 4081-byte metadata block, beyond the 1024 scratch
        read.extend_from_slice(&[0u8; 900]);

        let transport = MockTransport::new(vec![true], vec![Some(vec![Item::Data(read)]), None]);
        let mut ctl = controller(transport, "http://only.example/s");
        let resets = ctl.decoder.resets.clone();

        assert_eq!(ctl.run().unwrap(), RunOutcome::Provisioning);
        assert_eq!(*resets.lock().unwrap(), 1);
        // buffered audio was discarded with the stream
        assert_eq!(ctl.ring.percentage_fill().unwrap(), 0);
    }

    #[test]
    fn ap_exhaustion_enters_provisioning() {
        let transport = MockTransport::new(vec![false], vec![]);
        let ap_started = transport.ap_started.clone();
        let connects = transport.connects.clone();
        let mut ctl = controller(transport, "http://unused.example/s");

        assert_eq!(ctl.run().unwrap(), RunOutcome::Provisioning);
        assert!(ap_started.load(Ordering::SeqCst));
        assert!(connects.lock().unwrap().is_empty());
    }

    #[test]
    fn reload_stations_during_stream_restarts_from_first() {
        let transport = MockTransport::new(vec![true], vec![]);
        let handle_seed = ReloadHandle::default();

        let mut stream = OK_META8.to_vec();
        stream.extend_from_slice(b"12345678");

        let transport = MockTransport {
            conns: VecDeque::from(vec![Some(vec![
                Item::Data(stream),
                Item::FireReloadStations(handle_seed.clone()),
            ])]),
            ..transport
        };
        let connects = transport.connects.clone();
        let mut ctl = controller(
            transport,
            "http://a.example/1\r\nhttp://b.example/2",
        );
        ctl.reload = handle_seed;
        let resets = ctl.decoder.resets.clone();

        assert_eq!(ctl.run().unwrap(), RunOutcome::Provisioning);
        // buffered audio discarded, decoder reset, cursor back at record 1
        assert_eq!(ctl.ring.percentage_fill().unwrap(), 0);
        assert_eq!(*resets.lock().unwrap(), 1);
        let hosts: Vec<String> = connects.lock().unwrap().iter().map(|c| c.0.clone()).collect();
        assert_eq!(hosts, ["a.example", "a.example"]);
    }

    #[test]
    fn link_loss_keeps_buffered_audio() {
        let mut stream = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
        stream.extend_from_slice(b"KEEP");

        let transport = MockTransport::new(
            vec![true],
            vec![Some(vec![Item::Data(stream), Item::DropLink])],
        );
        let mut ctl = controller(transport, "http://only.example/s");

        assert_eq!(ctl.run().unwrap(), RunOutcome::Provisioning);
        assert_eq!(ring_contents(&ctl.ring), b"KEEP");
    }

    #[test]
    fn redirect_loop_is_bounded() {
        let redirect = || {
            Some(vec![Item::Data(
                b"HTTP/1.1 302 Found\r\nLocation: http://loop.example/s\r\n\r\n".to_vec(),
            )])
        };
        // MAX_REDIRECTS follows plus the initial connect, then the limit
        // trips and the station rotates; the retry hits the exhausted
        // script, which drops the link.
        let mut conns: Vec<Option<Vec<Item>>> = vec![redirect()];
        for _ in 0..MAX_REDIRECTS {
            conns.push(redirect());
        }

        let transport = MockTransport::new(vec![true], conns);
        let connects = transport.connects.clone();
        let mut ctl = controller(transport, "http://start.example/s");

        assert_eq!(ctl.run().unwrap(), RunOutcome::Provisioning);
        let log = connects.lock().unwrap();
        // 1 initial + MAX_REDIRECTS follows + 1 post-rotation retry
        assert_eq!(log.len(), MAX_REDIRECTS + 2);
        // every follow went to the redirect target, never to another station
        for entry in &log[1..=MAX_REDIRECTS] {
            assert_eq!(entry.0, "loop.example");
        }
    }
}
