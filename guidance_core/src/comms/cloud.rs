//! Cloud telemetry uplink.
//!
//! A bounded queue feeds a writer thread that owns one framed stream to the
//! ingestor. On write failure the stream is torn down and re-established
//! after an exponential backoff capped at 30 s. Queue overflow drops the
//! oldest packet. A reader loop on the same connection consumes server
//! commands: `ACK` is a no-op, `REBOOT` is logged and never executed.
//! Packets in flight at shutdown are discarded by design.

use crate::comms::proto::{encode_frame, CommandKind, ServerCommand, TelemetryPacket};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use prost::Message;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Cloud uplink configuration.
#[derive(Clone, Debug)]
pub struct CloudConfig {
    /// Ingestor address, `host:port`.
    pub address: String,
    /// Unique id of this pod, stamped on every packet.
    pub unit_id: String,
    /// Outbound queue capacity; overflow drops the oldest packet.
    pub queue_capacity: usize,
    /// First reconnect delay; doubles per failure up to `backoff_max`.
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:50051".into(),
            unit_id: "AEGIS-POD-001".into(),
            queue_capacity: 1024,
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// Handle to the uplink. Any thread may enqueue telemetry.
pub struct CloudLink {
    tx: Sender<TelemetryPacket>,
    /// Drain handle implementing drop-oldest on overflow.
    drain: Receiver<TelemetryPacket>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    writer_thread: Option<JoinHandle<()>>,
}

impl CloudLink {
    /// Start the writer thread. Connection failures are not startup
    /// failures: the writer retries forever with backoff.
    pub fn start(config: CloudConfig) -> Self {
        let (tx, rx) = bounded::<TelemetryPacket>(config.queue_capacity);
        let running = Arc::new(AtomicBool::new(true));
        let dropped = Arc::new(AtomicU64::new(0));

        let writer_running = Arc::clone(&running);
        let drain = rx.clone();
        let writer_thread = std::thread::Builder::new()
            .name("cloud-writer".into())
            .spawn(move || writer_loop(config, rx, writer_running))
            .expect("spawn cloud writer thread");

        Self {
            tx,
            drain,
            running,
            dropped,
            writer_thread: Some(writer_thread),
        }
    }

    /// Queue a packet for upload. When the queue is full the oldest packet
    /// is dropped, counted, and logged.
    pub fn enqueue(&self, packet: TelemetryPacket) {
        match self.tx.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(packet)) => {
                let _ = self.drain.try_recv();
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n.is_power_of_two() {
                    warn!(dropped = n, "cloud queue overflow, dropping oldest");
                }
                let _ = self.tx.try_send(packet);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Total packets lost to queue overflow.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop the writer and reader threads. In-flight packets are discarded.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.writer_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CloudLink {
    fn drop(&mut self) {
        self.stop();
    }
}

fn writer_loop(config: CloudConfig, rx: Receiver<TelemetryPacket>, running: Arc<AtomicBool>) {
    let mut backoff = config.backoff_initial;

    while running.load(Ordering::Relaxed) {
        let stream = match TcpStream::connect(&config.address) {
            Ok(s) => s,
            Err(e) => {
                debug!(address = %config.address, "cloud connect failed: {e}");
                sleep_while_running(&running, backoff);
                backoff = (backoff * 2).min(config.backoff_max);
                continue;
            }
        };
        info!(address = %config.address, "cloud stream established");
        backoff = config.backoff_initial;
        let _ = stream.set_nodelay(true);

        // Reader for this connection's server commands.
        let reader_handle = stream.try_clone().ok().map(|read_half| {
            let reader_running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("cloud-reader".into())
                .spawn(move || reader_loop(read_half, reader_running))
                .expect("spawn cloud reader thread")
        });

        let mut stream = stream;
        loop {
            if !running.load(Ordering::Relaxed) {
                let _ = stream.shutdown(Shutdown::Both);
                break;
            }
            let mut packet = match rx.recv_timeout(Duration::from_millis(250)) {
                Ok(p) => p,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            };

            packet.unit_id = config.unit_id.clone();
            packet.timestamp_ms = wall_clock_ms();

            if let Err(e) = stream.write_all(&encode_frame(&packet)) {
                warn!("cloud stream write failed, reconnecting: {e}");
                let _ = stream.shutdown(Shutdown::Both);
                break;
            }
        }

        if let Some(handle) = reader_handle {
            let _ = handle.join();
        }
        if running.load(Ordering::Relaxed) {
            sleep_while_running(&running, backoff);
            backoff = (backoff * 2).min(config.backoff_max);
        }
    }
}

fn reader_loop(mut stream: TcpStream, running: Arc<AtomicBool>) {
    let _ = stream.set_read_timeout(Some(Duration::from_millis(250)));
    let mut len_buf = [0u8; 4];
    while running.load(Ordering::Relaxed) {
        match read_exact_with_timeout(&mut stream, &mut len_buf, &running) {
            ReadOutcome::Done => {}
            ReadOutcome::Closed => break,
            ReadOutcome::Stopped => break,
        }
        if !running.load(Ordering::Relaxed) {
            break;
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > 4096 {
            warn!(len, "oversized cloud command frame, dropping connection");
            break;
        }
        let mut body = vec![0u8; len];
        match read_exact_with_timeout(&mut stream, &mut body, &running) {
            ReadOutcome::Done => {}
            _ => break,
        }
        match ServerCommand::decode(body.as_slice()) {
            Ok(cmd) => match cmd.command() {
                CommandKind::Ack => {}
                CommandKind::Reboot => {
                    warn!("REBOOT command received from ingestor (not executed)");
                }
            },
            Err(e) => warn!("undecodable server command: {e}"),
        }
    }
    debug!("cloud reader stream closed");
}

enum ReadOutcome {
    Done,
    Closed,
    Stopped,
}

/// `read_exact` that tolerates read timeouts so the thread can observe the
/// shutdown flag.
fn read_exact_with_timeout(
    stream: &mut TcpStream,
    buf: &mut [u8],
    running: &AtomicBool,
) -> ReadOutcome {
    let mut filled = 0;
    while filled < buf.len() {
        if !running.load(Ordering::Relaxed) {
            return ReadOutcome::Stopped;
        }
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return ReadOutcome::Closed,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
            Err(_) => return ReadOutcome::Closed,
        }
    }
    ReadOutcome::Done
}

fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let step = Duration::from_millis(100);
    let mut slept = Duration::ZERO;
    while slept < total && running.load(Ordering::Relaxed) {
        std::thread::sleep(step.min(total - slept));
        slept += step;
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
