//! Operator-station TCP link.
//!
//! Accept-one server: a new connection evicts the prior client. A reader
//! thread per client parses fixed-size `CommandPacket` frames into a
//! mutex-guarded "latest" slot with a new-flag; `get_latest_command`
//! consumes the flag. Telemetry broadcasts are best-effort: a failed write
//! closes the socket and the listener goes back to accepting.

use bridge_ipc::station::{CommandPacket, TelemetryPacket, COMMAND_PACKET_SIZE};
use parking_lot::Mutex;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// Station server configuration.
#[derive(Clone, Debug)]
pub struct StationConfig {
    /// Listen port. 0 binds an ephemeral port (tests).
    pub port: u16,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

#[derive(Default)]
struct LatestCommand {
    packet: CommandPacket,
    fresh: bool,
}

struct Shared {
    running: AtomicBool,
    latest: Mutex<LatestCommand>,
    /// Write half of the active client, if any.
    client: Mutex<Option<TcpStream>>,
}

/// Accept-one TCP server for the operator station.
pub struct StationLink {
    shared: Arc<Shared>,
    port: u16,
    listen_thread: Option<JoinHandle<()>>,
}

impl StationLink {
    /// Bind the listen socket and start the accept thread. A bind failure
    /// is fatal at startup.
    pub fn start(config: StationConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", config.port))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();
        info!(port, "station link listening");

        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            latest: Mutex::new(LatestCommand::default()),
            client: Mutex::new(None),
        });

        let accept_shared = Arc::clone(&shared);
        let listen_thread = std::thread::Builder::new()
            .name("station-accept".into())
            .spawn(move || accept_loop(listener, accept_shared))
            .expect("spawn station accept thread");

        Ok(Self {
            shared,
            port,
            listen_thread: Some(listen_thread),
        })
    }

    /// Bound port (useful when configured with port 0).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Consume the latest operator command, if one arrived since the last
    /// call.
    pub fn get_latest_command(&self) -> Option<CommandPacket> {
        let mut latest = self.shared.latest.lock();
        if latest.fresh {
            latest.fresh = false;
            Some(latest.packet)
        } else {
            None
        }
    }

    /// Best-effort telemetry write to the connected client. On failure the
    /// client is dropped and the listener resumes accepting.
    pub fn broadcast_telemetry(&self, packet: &TelemetryPacket) {
        let mut client = self.shared.client.lock();
        if let Some(stream) = client.as_mut() {
            if let Err(e) = stream.write_all(&packet.to_bytes()) {
                warn!("station telemetry write failed, dropping client: {e}");
                let _ = stream.shutdown(Shutdown::Both);
                *client = None;
            }
        }
    }

    /// Stop the server and join the accept thread.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Relaxed);
        if let Some(stream) = self.shared.client.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.listen_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StationLink {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while shared.running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!(%peer, "station client connected");
                // Accepted sockets inherit the listener's nonblocking mode on
                // some platforms; the client reader relies on timeouts.
                let _ = stream.set_nonblocking(false);
                let _ = stream.set_nodelay(true);
                let _ = stream.set_read_timeout(Some(Duration::from_millis(250)));

                let reader = match stream.try_clone() {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("station client clone failed: {e}");
                        continue;
                    }
                };

                // A new accept evicts the prior client.
                if let Some(old) = shared.client.lock().replace(stream) {
                    let _ = old.shutdown(Shutdown::Both);
                }

                let client_shared = Arc::clone(&shared);
                let _ = std::thread::Builder::new()
                    .name("station-client".into())
                    .spawn(move || client_loop(reader, client_shared));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                warn!("station accept failed: {e}");
                std::thread::sleep(Duration::from_millis(250));
            }
        }
    }
}

fn client_loop(mut stream: TcpStream, shared: Arc<Shared>) {
    let mut buf = [0u8; COMMAND_PACKET_SIZE];
    let mut filled = 0usize;
    while shared.running.load(Ordering::Relaxed) {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return, // peer closed
            Ok(n) => {
                filled += n;
                if filled == COMMAND_PACKET_SIZE {
                    filled = 0;
                    let packet = CommandPacket::from_bytes(&buf);
                    let mut latest = shared.latest.lock();
                    latest.packet = packet;
                    latest.fresh = true;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                // Read timeout: check the running flag and go again.
            }
            Err(_) => {
                // The accept loop evicted this client, or the link dropped.
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_ephemeral() -> StationLink {
        StationLink::start(StationConfig { port: 0 }).unwrap()
    }

    fn connect(port: u16) -> TcpStream {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            match TcpStream::connect(("127.0.0.1", port)) {
                Ok(s) => return s,
                Err(_) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(10))
                }
                Err(e) => panic!("connect failed: {e}"),
            }
        }
    }

    fn wait_for_command(link: &StationLink) -> CommandPacket {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(cmd) = link.get_latest_command() {
                return cmd;
            }
            assert!(std::time::Instant::now() < deadline, "command never arrived");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn command_reaches_latest_slot_once() {
        let mut link = start_ephemeral();
        let mut client = connect(link.port());

        let pkt = CommandPacket {
            pan_velocity: -0.1,
            tilt_velocity: 0.0,
            arm_system: true,
            fire_trigger: true,
        };
        client.write_all(&pkt.to_bytes()).unwrap();

        assert_eq!(wait_for_command(&link), pkt);
        // The flag was consumed: no new command until the client sends again.
        assert!(link.get_latest_command().is_none());

        link.stop();
    }

    #[test]
    fn telemetry_reaches_connected_client() {
        let mut link = start_ephemeral();
        let mut client = connect(link.port());
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        // Send one command first so the accept loop has registered us.
        client
            .write_all(&CommandPacket::default().to_bytes())
            .unwrap();
        wait_for_command(&link);

        let telem = TelemetryPacket {
            timestamp: 4.2,
            pan: 0.1,
            tilt: -0.2,
            target_count: 2,
        };
        link.broadcast_telemetry(&telem);

        let mut buf = [0u8; bridge_ipc::station::TELEMETRY_PACKET_SIZE];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(TelemetryPacket::from_bytes(&buf), telem);

        link.stop();
    }

    #[test]
    fn new_client_evicts_the_old_one() {
        let mut link = start_ephemeral();
        let mut first = connect(link.port());
        first
            .write_all(&CommandPacket::default().to_bytes())
            .unwrap();
        wait_for_command(&link);

        let mut second = connect(link.port());
        let pkt = CommandPacket {
            pan_velocity: 0.5,
            ..Default::default()
        };
        second.write_all(&pkt.to_bytes()).unwrap();
        assert_eq!(wait_for_command(&link), pkt);

        link.stop();
    }
}
