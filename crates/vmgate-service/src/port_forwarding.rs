//! Internal user-space port forwarding.
//!
//! On hosts where the vendor NAT forwarding is unavailable (Fusion on
//! Big Sur and later) the daemon relays traffic itself: each forward
//! owns a host-side listener task, every accepted TCP connection dials
//! the guest and runs two copy loops until either side closes, and UDP
//! forwards run a single host-to-guest copy loop over a connected
//! socket pair.
//!
//! UDP forwards carry single-peer semantics: replies from multiple
//! guest peers on one host socket are not demultiplexed.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use vmgate_settings::{Forward, PortForwardingSettings};

use crate::error::{Result, ServiceError};

struct ActiveForward {
    fwd: Forward,
    active: bool,
    cancel: CancellationToken,
}

/// The internal port forwarding service.
pub struct PortForwarding {
    forwards: Mutex<Vec<ActiveForward>>,
    settings: Arc<PortForwardingSettings>,
}

impl PortForwarding {
    /// Builds the service around the persistent forward store.
    #[must_use]
    pub fn new(settings: Arc<PortForwardingSettings>) -> Self {
        Self {
            forwards: Mutex::new(Vec::new()),
            settings,
        }
    }

    /// Loads persisted forwards into the service (inactive).
    pub async fn load(&self) {
        let mut forwards = self.forwards.lock().await;
        tracing::debug!("loading any persisted port forwards");
        for fwd in self.settings.forwards() {
            tracing::trace!(host = %fwd.host, guest = %fwd.guest, "persisted port forward found");
            forwards.push(ActiveForward {
                fwd,
                active: false,
                cancel: CancellationToken::new(),
            });
        }
    }

    /// Activates every inactive forward.
    ///
    /// # Errors
    ///
    /// Returns the first activation failure.
    pub async fn start(&self) -> Result<()> {
        let mut forwards = self.forwards.lock().await;
        tracing::debug!("starting port forwarding service");
        for entry in forwards.iter_mut() {
            if entry.active {
                tracing::trace!(host = %entry.fwd.host, "port forward already active");
                continue;
            }
            entry.cancel = CancellationToken::new();
            activate(&entry.fwd, entry.cancel.clone()).await?;
            entry.active = true;
        }
        Ok(())
    }

    /// Deactivates every active forward.
    pub async fn stop(&self) {
        let mut forwards = self.forwards.lock().await;
        for entry in forwards.iter_mut() {
            if entry.active {
                entry.cancel.cancel();
                entry.active = false;
            }
        }
    }

    /// Persists then activates a new forward.
    ///
    /// # Errors
    ///
    /// Returns an error when persistence or activation fails; a
    /// persisted forward that failed to activate stays registered and
    /// is retried on the next [`PortForwarding::start`].
    pub async fn add(&self, fwd: Forward) -> Result<()> {
        let mut forwards = self.forwards.lock().await;
        tracing::debug!(host = %fwd.host, guest = %fwd.guest, "adding new port forward");
        self.settings.add(fwd.clone())?;

        let cancel = CancellationToken::new();
        let result = activate(&fwd, cancel.clone()).await;
        let active = result.is_ok();
        if let Err(err) = &result {
            tracing::error!(host = %fwd.host, error = %err,
                "failed to activate new port forward");
        }
        forwards.push(ActiveForward { fwd, active, cancel });
        result
    }

    /// Deactivates then unpersists a forward. Unknown forwards are a
    /// logged noop.
    ///
    /// # Errors
    ///
    /// Returns an error when persistence fails.
    pub async fn remove(&self, fwd: &Forward) -> Result<()> {
        let mut forwards = self.forwards.lock().await;
        tracing::debug!(host = %fwd.host, "removing port forward");
        if let Some(idx) = forwards.iter().position(|e| &e.fwd == fwd) {
            let entry = forwards.remove(idx);
            entry.cancel.cancel();
            self.settings.delete(fwd)?;
        } else {
            tracing::warn!(host = %fwd.host, "failed to locate port forward for removal");
        }
        Ok(())
    }

    /// Returns a snapshot of the registered forwards.
    pub async fn fwds(&self) -> Vec<Forward> {
        self.forwards.lock().await.iter().map(|e| e.fwd.clone()).collect()
    }
}

/// Binds the host leg of `fwd` and spawns its relay task(s).
async fn activate(fwd: &Forward, cancel: CancellationToken) -> Result<()> {
    if fwd.host.kind.contains("tcp") {
        let listener = TcpListener::bind(fwd.host.to_string()).await.map_err(|err| {
            tracing::error!(host = %fwd.host, error = %err, "failed to setup host listener");
            ServiceError::PortForward(format!("failed to bind {}: {err}", fwd.host))
        })?;
        let guest = fwd.guest.to_string();
        tracing::debug!(host = %fwd.host, guest = %guest, "activated tcp port forward");
        tokio::spawn(tcp_listener_task(listener, guest, cancel.clone()));
    }

    if fwd.host.kind.contains("udp") {
        let socket = UdpSocket::bind(fwd.host.to_string()).await.map_err(|err| {
            tracing::error!(host = %fwd.host, error = %err, "failed to setup host listener");
            ServiceError::PortForward(format!("failed to bind {}: {err}", fwd.host))
        })?;
        let upstream = UdpSocket::bind("0.0.0.0:0").await?;
        upstream.connect(fwd.guest.to_string()).await.map_err(|err| {
            tracing::error!(guest = %fwd.guest, error = %err, "failed to connect to guest");
            ServiceError::PortForward(format!("failed to reach {}: {err}", fwd.guest))
        })?;
        tracing::debug!(host = %fwd.host, guest = %fwd.guest, "activated udp port forward");
        tokio::spawn(udp_relay_task(socket, upstream, cancel.clone()));
    }

    Ok(())
}

/// Accepts connections until cancelled, spawning one relay per
/// connection.
async fn tcp_listener_task(listener: TcpListener, guest: String, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = listener.accept() => {
                match result {
                    Ok((client, peer)) => {
                        tracing::debug!(%peer, guest = %guest, "incoming connection");
                        let guest = guest.clone();
                        let conn_cancel = cancel.child_token();
                        tokio::spawn(async move {
                            match TcpStream::connect(&guest).await {
                                Ok(upstream) => {
                                    tcp_relay(client, upstream, conn_cancel).await;
                                }
                                Err(err) => {
                                    tracing::warn!(guest = %guest, error = %err,
                                        "failed to connect to guest");
                                }
                            }
                        });
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "failed to accept incoming connection");
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
    }
    tracing::debug!("tcp listener closed");
}

/// Runs both copy directions for one connection. Either direction
/// finishing, an error on either half, or cancellation tears down both
/// sockets.
async fn tcp_relay(client: TcpStream, upstream: TcpStream, cancel: CancellationToken) {
    let (mut client_read, mut client_write) = client.into_split();
    let (mut upstream_read, mut upstream_write) = upstream.into_split();

    tokio::select! {
        _ = cancel.cancelled() => {}
        result = tokio::io::copy(&mut client_read, &mut upstream_write) => {
            tracing::debug!(direction = "outgoing", bytes = result.as_ref().ok(),
                "connection stream complete");
        }
        result = tokio::io::copy(&mut upstream_read, &mut client_write) => {
            tracing::debug!(direction = "incoming", bytes = result.as_ref().ok(),
                "connection stream complete");
        }
    }
    let _ = client_write.shutdown().await;
    let _ = upstream_write.shutdown().await;
}

/// Copies datagrams host -> guest until cancelled.
async fn udp_relay_task(socket: UdpSocket, upstream: UdpSocket, cancel: CancellationToken) {
    let mut buf = vec![0u8; 65535];
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((n, _peer)) => {
                        if upstream.send(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "udp receive failed");
                        break;
                    }
                }
            }
        }
    }
    tracing::debug!("udp relay closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use vmgate_settings::Address;

    fn service(dir: &TempDir) -> PortForwarding {
        let settings = Arc::new(
            PortForwardingSettings::load(dir.path().join("portforwarding.json")).unwrap(),
        );
        PortForwarding::new(settings)
    }

    /// Grabs a port the kernel considers free right now.
    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn forward(host_port: u16, guest_port: u16, kind: &str) -> Forward {
        Forward {
            host: Address::new("127.0.0.1", host_port, kind),
            guest: Address::new("127.0.0.1", guest_port, kind),
            description: "vagrant: /tmp/test.vmx".to_string(),
        }
    }

    #[tokio::test]
    async fn tcp_forward_relays_both_directions() {
        // Guest-side echo server.
        let guest_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let guest_port = guest_listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = guest_listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..n]).await.unwrap();
        });

        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let host_port = free_port().await;
        svc.add(forward(host_port, guest_port, "tcp")).await.unwrap();

        let mut client = TcpStream::connect(("127.0.0.1", host_port)).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn remove_closes_listener() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let host_port = free_port().await;
        let fwd = forward(host_port, 1, "tcp");
        svc.add(fwd.clone()).await.unwrap();
        assert_eq!(svc.fwds().await.len(), 1);

        svc.remove(&fwd).await.unwrap();
        assert!(svc.fwds().await.is_empty());
        assert!(svc.settings.forwards().is_empty());

        // Give the listener task a beat to observe cancellation, then
        // the port must be rebindable.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        TcpListener::bind(("127.0.0.1", host_port)).await.unwrap();
    }

    #[tokio::test]
    async fn udp_forward_relays_datagrams() {
        let guest = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let guest_port = guest.local_addr().unwrap().port();

        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let host_port = free_port().await;
        svc.add(forward(host_port, guest_port, "udp")).await.unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(b"datagram", ("127.0.0.1", host_port))
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            guest.recv_from(&mut buf),
        )
        .await
        .expect("datagram not relayed")
        .unwrap();
        assert_eq!(&buf[..n], b"datagram");
    }

    #[tokio::test]
    async fn load_and_start_activate_persisted_forwards() {
        let guest_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let guest_port = guest_listener.local_addr().unwrap().port();

        let dir = TempDir::new().unwrap();
        let host_port = free_port().await;
        {
            let settings = PortForwardingSettings::load(
                dir.path().join("portforwarding.json"),
            )
            .unwrap();
            settings.add(forward(host_port, guest_port, "tcp")).unwrap();
        }

        let svc = service(&dir);
        svc.load().await;
        svc.start().await.unwrap();

        TcpStream::connect(("127.0.0.1", host_port)).await.unwrap();
        svc.stop().await;
    }
}
