//! Multicast receive loop.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use sacn_parser::{is_data_packet, DmxDataPacket};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::ReceiverConfig;
use crate::error::{ReceiverError, Result};
use crate::multicast::{bind_socket, join_groups};
use crate::stats::ReceiverStats;

/// Consumer of decoded data packets.
///
/// Called on the receive task for every accepted packet, so implementations
/// must return quickly and never block on I/O.
pub trait PacketHandler: Send + Sync {
    fn handle_packet(&self, packet: DmxDataPacket);
}

impl<F> PacketHandler for F
where
    F: Fn(DmxDataPacket) + Send + Sync,
{
    fn handle_packet(&self, packet: DmxDataPacket) {
        self(packet)
    }
}

/// sACN receiver joined to the multicast groups of a set of universes.
///
/// Lifecycle: [`bind`](Self::bind) opens the socket and joins the groups,
/// [`start`](Self::start) spawns the receive loop, and
/// [`shutdown`](Self::shutdown) stops it and leaves the groups.
///
/// ```no_run
/// use std::sync::Arc;
/// use sacn_parser::DmxDataPacket;
/// use sacn_stream::{MulticastReceiver, ReceiverConfig};
///
/// # async fn example() -> sacn_stream::Result<()> {
/// let mut receiver = MulticastReceiver::bind(&[1, 2], ReceiverConfig::default()).await?;
/// receiver.start(Arc::new(|packet: DmxDataPacket| {
///     println!("universe {} from {}", packet.universe, packet.source_name);
/// }))?;
/// // ...
/// receiver.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct MulticastReceiver {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    config: ReceiverConfig,
    /// Joined (universe, group) pairs
    groups: Vec<(u16, Ipv4Addr)>,
    stats: Arc<ReceiverStats>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<Result<()>>>,
    started: bool,
}

impl MulticastReceiver {
    /// Bind the sACN port and join the group of every universe.
    ///
    /// Duplicate universes are joined once. Must be called from within a
    /// Tokio runtime.
    pub async fn bind(universes: &[u16], config: ReceiverConfig) -> Result<Self> {
        let mut universes = universes.to_vec();
        universes.sort_unstable();
        universes.dedup();

        let std_socket = bind_socket(config.port)?;
        let groups = join_groups(&std_socket, &universes, config.interface)?;

        let bind_error = |source| ReceiverError::Bind {
            addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port),
            source,
        };
        let socket = UdpSocket::from_std(std_socket).map_err(bind_error)?;
        let local_addr = socket.local_addr().map_err(bind_error)?;

        tracing::info!(
            "sACN receiver listening on {} for {} universe(s)",
            local_addr,
            groups.len()
        );

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            config,
            groups,
            stats: Arc::new(ReceiverStats::new()),
            shutdown_tx,
            task: None,
            started: false,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Universes whose groups are currently joined
    pub fn universes(&self) -> Vec<u16> {
        self.groups.iter().map(|(universe, _)| *universe).collect()
    }

    pub fn stats(&self) -> Arc<ReceiverStats> {
        Arc::clone(&self.stats)
    }

    /// Spawn the receive loop, delivering packets to `handler`.
    pub fn start(&mut self, handler: Arc<dyn PacketHandler>) -> Result<()> {
        if self.started {
            return Err(ReceiverError::AlreadyStarted);
        }
        self.started = true;

        let task = tokio::spawn(receive_loop(
            Arc::clone(&self.socket),
            handler,
            Arc::clone(&self.stats),
            self.shutdown_tx.subscribe(),
            self.config.buffer_size,
            self.config.stats_interval,
        ));
        self.task = Some(task);
        Ok(())
    }

    /// Resolve when the receive loop stops on its own.
    ///
    /// The loop only stops by itself on a fatal socket error, which is
    /// returned here. Pending forever if the loop was never started or has
    /// already been observed.
    pub async fn closed(&mut self) -> Result<()> {
        let Some(task) = self.task.as_mut() else {
            return std::future::pending().await;
        };
        let joined = task.await;
        self.task = None;
        match joined {
            Ok(result) => result,
            Err(e) => Err(ReceiverError::Shutdown(e.to_string())),
        }
    }

    /// Stop the receive loop and leave every joined group.
    ///
    /// Waits at most `shutdown_timeout` for the loop; a loop that does not
    /// stop in time is aborted. All groups are left even if one fails; the
    /// first failure is returned.
    pub async fn shutdown(&mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        let mut outcome = Ok(());

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => outcome = Err(e),
                Ok(Err(e)) => outcome = Err(ReceiverError::Shutdown(e.to_string())),
                Err(_) => {
                    task.abort();
                    tracing::warn!("sACN receive loop did not stop in time, aborted");
                    outcome = Err(ReceiverError::Shutdown(
                        "receive loop did not stop within timeout".to_string(),
                    ));
                }
            }
        }

        for (universe, group) in std::mem::take(&mut self.groups) {
            match self.socket.leave_multicast_v4(group, self.config.interface) {
                Ok(()) => tracing::debug!("Left multicast group {} for universe {}", group, universe),
                Err(source) => {
                    tracing::warn!(
                        "Failed to leave multicast group {} for universe {}: {}",
                        group,
                        universe,
                        source
                    );
                    if outcome.is_ok() {
                        outcome = Err(ReceiverError::LeaveGroup {
                            universe,
                            group,
                            source,
                        });
                    }
                }
            }
        }

        tracing::info!("sACN receiver stopped");
        outcome
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    handler: Arc<dyn PacketHandler>,
    stats: Arc<ReceiverStats>,
    mut shutdown_rx: watch::Receiver<bool>,
    buffer_size: usize,
    stats_interval: Duration,
) -> Result<()> {
    let mut buf = vec![0u8; buffer_size];
    let mut ticker = tokio::time::interval(stats_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    if *shutdown_rx.borrow_and_update() {
        return Ok(());
    }

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::debug!("sACN receive loop stopping");
                    return Ok(());
                }
            }

            _ = ticker.tick() => {
                let count = stats.roll_window();
                tracing::debug!(packets_per_second = count, "sACN receive rate");
            }

            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((len, peer)) => handle_datagram(&buf[..len], peer, handler.as_ref(), &stats),
                    Err(e) if is_transient(&e) => continue,
                    Err(e) => {
                        tracing::error!("sACN receive failed: {}", e);
                        return Err(ReceiverError::Receive(e));
                    }
                }
            }
        }
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

fn handle_datagram(
    bytes: &[u8],
    peer: SocketAddr,
    handler: &dyn PacketHandler,
    stats: &ReceiverStats,
) {
    if !is_data_packet(bytes) {
        stats.record_ignored();
        tracing::trace!("Ignoring {}-byte non-sACN datagram from {}", bytes.len(), peer);
        return;
    }

    match DmxDataPacket::from_bytes(bytes) {
        Ok(packet) => {
            stats.record_accepted();
            handler.handle_packet(packet);
        }
        Err(e) => {
            stats.record_decode_error();
            tracing::warn!("Dropping malformed sACN packet from {}: {}", peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sacn_parser::test_support::PacketBuilder;
    use std::sync::Mutex;

    fn peer() -> SocketAddr {
        "192.0.2.10:5568".parse().unwrap()
    }

    #[test]
    fn test_handle_datagram_routes_by_validity() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let handler = move |packet: DmxDataPacket| sink.lock().unwrap().push(packet.universe);
        let stats = ReceiverStats::new();

        let valid = PacketBuilder::new().universe(7).build();
        handle_datagram(&valid, peer(), &handler, &stats);

        handle_datagram(b"not sacn at all", peer(), &handler, &stats);

        // Passes the marker check but declares more payload than it carries
        let mut overrun = PacketBuilder::new().payload(vec![0u8; 4]).build();
        overrun[123..125].copy_from_slice(&600u16.to_be_bytes());
        handle_datagram(&overrun, peer(), &handler, &stats);

        assert_eq!(*received.lock().unwrap(), vec![7]);
        assert_eq!(stats.accepted(), 1);
        assert_eq!(stats.ignored(), 1);
        assert_eq!(stats.decode_errors(), 1);
    }

    #[tokio::test]
    async fn test_loop_exits_when_shutdown_already_signalled() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let (tx, rx) = watch::channel(true);
        let handler: Arc<dyn PacketHandler> = Arc::new(|_: DmxDataPacket| {});

        let result = receive_loop(
            socket,
            handler,
            Arc::new(ReceiverStats::new()),
            rx,
            1500,
            Duration::from_secs(1),
        )
        .await;

        assert!(result.is_ok());
        drop(tx);
    }
}
