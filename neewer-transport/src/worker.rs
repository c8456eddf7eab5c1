//! Dedicated transport worker thread
//!
//! The Bluetooth stack is driven from a single thread with its own
//! current-thread tokio runtime. The rest of the bridge talks to it through
//! [`WorkerTransport`], which forwards each call as a request message and
//! waits for the reply with a timeout, so a stuck device call can never hold
//! up a fixture task or shutdown indefinitely.

use std::future::Future;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::transport::Transport;
use crate::types::{Advertisement, CharacteristicHandle, DeviceId, LinkId, Notification, ServiceHandle};

const REQUEST_QUEUE_SIZE: usize = 64;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests sent from [`WorkerTransport`] to the worker thread
enum Request {
    StartScan {
        sink: mpsc::Sender<Advertisement>,
        reply: Reply<()>,
    },
    StopScan {
        reply: Reply<()>,
    },
    Connect {
        device: DeviceId,
        reply: Reply<LinkId>,
    },
    DiscoverServices {
        link: LinkId,
        uuid: Uuid,
        reply: Reply<Vec<ServiceHandle>>,
    },
    DiscoverCharacteristics {
        service: ServiceHandle,
        uuid: Uuid,
        reply: Reply<Vec<CharacteristicHandle>>,
    },
    Subscribe {
        characteristic: CharacteristicHandle,
        sink: mpsc::Sender<Notification>,
        reply: Reply<()>,
    },
    Write {
        characteristic: CharacteristicHandle,
        data: Vec<u8>,
        reply: Reply<()>,
    },
    Read {
        characteristic: CharacteristicHandle,
        reply: Reply<Vec<u8>>,
    },
    Disconnect {
        link: LinkId,
        reply: Reply<()>,
    },
    /// Stop the worker loop
    Shutdown,
}

impl Request {
    /// Run the request against the backend and send the reply.
    ///
    /// A dropped reply receiver means the caller timed out; the result is
    /// discarded, except that a link established for nobody is torn down.
    async fn execute<B: Transport>(self, backend: &B) {
        match self {
            Request::StartScan { sink, reply } => {
                let _ = reply.send(backend.start_scan(sink).await);
            }
            Request::StopScan { reply } => {
                let _ = reply.send(backend.stop_scan().await);
            }
            Request::Connect { device, reply } => {
                // A link nobody is waiting for would stay up forever
                if let Err(Ok(link)) = reply.send(backend.connect(&device).await) {
                    tracing::debug!(
                        "Connect to {} finished after the caller gave up, dropping {}",
                        device,
                        link
                    );
                    if let Err(e) = backend.disconnect(link).await {
                        tracing::warn!("Failed to drop abandoned {}: {}", link, e);
                    }
                }
            }
            Request::DiscoverServices { link, uuid, reply } => {
                let _ = reply.send(backend.discover_services(link, uuid).await);
            }
            Request::DiscoverCharacteristics {
                service,
                uuid,
                reply,
            } => {
                let _ = reply.send(backend.discover_characteristics(&service, uuid).await);
            }
            Request::Subscribe {
                characteristic,
                sink,
                reply,
            } => {
                let _ = reply.send(backend.subscribe(&characteristic, sink).await);
            }
            Request::Write {
                characteristic,
                data,
                reply,
            } => {
                let _ = reply.send(backend.write_without_response(&characteristic, &data).await);
            }
            Request::Read {
                characteristic,
                reply,
            } => {
                let _ = reply.send(backend.read(&characteristic).await);
            }
            Request::Disconnect { link, reply } => {
                let _ = reply.send(backend.disconnect(link).await);
            }
            Request::Shutdown => {}
        }
    }
}

/// Spawn the transport worker thread.
///
/// `factory` runs on the worker's own runtime so that any background tasks
/// the backend spawns (event streams, D-Bus connections) live there too.
/// Resolves once the backend is constructed, or with the factory's error.
pub async fn spawn_transport_worker<F, Fut, B>(
    factory: F,
    call_timeout: Duration,
) -> Result<WorkerTransport>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<B>>,
    B: Transport + 'static,
{
    let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_SIZE);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

    let thread = thread::Builder::new()
        .name("transport-worker".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Failed to create tokio runtime for transport worker: {}", e);
                    let _ = ready_tx.send(Err(TransportError::Backend(format!(
                        "failed to create worker runtime: {e}"
                    ))));
                    return;
                }
            };

            rt.block_on(async move {
                let backend = match factory().await {
                    Ok(backend) => Arc::new(backend),
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                run_worker_loop(backend, request_rx).await;
            });
        })
        .map_err(|e| TransportError::Backend(format!("failed to spawn transport worker: {e}")))?;

    ready_rx
        .await
        .map_err(|_| TransportError::WorkerUnavailable)??;

    Ok(WorkerTransport {
        requests: request_tx,
        call_timeout,
        thread: Mutex::new(Some(thread)),
    })
}

async fn run_worker_loop<B: Transport + 'static>(
    backend: Arc<B>,
    mut requests: mpsc::Receiver<Request>,
) {
    tracing::info!("Transport worker started");

    while let Some(request) = requests.recv().await {
        if let Request::Shutdown = request {
            tracing::info!("Transport worker received shutdown command");
            break;
        }
        // Requests run concurrently on this thread's runtime so one slow
        // device cannot stall calls to the others.
        let backend = Arc::clone(&backend);
        tokio::spawn(async move { request.execute(backend.as_ref()).await });
    }

    tracing::info!("Transport worker shut down");
}

/// [`Transport`] handle that forwards every call to the worker thread.
pub struct WorkerTransport {
    requests: mpsc::Sender<Request>,
    call_timeout: Duration,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerTransport {
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Stop the worker and join its thread.
    ///
    /// In-flight calls resolve with [`TransportError::WorkerUnavailable`];
    /// later calls fail the same way.
    pub async fn shutdown(&self) {
        let _ = tokio::time::timeout(self.call_timeout, self.requests.send(Request::Shutdown)).await;

        let handle = self.thread.lock().take();
        let Some(handle) = handle else {
            return;
        };

        let joined = tokio::task::spawn_blocking(move || handle.join());
        match tokio::time::timeout(self.call_timeout, joined).await {
            Ok(Ok(Ok(()))) => tracing::debug!("Transport worker thread joined"),
            Ok(_) => tracing::warn!("Transport worker thread panicked"),
            Err(_) => tracing::warn!(
                "Transport worker thread did not stop within {:?}",
                self.call_timeout
            ),
        }
    }

    async fn call<T>(&self, request: impl FnOnce(Reply<T>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(request(reply_tx))
            .await
            .map_err(|_| TransportError::WorkerUnavailable)?;

        match tokio::time::timeout(self.call_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::WorkerUnavailable),
            Err(_) => Err(TransportError::Timeout(self.call_timeout)),
        }
    }
}

#[async_trait]
impl Transport for WorkerTransport {
    async fn start_scan(&self, sink: mpsc::Sender<Advertisement>) -> Result<()> {
        self.call(|reply| Request::StartScan { sink, reply }).await
    }

    async fn stop_scan(&self) -> Result<()> {
        self.call(|reply| Request::StopScan { reply }).await
    }

    async fn connect(&self, device: &DeviceId) -> Result<LinkId> {
        let device = device.clone();
        self.call(|reply| Request::Connect { device, reply }).await
    }

    async fn discover_services(&self, link: LinkId, uuid: Uuid) -> Result<Vec<ServiceHandle>> {
        self.call(|reply| Request::DiscoverServices { link, uuid, reply })
            .await
    }

    async fn discover_characteristics(
        &self,
        service: &ServiceHandle,
        uuid: Uuid,
    ) -> Result<Vec<CharacteristicHandle>> {
        let service = service.clone();
        self.call(|reply| Request::DiscoverCharacteristics {
            service,
            uuid,
            reply,
        })
        .await
    }

    async fn subscribe(
        &self,
        characteristic: &CharacteristicHandle,
        sink: mpsc::Sender<Notification>,
    ) -> Result<()> {
        let characteristic = characteristic.clone();
        self.call(|reply| Request::Subscribe {
            characteristic,
            sink,
            reply,
        })
        .await
    }

    async fn write_without_response(
        &self,
        characteristic: &CharacteristicHandle,
        data: &[u8],
    ) -> Result<()> {
        let characteristic = characteristic.clone();
        let data = data.to_vec();
        self.call(|reply| Request::Write {
            characteristic,
            data,
            reply,
        })
        .await
    }

    async fn read(&self, characteristic: &CharacteristicHandle) -> Result<Vec<u8>> {
        let characteristic = characteristic.clone();
        self.call(|reply| Request::Read {
            characteristic,
            reply,
        })
        .await
    }

    async fn disconnect(&self, link: LinkId) -> Result<()> {
        self.call(|reply| Request::Disconnect { link, reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn device() -> DeviceId {
        DeviceId::new("AA:BB:CC:DD:EE:01").unwrap()
    }

    #[tokio::test]
    async fn test_calls_reach_backend_on_worker_thread() {
        let mock = MockTransport::new();
        let backend = mock.clone();
        let worker = spawn_transport_worker(move || async move { Ok(backend) }, Duration::from_secs(2))
            .await
            .unwrap();

        let link = worker.connect(&device()).await.unwrap();
        let services = worker.discover_services(link, Uuid::nil()).await.unwrap();
        assert_eq!(services.len(), 1);

        let characteristic = CharacteristicHandle {
            link,
            service: Uuid::nil(),
            uuid: Uuid::nil(),
        };
        worker
            .write_without_response(&characteristic, &[1, 2, 3])
            .await
            .unwrap();

        assert_eq!(mock.connect_count(), 1);
        assert_eq!(mock.written_values(Uuid::nil()), vec![vec![1, 2, 3]]);

        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let mock = MockTransport::new();
        mock.set_connect_delay(Some(Duration::from_secs(5)));
        let backend = mock.clone();
        let worker = spawn_transport_worker(move || async move { Ok(backend) }, Duration::from_millis(50))
            .await
            .unwrap();

        let result = worker.connect(&device()).await;
        assert_eq!(result, Err(TransportError::Timeout(Duration::from_millis(50))));

        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_link_from_timed_out_connect_is_dropped() {
        let mock = MockTransport::new();
        mock.set_connect_delay(Some(Duration::from_millis(200)));
        let backend = mock.clone();
        let worker = spawn_transport_worker(move || async move { Ok(backend) }, Duration::from_millis(50))
            .await
            .unwrap();

        let result = worker.connect(&device()).await;
        assert_eq!(result, Err(TransportError::Timeout(Duration::from_millis(50))));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(mock.connect_count(), 1);
        assert_eq!(mock.disconnects(), vec![LinkId::new(1)]);
        assert!(mock.active_links().is_empty());

        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_fail() {
        let worker = spawn_transport_worker(
            || async { Ok(MockTransport::new()) },
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        worker.shutdown().await;
        assert_eq!(worker.stop_scan().await, Err(TransportError::WorkerUnavailable));
    }

    #[tokio::test]
    async fn test_factory_error_is_returned() {
        let result = spawn_transport_worker(
            || async { Err::<MockTransport, _>(TransportError::NoAdapter) },
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(TransportError::NoAdapter)));
    }
}
