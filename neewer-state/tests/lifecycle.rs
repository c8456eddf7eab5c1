//! Send and heartbeat tasks against the mock transport, on paused time.

use std::sync::Arc;
use std::time::Duration;

use neewer_state::{
    color_command, spawn_heartbeat_task, spawn_send_task, Fixture, FixtureConfig, FixtureTiming,
    Hsv, LinkStatus, ShutdownSignal, HEARTBEAT_COMMAND, READ_CHARACTERISTIC_UUID,
    WRITE_CHARACTERISTIC_UUID,
};
use neewer_transport::mock::MockTransport;
use neewer_transport::DeviceId;

fn setup() -> (MockTransport, Arc<Fixture>) {
    let mock = MockTransport::new();
    let fixture = Arc::new(Fixture::new(
        FixtureConfig::new(DeviceId::new("AA:BB:CC:DD:EE:02").unwrap(), 1, 1),
        Arc::new(mock.clone()),
        FixtureTiming::default(),
    ));
    (mock, fixture)
}

fn color_writes(mock: &MockTransport) -> Vec<Vec<u8>> {
    mock.written_values(WRITE_CHARACTERISTIC_UUID)
        .into_iter()
        .filter(|data| data.as_slice() != HEARTBEAT_COMMAND)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_send_task_writes_color_once_per_change() {
    let (mock, fixture) = setup();
    let shutdown = ShutdownSignal::new();

    fixture.apply_color(255, 0, 0);
    fixture.connect().await.unwrap();
    let send = spawn_send_task(Arc::clone(&fixture), shutdown.subscribe());

    tokio::time::sleep(Duration::from_secs(1)).await;
    fixture.apply_color(255, 0, 0);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        color_writes(&mock),
        vec![color_command(Hsv::new(0, 100, 100)).to_vec()]
    );

    shutdown.trigger();
    send.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_silent_light_is_disconnected() {
    let (mock, fixture) = setup();
    let shutdown = ShutdownSignal::new();

    fixture.connect().await.unwrap();
    let heartbeat = spawn_heartbeat_task(Arc::clone(&fixture), shutdown.subscribe());

    // First tick at 3s is within the window; the tick at 6s finds 6s of silence
    tokio::time::sleep(Duration::from_millis(6_500)).await;

    assert_eq!(fixture.link_status(), LinkStatus::Disconnected);
    assert_eq!(mock.disconnects().len(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(mock.disconnects().len(), 1);

    shutdown.trigger();
    heartbeat.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_replying_light_stays_connected() {
    let (mock, fixture) = setup();
    let shutdown = ShutdownSignal::new();

    fixture.connect().await.unwrap();
    let link = fixture.link().unwrap();
    let heartbeat = spawn_heartbeat_task(Arc::clone(&fixture), shutdown.subscribe());

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(mock.notify(link.id, READ_CHARACTERISTIC_UUID, &[0x78, 0x01]));
    }

    assert_eq!(fixture.link_status(), LinkStatus::Connected);
    assert!(mock.disconnects().is_empty());
    assert!(mock.read_count() >= 3);

    shutdown.trigger();
    heartbeat.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_tasks_stop_on_shutdown() {
    let (_mock, fixture) = setup();
    let shutdown = ShutdownSignal::new();

    let send = spawn_send_task(Arc::clone(&fixture), shutdown.subscribe());
    let heartbeat = spawn_heartbeat_task(Arc::clone(&fixture), shutdown.subscribe());

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), async {
        send.await.unwrap();
        heartbeat.await.unwrap();
    })
    .await
    .expect("tasks stop promptly");
}
