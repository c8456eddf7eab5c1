//! Device survey for the `scan` subcommand.

use std::collections::HashSet;
use std::future::Future;

use neewer_transport::{Advertisement, DeviceId, Transport};
use tokio::sync::mpsc;

use crate::error::Result;

const SCAN_QUEUE_SIZE: usize = 64;

/// Which advertisements a scan reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Also report devices that advertise no local name
    pub include_unnamed: bool,
}

impl ScanOptions {
    fn reports(&self, advertisement: &Advertisement) -> bool {
        self.include_unnamed
            || advertisement
                .local_name
                .as_deref()
                .is_some_and(|name| !name.is_empty())
    }
}

/// Scan until `until` resolves, calling `on_device` the first time each
/// reportable device is seen.
///
/// Returns the devices reported, in the order they were first seen.
pub async fn scan_devices<F>(
    transport: &dyn Transport,
    options: ScanOptions,
    until: F,
    mut on_device: impl FnMut(&Advertisement),
) -> Result<Vec<DeviceId>>
where
    F: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::channel(SCAN_QUEUE_SIZE);
    transport.start_scan(tx).await?;
    tracing::info!("Scanning for devices");

    let mut seen = HashSet::new();
    let mut reported = Vec::new();
    tokio::pin!(until);

    loop {
        tokio::select! {
            _ = &mut until => break,
            advertisement = rx.recv() => {
                let Some(advertisement) = advertisement else { break };
                if options.reports(&advertisement) && seen.insert(advertisement.id.clone()) {
                    on_device(&advertisement);
                    reported.push(advertisement.id);
                }
            }
        }
    }

    transport.stop_scan().await?;
    tracing::info!("Scan stopped, {} device(s) seen", reported.len());
    Ok(reported)
}

/// One line of `scan` output
pub fn format_advertisement(advertisement: &Advertisement) -> String {
    let rssi = advertisement
        .rssi
        .map_or_else(|| "-".to_string(), |rssi| format!("{rssi} dBm"));
    format!(
        "{}  {:>8}  {}",
        advertisement.id,
        rssi,
        advertisement.local_name.as_deref().unwrap_or("")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use neewer_transport::mock::MockTransport;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn advertisement(last: u8, name: Option<&str>) -> Advertisement {
        Advertisement {
            id: DeviceId::from_octets([0xC4, 0x7C, 0x8D, 0, 0, last]),
            local_name: name.map(str::to_string),
            rssi: Some(-60),
        }
    }

    async fn run_scan(options: ScanOptions, adverts: Vec<Advertisement>) -> (Vec<DeviceId>, bool) {
        let mock = MockTransport::new();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let transport = Arc::new(mock.clone());

        let scan = tokio::spawn(async move {
            scan_devices(
                transport.as_ref(),
                options,
                async {
                    let _ = stop_rx.await;
                },
                |_| {},
            )
            .await
        });

        while !mock.is_scanning() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for advert in adverts {
            assert!(mock.advertise(advert));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = stop_tx.send(());

        let reported = scan.await.unwrap().unwrap();
        (reported, mock.is_scanning())
    }

    #[tokio::test]
    async fn test_named_devices_reported_once() {
        let (reported, still_scanning) = run_scan(
            ScanOptions::default(),
            vec![
                advertisement(1, Some("NEEWER-RGB660")),
                advertisement(2, None),
                advertisement(1, Some("NEEWER-RGB660")),
                advertisement(3, Some("")),
            ],
        )
        .await;

        assert_eq!(reported, vec![advertisement(1, None).id]);
        assert!(!still_scanning);
    }

    #[tokio::test]
    async fn test_include_unnamed() {
        let (reported, _) = run_scan(
            ScanOptions {
                include_unnamed: true,
            },
            vec![advertisement(2, None), advertisement(1, Some("NEEWER"))],
        )
        .await;

        assert_eq!(reported.len(), 2);
        assert_eq!(reported[0], advertisement(2, None).id);
    }

    #[test]
    fn test_format_advertisement() {
        let line = format_advertisement(&advertisement(1, Some("NEEWER-RGB")));
        assert!(line.starts_with("C4:7C:8D:00:00:01"));
        assert!(line.contains("-60 dBm"));
        assert!(line.ends_with("NEEWER-RGB"));
    }
}
