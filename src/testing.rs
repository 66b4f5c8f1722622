//! Scripted collaborators shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::controller::{ControllerLink, EventHandler, HandshakeCoordinator};
use crate::devices::{DatapointAddress, Device, DeviceApi};
use crate::error::{Error, Result};
use crate::protocol::ControllerEvent;

// ============================================================================
// ScriptedLink
// ============================================================================

/// Link whose events are pushed by the test.
#[derive(Default)]
pub(crate) struct ScriptedLink {
    handler: Mutex<Option<EventHandler>>,
    open_failure: Option<String>,
    open_delay: Option<Duration>,
    events_on_open: Mutex<Vec<ControllerEvent>>,
    socket_open: AtomicBool,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl ScriptedLink {
    pub(crate) fn failing(cause: &str) -> Self {
        Self {
            open_failure: Some(cause.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn emitting_on_open(events: Vec<ControllerEvent>) -> Self {
        Self {
            events_on_open: Mutex::new(events),
            ..Self::default()
        }
    }

    /// Takes `delay` to finish each `open()`.
    pub(crate) fn opening_after(delay: Duration) -> Self {
        Self {
            open_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Confirms the subscription as part of `open()`.
    pub(crate) fn confirming() -> Self {
        Self::emitting_on_open(vec![ControllerEvent::Subscribed { confirmed: true }])
    }

    pub(crate) fn emit(&self, event: ControllerEvent) {
        if let Some(handler) = self.handler.lock().as_ref() {
            handler(event);
        }
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Returns `true` between a completed `open()` and the next `close()`.
    pub(crate) fn is_open(&self) -> bool {
        self.socket_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControllerLink for ScriptedLink {
    async fn open(&self) -> Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(cause) = &self.open_failure {
            return Err(Error::connection(cause.clone()));
        }
        self.socket_open.store(true, Ordering::SeqCst);
        let events: Vec<_> = self.events_on_open.lock().drain(..).collect();
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.socket_open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_event_handler(&self, handler: EventHandler) {
        *self.handler.lock() = Some(handler);
    }
}

/// Builds a coordinator over `link` with a short handshake timeout.
pub(crate) fn coordinator(link: ScriptedLink) -> (Arc<ScriptedLink>, Arc<HandshakeCoordinator>) {
    let link = Arc::new(link);
    let coordinator = HandshakeCoordinator::new(link.clone(), Duration::from_secs(5));
    (link, coordinator)
}

/// Builds a coordinator that has completed its handshake.
pub(crate) async fn confirmed_coordinator() -> (Arc<ScriptedLink>, Arc<HandshakeCoordinator>) {
    let (link, coordinator) = coordinator(ScriptedLink::confirming());
    coordinator
        .connect()
        .await
        .expect("scripted handshake confirms");
    (link, coordinator)
}

// ============================================================================
// MemoryDevices
// ============================================================================

/// In-memory device backend recording every write.
#[derive(Default)]
pub(crate) struct MemoryDevices {
    devices: Mutex<Vec<Device>>,
    failure: Mutex<Option<String>>,
    pub(crate) writes: Mutex<Vec<(String, DatapointAddress, String)>>,
}

impl MemoryDevices {
    pub(crate) fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Self::default()
        }
    }

    /// Makes every subsequent call fail with `cause`.
    pub(crate) fn fail_with(&self, cause: &str) {
        *self.failure.lock() = Some(cause.to_string());
    }

    fn check(&self) -> Result<()> {
        match self.failure.lock().as_ref() {
            Some(cause) => Err(Error::protocol(cause.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceApi for MemoryDevices {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        self.check()?;
        Ok(self.devices.lock().clone())
    }

    async fn get_device(&self, device_id: &str) -> Result<Option<Device>> {
        self.check()?;
        Ok(self
            .devices
            .lock()
            .iter()
            .find(|d| d.serial_number == device_id)
            .cloned())
    }

    async fn set_datapoint(
        &self,
        device_id: &str,
        address: DatapointAddress,
        value: &str,
    ) -> Result<()> {
        self.check()?;
        self.writes
            .lock()
            .push((device_id.to_string(), address, value.to_string()));
        Ok(())
    }
}

/// One device with a single switch channel.
pub(crate) fn sample_device() -> Device {
    serde_json::from_value(serde_json::json!({
        "serialNumber": "ABB7F500",
        "displayName": "Living room",
        "channels": {
            "ch0000": {
                "displayName": "Ceiling light",
                "inputs": {"idp0000": {"pairingID": 1, "value": "0"}},
                "outputs": {"odp0000": {"pairingID": 256, "value": "0"}}
            }
        }
    }))
    .expect("valid sample device")
}
