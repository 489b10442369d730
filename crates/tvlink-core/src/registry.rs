//! Deduplicated, time-bounded catalog of discovered receivers.
//!
//! Discovery results are soft state: a device stays listed only while it keeps
//! being observed. The address is the only identity; which strategy found a
//! device does not matter.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use crate::types::{Device, DeviceObservation};

pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
    updates: watch::Sender<Vec<Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self {
            devices: RwLock::new(HashMap::new()),
            updates,
        }
    }

    /// Insert a new device or refresh an existing one.
    ///
    /// Returns `true` when the address was not listed before. An observation
    /// older than what is already recorded does not move `last_seen_at` back.
    pub fn observe(&self, observation: DeviceObservation) -> bool {
        let mut devices = self.devices.write();

        let inserted = match devices.get_mut(&observation.address) {
            Some(existing) => {
                if observation.observed_at >= existing.last_seen_at {
                    existing.last_seen_at = observation.observed_at;
                    existing.discovered_via = observation.source;
                }
                false
            }
            None => {
                debug!(address = %observation.address, "new device");
                devices.insert(observation.address.clone(), Device::from(observation));
                true
            }
        };

        self.updates.send_replace(sorted(&devices));
        inserted
    }

    /// Devices, most recently seen first. Ties are broken by address.
    pub fn list(&self) -> Vec<Device> {
        sorted(&self.devices.read())
    }

    pub fn get(&self, address: &str) -> Option<Device> {
        self.devices.read().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Remove devices not seen within `max_age` of now.
    pub fn prune(&self, max_age: Duration) -> usize {
        self.prune_at(max_age, Utc::now())
    }

    /// Remove devices whose `last_seen_at` is more than `max_age` before `now`.
    pub fn prune_at(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };

        let mut devices = self.devices.write();
        let before = devices.len();
        devices.retain(|_, device| now.signed_duration_since(device.last_seen_at) <= max_age);
        let removed = before - devices.len();

        if removed > 0 {
            debug!(removed, "pruned stale devices");
            self.updates.send_replace(sorted(&devices));
        }
        removed
    }

    pub fn clear(&self) {
        let mut devices = self.devices.write();
        if !devices.is_empty() {
            devices.clear();
            self.updates.send_replace(Vec::new());
        }
    }

    /// Receive a fresh snapshot every time the list changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Device>> {
        self.updates.subscribe()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted(devices: &HashMap<String, Device>) -> Vec<Device> {
    let mut list: Vec<Device> = devices.values().cloned().collect();
    list.sort_by(|a, b| {
        b.last_seen_at
            .cmp(&a.last_seen_at)
            .then_with(|| a.address.cmp(&b.address))
    });
    list
}
