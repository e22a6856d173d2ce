//! Last-known device state, keyed by endpointId.
//!
//! Two backends: Sled for persistent deployments and a DashMap store for tests
//! and local runs. Writes replace the whole record for a device, mirroring the
//! per-device-type ownership of fields (a light record only ever carries
//! `light_state`).

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default states written when discovery first seeds an endpoint.
pub const DEFAULT_LIGHT_STATE: &str = "OFF";
pub const DEFAULT_BLINDS_MODE: &str = "Position.Down";
pub const DEFAULT_THERMOSTAT_TEMPERATURE: &str = "68";
pub const DEFAULT_THERMOSTAT_MODE: &str = "AUTO";

/// Per-device record. An absent field means "never set" and is omitted from
/// state reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blinds_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermostat_temperature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermostat_mode: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(#[from] sled::Error),

    #[error("corrupt device record for {endpoint_id}: {source}")]
    Corrupt {
        endpoint_id: String,
        source: serde_json::Error,
    },

    #[error("failed to encode device record: {0}")]
    Encode(serde_json::Error),
}

/// Key-value persistence for per-device state. Callers treat failures as
/// non-fatal: log and proceed, never propagate past the router.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Fetch the last-known state. A missing record yields a state with all
    /// fields absent, never an error.
    async fn retrieve(&self, endpoint_id: &str) -> Result<DeviceState, StoreError>;

    async fn persist_light(&self, endpoint_id: &str, light_state: &str) -> Result<(), StoreError>;

    async fn persist_blinds(&self, endpoint_id: &str, blinds_mode: &str) -> Result<(), StoreError>;

    async fn persist_thermostat(
        &self,
        endpoint_id: &str,
        temperature: &str,
        mode: &str,
    ) -> Result<(), StoreError>;
}

/// Sled-backed store: one JSON-encoded [`DeviceState`] per endpointId.
pub struct SledDeviceStore {
    db: sled::Db,
}

impl SledDeviceStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Ok(Self { db: sled::open(path)? })
    }

    fn put(&self, endpoint_id: &str, state: &DeviceState) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(state).map_err(StoreError::Encode)?;
        self.db.insert(endpoint_id.as_bytes(), encoded)?;
        Ok(())
    }
}

#[async_trait]
impl DeviceStore for SledDeviceStore {
    async fn retrieve(&self, endpoint_id: &str) -> Result<DeviceState, StoreError> {
        match self.db.get(endpoint_id.as_bytes())? {
            Some(raw) => serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
                endpoint_id: endpoint_id.to_string(),
                source,
            }),
            None => Ok(DeviceState::default()),
        }
    }

    async fn persist_light(&self, endpoint_id: &str, light_state: &str) -> Result<(), StoreError> {
        self.put(
            endpoint_id,
            &DeviceState {
                light_state: Some(light_state.to_string()),
                ..Default::default()
            },
        )
    }

    async fn persist_blinds(&self, endpoint_id: &str, blinds_mode: &str) -> Result<(), StoreError> {
        self.put(
            endpoint_id,
            &DeviceState {
                blinds_mode: Some(blinds_mode.to_string()),
                ..Default::default()
            },
        )
    }

    async fn persist_thermostat(
        &self,
        endpoint_id: &str,
        temperature: &str,
        mode: &str,
    ) -> Result<(), StoreError> {
        self.put(
            endpoint_id,
            &DeviceState {
                thermostat_temperature: Some(temperature.to_string()),
                thermostat_mode: Some(mode.to_string()),
                ..Default::default()
            },
        )
    }
}

/// In-memory store used by tests and local runs without a data directory.
#[derive(Default)]
pub struct MemoryDeviceStore {
    records: DashMap<String, DeviceState>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn retrieve(&self, endpoint_id: &str) -> Result<DeviceState, StoreError> {
        Ok(self
            .records
            .get(endpoint_id)
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    async fn persist_light(&self, endpoint_id: &str, light_state: &str) -> Result<(), StoreError> {
        self.records.insert(
            endpoint_id.to_string(),
            DeviceState {
                light_state: Some(light_state.to_string()),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn persist_blinds(&self, endpoint_id: &str, blinds_mode: &str) -> Result<(), StoreError> {
        self.records.insert(
            endpoint_id.to_string(),
            DeviceState {
                blinds_mode: Some(blinds_mode.to_string()),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn persist_thermostat(
        &self,
        endpoint_id: &str,
        temperature: &str,
        mode: &str,
    ) -> Result<(), StoreError> {
        self.records.insert(
            endpoint_id.to_string(),
            DeviceState {
                thermostat_temperature: Some(temperature.to_string()),
                thermostat_mode: Some(mode.to_string()),
                ..Default::default()
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_record_yields_empty_state() {
        let store = MemoryDeviceStore::new();
        let state = store.retrieve("nobody-light").await.unwrap();
        assert_eq!(state, DeviceState::default());
    }

    #[tokio::test]
    async fn memory_store_round_trips_each_device_type() {
        let store = MemoryDeviceStore::new();
        store.persist_light("u-light", "ON").await.unwrap();
        store.persist_blinds("u-blinds", "Position.Up").await.unwrap();
        store.persist_thermostat("u-thermostat", "72", "HEAT").await.unwrap();

        assert_eq!(
            store.retrieve("u-light").await.unwrap().light_state.as_deref(),
            Some("ON")
        );
        assert_eq!(
            store.retrieve("u-blinds").await.unwrap().blinds_mode.as_deref(),
            Some("Position.Up")
        );
        let thermostat = store.retrieve("u-thermostat").await.unwrap();
        assert_eq!(thermostat.thermostat_temperature.as_deref(), Some("72"));
        assert_eq!(thermostat.thermostat_mode.as_deref(), Some("HEAT"));
        assert!(thermostat.light_state.is_none());
    }

    #[tokio::test]
    async fn sled_store_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledDeviceStore::open(dir.path()).unwrap();
        store.persist_light("u-light", "ON").await.unwrap();
        let state = store.retrieve("u-light").await.unwrap();
        assert_eq!(state.light_state.as_deref(), Some("ON"));
        assert_eq!(store.retrieve("unknown").await.unwrap(), DeviceState::default());
    }

    #[test]
    fn absent_fields_are_omitted_from_json() {
        let state = DeviceState {
            light_state: Some("OFF".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, serde_json::json!({ "light_state": "OFF" }));
    }
}
