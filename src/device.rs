//! Device identity used for encryption key derivation.
//!
//! The crypto provider needs a stable per-device secret so the same key and
//! nonce can be re-derived at load time. The source of that secret is
//! injected behind a trait so the crypto core is testable without a real
//! device id.

use std::path::Path;

/// Supplies the stable per-device secret the encryption key is derived from.
pub trait DeviceIdentity: Send + Sync {
    fn device_secret(&self) -> String;
}

/// Fixed secret, mainly for tests and for hosts that manage their own
/// device identifier.
#[derive(Debug, Clone)]
pub struct StaticDeviceIdentity {
    secret: String,
}

impl StaticDeviceIdentity {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl DeviceIdentity for StaticDeviceIdentity {
    fn device_secret(&self) -> String {
        self.secret.clone()
    }
}

/// Best-effort machine identity read once at construction.
///
/// Falls back to a fixed string when no machine id is available; saves made
/// under the fallback stay loadable on the same host, which is the contract
/// encryption needs.
#[derive(Debug, Clone)]
pub struct MachineDeviceIdentity {
    secret: String,
}

const MACHINE_ID_PATH: &str = "/etc/machine-id";
const FALLBACK_SECRET: &str = "savekeep-device-fallback";

impl MachineDeviceIdentity {
    pub fn detect() -> Self {
        let secret = std::fs::read_to_string(Path::new(MACHINE_ID_PATH))
            .map(|id| id.trim().to_string())
            .ok()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| FALLBACK_SECRET.to_string());
        Self { secret }
    }
}

impl DeviceIdentity for MachineDeviceIdentity {
    fn device_secret(&self) -> String {
        self.secret.clone()
    }
}
