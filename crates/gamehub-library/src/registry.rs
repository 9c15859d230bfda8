//! Read-only access to the machine-wide (HKLM) registry hive
//!
//! Probes only need two operations: list the subkeys of a key and read a
//! string value. `MemoryRegistry` backs tests and non-Windows hosts.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry key not found: {0}")]
    KeyNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry lookups, paths relative to HKEY_LOCAL_MACHINE
pub trait Registry: Send + Sync {
    /// Names of the direct subkeys of `key`
    fn subkeys(&self, key: &str) -> Result<Vec<String>, RegistryError>;

    /// A string value under `key`; `Ok(None)` when the key exists but the value does not
    fn string_value(&self, key: &str, name: &str) -> Result<Option<String>, RegistryError>;
}

/// In-memory registry tree
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    keys: BTreeMap<String, BTreeMap<String, String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `key` (and its ancestors) if needed
    pub fn add_key(&mut self, key: &str) -> &mut Self {
        let mut path = String::new();
        for part in key.split('\\') {
            if !path.is_empty() {
                path.push('\\');
            }
            path.push_str(part);
            self.keys.entry(path.clone()).or_default();
        }
        self
    }

    /// Set a string value, creating the key if needed
    pub fn set_value(&mut self, key: &str, name: &str, value: &str) -> &mut Self {
        self.add_key(key);
        if let Some(values) = self.keys.get_mut(key) {
            values.insert(name.to_string(), value.to_string());
        }
        self
    }
}

impl Registry for MemoryRegistry {
    fn subkeys(&self, key: &str) -> Result<Vec<String>, RegistryError> {
        if !self.keys.contains_key(key) {
            return Err(RegistryError::KeyNotFound(key.to_string()));
        }

        let prefix = format!("{}\\", key);
        Ok(self
            .keys
            .keys()
            .filter_map(|path| path.strip_prefix(prefix.as_str()))
            .filter(|rest| !rest.contains('\\'))
            .map(str::to_string)
            .collect())
    }

    fn string_value(&self, key: &str, name: &str) -> Result<Option<String>, RegistryError> {
        self.keys
            .get(key)
            .map(|values| values.get(name).cloned())
            .ok_or_else(|| RegistryError::KeyNotFound(key.to_string()))
    }
}

#[cfg(windows)]
mod windows {
    use super::{Registry, RegistryError};
    use winreg::RegKey;
    use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ};

    /// The live Windows registry
    #[derive(Debug, Default)]
    pub struct WindowsRegistry;

    impl WindowsRegistry {
        fn open(&self, key: &str) -> Result<RegKey, RegistryError> {
            RegKey::predef(HKEY_LOCAL_MACHINE)
                .open_subkey_with_flags(key, KEY_READ)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => RegistryError::KeyNotFound(key.to_string()),
                    _ => RegistryError::Io(e),
                })
        }
    }

    impl Registry for WindowsRegistry {
        fn subkeys(&self, key: &str) -> Result<Vec<String>, RegistryError> {
            let handle = self.open(key)?;
            Ok(handle.enum_keys().filter_map(Result::ok).collect())
        }

        fn string_value(&self, key: &str, name: &str) -> Result<Option<String>, RegistryError> {
            let handle = self.open(key)?;
            match handle.get_value::<String, _>(name) {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(RegistryError::Io(e)),
            }
        }
    }
}

#[cfg(windows)]
pub use windows::WindowsRegistry;

/// The registry of the host machine
#[cfg(windows)]
pub fn system_registry() -> Arc<dyn Registry> {
    Arc::new(WindowsRegistry)
}

/// The registry of the host machine
#[cfg(not(windows))]
pub fn system_registry() -> Arc<dyn Registry> {
    tracing::debug!("No system registry on this platform, using an empty one");
    Arc::new(MemoryRegistry::new())
}
