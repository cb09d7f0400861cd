use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};
use univfs_common::{Credentials, FileUrl, SchemeRegistry, VfsConfig, VfsError};

/// Fills in credentials for locations that need them
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, url: &mut FileUrl) -> Result<(), VfsError>;
}

/// Credentials keyed by realm, falling back to the scheme's guest credentials
#[derive(Default)]
pub struct CredentialsStore {
    credentials: RwLock<HashMap<FileUrl, Credentials>>,
}

impl CredentialsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the `credentials` table of `config`. Realm keys are parsed with
    /// `schemes` and reduced to their realm.
    pub fn from_config(config: &VfsConfig, schemes: &SchemeRegistry) -> Result<Self, VfsError> {
        let store = Self::new();
        for (location, stored) in &config.credentials {
            let url = schemes.parse(location)?;
            store.add(&url, Credentials::new(&stored.login, &stored.password));
        }
        Ok(store)
    }

    /// Stores `credentials` for the realm of `url`, returning the previous ones
    pub fn add(&self, url: &FileUrl, credentials: Credentials) -> Option<Credentials> {
        let mut map = self.credentials.write().unwrap_or_else(|e| e.into_inner());
        map.insert(url.realm(), credentials)
    }

    pub fn remove(&self, url: &FileUrl) -> Option<Credentials> {
        let mut map = self.credentials.write().unwrap_or_else(|e| e.into_inner());
        map.remove(&url.realm())
    }

    pub fn get(&self, url: &FileUrl) -> Option<Credentials> {
        let map = self.credentials.read().unwrap_or_else(|e| e.into_inner());
        map.get(&url.realm()).cloned()
    }

    pub fn len(&self) -> usize {
        self.credentials.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Authenticator for CredentialsStore {
    fn authenticate(&self, url: &mut FileUrl) -> Result<(), VfsError> {
        if let Some(credentials) = self.get(url) {
            debug!("Using stored credentials for {}", url.realm());
            url.set_credentials(Some(credentials));
        } else if let Some(guest) = url.guest_credentials().cloned() {
            debug!("Using guest credentials for {}", url.realm());
            url.set_credentials(Some(guest));
        } else {
            warn!("No credentials available for {}", url.realm());
        }
        Ok(())
    }
}

impl std::fmt::Debug for CredentialsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsStore")
            .field("realms", &self.len())
            .finish()
    }
}
