//! The set of masters known to this process, one per key.

use crate::{MasterKey, SshConfig, SshError, SshMaster};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct MasterRegistry {
    config: Arc<SshConfig>,
    masters: HashMap<String, SshMaster>,
}

impl MasterRegistry {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config: Arc::new(config),
            masters: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Register a master for `key`. A master already running for that key,
    /// possibly started by another process, is picked up from its pidfile.
    pub fn create(&mut self, key: MasterKey, nomaster: bool) -> Result<&mut SshMaster, SshError> {
        let id = key.to_string();
        if self.masters.contains_key(&id) {
            return Err(SshError::AlreadyRegistered(id));
        }
        let master = SshMaster::new(key, Arc::clone(&self.config), nomaster)?;
        Ok(self.masters.entry(id).or_insert(master))
    }

    pub fn find(&mut self, key: &MasterKey) -> Option<&mut SshMaster> {
        self.masters.get_mut(&key.to_string())
    }

    /// Look up by the `[category/]user@host:port[/uniq]` rendering of a key.
    pub fn find_by_key(&mut self, key: &str) -> Option<&mut SshMaster> {
        self.masters.get_mut(key)
    }

    pub fn find_or_create(&mut self, key: MasterKey, nomaster: bool) -> Result<&mut SshMaster, SshError> {
        let id = key.to_string();
        if self.masters.contains_key(&id) {
            return self
                .masters
                .get_mut(&id)
                .ok_or(SshError::AlreadyRegistered(id));
        }
        self.create(key, nomaster)
    }

    pub fn all(&self) -> impl Iterator<Item = &SshMaster> {
        self.masters.values()
    }

    pub fn all_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.masters.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Stop the master for `key` and forget it. Returns false for an unknown key.
    pub async fn destroy(&mut self, key: &str) -> bool {
        match self.masters.remove(key) {
            Some(mut master) => {
                master.stop().await;
                true
            }
            None => false,
        }
    }

    pub async fn destroy_all(&mut self) {
        for key in self.all_keys() {
            self.destroy(&key).await;
        }
    }

    /// Stop and forget every master that fails [`SshMaster::is_alive`].
    /// Returns the keys that were removed.
    pub async fn reap_unresponsive(&mut self) -> Vec<String> {
        let mut reaped = Vec::new();
        for key in self.all_keys() {
            let alive = match self.masters.get_mut(&key) {
                Some(master) => master.is_alive().await,
                None => continue,
            };
            if !alive {
                tracing::info!(key = %key, "removing unresponsive SSH master");
                self.destroy(&key).await;
                reaped.push(key);
            }
        }
        reaped
    }
}
