//! In-memory collaborators that record every mutation.

use std::{collections::BTreeMap, sync::Mutex};

use crate::{
    backend,
    layer::Layer,
    relations::{Relation, RelationData, RelationStore},
    state::SecretStore,
    status::Status,
    unit::Unit,
    workload::Workload,
};

pub struct MemoryUnit {
    leader: bool,
    statuses: Mutex<Vec<Status>>,
}

impl MemoryUnit {
    pub fn leader() -> Self {
        Self {
            leader: true,
            statuses: Mutex::default(),
        }
    }

    pub fn follower() -> Self {
        Self {
            leader: false,
            ..Self::leader()
        }
    }

    pub fn statuses(&self) -> Vec<Status> {
        self.statuses.lock().unwrap().clone()
    }
}

impl Unit for MemoryUnit {
    fn app_name(&self) -> &str {
        "dex-auth"
    }

    fn namespace(&self) -> &str {
        "kubeflow"
    }

    async fn is_leader(&self) -> Result<bool, backend::Error> {
        Ok(self.leader)
    }

    async fn set_status(&self, status: &Status) -> Result<(), backend::Error> {
        self.statuses.lock().unwrap().push(status.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySecrets {
    secrets: Mutex<BTreeMap<String, Vec<u8>>>,
    writes: Mutex<Vec<String>>,
}

impl MemorySecrets {
    /// Labels of every put and effective delete, in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

impl SecretStore for MemorySecrets {
    async fn get(&self, label: &str) -> Result<Option<Vec<u8>>, backend::Error> {
        Ok(self.secrets.lock().unwrap().get(label).cloned())
    }

    async fn put(&self, label: &str, content: Vec<u8>) -> Result<(), backend::Error> {
        self.secrets
            .lock()
            .unwrap()
            .insert(label.to_string(), content);
        self.writes.lock().unwrap().push(label.to_string());
        Ok(())
    }

    async fn delete(&self, label: &str) -> Result<bool, backend::Error> {
        let removed = self.secrets.lock().unwrap().remove(label).is_some();
        if removed {
            self.writes.lock().unwrap().push(label.to_string());
        }
        Ok(removed)
    }
}

#[derive(Default)]
pub struct MemoryRelations {
    relations: Mutex<BTreeMap<String, Vec<Relation>>>,
    writes: Mutex<Vec<(String, u32)>>,
}

impl MemoryRelations {
    pub fn with(self, endpoint: &str, relation: Relation) -> Self {
        self.relations
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push(relation);
        self
    }

    /// Endpoint and relation id of every databag update, in order.
    pub fn writes(&self) -> Vec<(String, u32)> {
        self.writes.lock().unwrap().clone()
    }
}

impl RelationStore for MemoryRelations {
    async fn relations(&self, endpoint: &str) -> Result<Vec<Relation>, backend::Error> {
        let mut relations = self
            .relations
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_default();
        relations.sort_by_key(|relation| relation.id);
        Ok(relations)
    }

    async fn update_app_data(
        &self,
        endpoint: &str,
        relation_id: u32,
        data: RelationData,
    ) -> Result<(), backend::Error> {
        let mut relations = self.relations.lock().unwrap();
        let relation = relations
            .get_mut(endpoint)
            .and_then(|relations| relations.iter_mut().find(|r| r.id == relation_id))
            .ok_or_else(|| backend::Error::UnknownRelation {
                endpoint: endpoint.to_string(),
                relation_id,
            })?;
        relation.app_data.extend(data);
        self.writes
            .lock()
            .unwrap()
            .push((endpoint.to_string(), relation_id));
        Ok(())
    }
}

pub struct MemoryWorkload {
    connected: bool,
    layer: Mutex<Layer>,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    layer_writes: Mutex<usize>,
    file_writes: Mutex<usize>,
    restarts: Mutex<usize>,
}

impl Default for MemoryWorkload {
    fn default() -> Self {
        Self {
            connected: true,
            layer: Mutex::default(),
            files: Mutex::default(),
            layer_writes: Mutex::default(),
            file_writes: Mutex::default(),
            restarts: Mutex::default(),
        }
    }
}

impl MemoryWorkload {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::default()
        }
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn layer_writes(&self) -> usize {
        *self.layer_writes.lock().unwrap()
    }

    pub fn file_writes(&self) -> usize {
        *self.file_writes.lock().unwrap()
    }

    pub fn restarts(&self) -> usize {
        *self.restarts.lock().unwrap()
    }
}

impl Workload for MemoryWorkload {
    async fn can_connect(&self) -> bool {
        self.connected
    }

    async fn layer(&self) -> Result<Layer, backend::Error> {
        Ok(self.layer.lock().unwrap().clone())
    }

    async fn replace_layer(&self, layer: &Layer) -> Result<(), backend::Error> {
        *self.layer.lock().unwrap() = layer.clone();
        *self.layer_writes.lock().unwrap() += 1;
        Ok(())
    }

    async fn pull(&self, path: &str) -> Result<Option<Vec<u8>>, backend::Error> {
        Ok(self.file(path))
    }

    async fn push(&self, path: &str, content: &[u8]) -> Result<(), backend::Error> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        *self.file_writes.lock().unwrap() += 1;
        Ok(())
    }

    async fn restart(&self, _service: &str) -> Result<(), backend::Error> {
        *self.restarts.lock().unwrap() += 1;
        Ok(())
    }
}
