//! Relation data exchanged with peer applications.

use std::collections::BTreeMap;

use crate::backend;

pub mod ingress;
pub mod oauth;
pub mod oidc_client;
pub mod oidc_config;
pub mod sdi;

pub const OIDC_CLIENT_ENDPOINT: &str = "oidc-client";
pub const INGRESS_ENDPOINT: &str = "ingress";
pub const OAUTH_ENDPOINT: &str = "oauth";
pub const DEX_OIDC_CONFIG_ENDPOINT: &str = "dex-oidc-config";

/// An application databag.
pub type RelationData = BTreeMap<String, String>;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Relation {
    pub id: u32,
    /// `None` until a remote unit has joined.
    pub remote_app: Option<String>,
    pub remote_app_data: RelationData,
    /// This application's databag.
    pub app_data: RelationData,
}

impl Relation {
    /// Whether writing `data` would change this application's databag.
    pub fn differs(&self, data: &RelationData) -> bool {
        data.iter()
            .any(|(key, value)| self.app_data.get(key) != Some(value))
    }
}

#[allow(async_fn_in_trait)]
pub trait RelationStore {
    /// Relations established on `endpoint`, ordered by relation id.
    async fn relations(&self, endpoint: &str) -> Result<Vec<Relation>, backend::Error>;

    /// Merges `data` into this application's databag.
    async fn update_app_data(
        &self,
        endpoint: &str,
        relation_id: u32,
        data: RelationData,
    ) -> Result<(), backend::Error>;
}

/// Writes `data` into this application's databag unless it is already there.
///
/// Returns whether a write happened.
pub async fn publish(
    store: &impl RelationStore,
    endpoint: &str,
    relation: &Relation,
    data: RelationData,
) -> Result<bool, backend::Error> {
    if !relation.differs(&data) {
        return Ok(false);
    }
    tracing::debug!(endpoint, relation_id = relation.id, "updating relation data");
    store.update_app_data(endpoint, relation.id, data).await?;
    Ok(true)
}
