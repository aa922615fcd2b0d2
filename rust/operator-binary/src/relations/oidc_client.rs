//! Static client registrations published by applications related over `oidc-client`.

use serde::{Deserialize, Serialize};

use crate::relations::{
    sdi::{self, Negotiated},
    RelationStore, OIDC_CLIENT_ENDPOINT,
};

/// One entry of Dex's `staticClients` list.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClientRegistration {
    pub id: String,
    pub name: String,
    #[serde(rename = "redirectURIs")]
    pub redirect_uris: Vec<String>,
    pub secret: String,
}

/// Registrations of every related application, in relation order.
///
/// Applications that have not published their registration yet are skipped.
pub fn registrations(negotiated: Option<&Negotiated>) -> Result<Vec<ClientRegistration>, sdi::Error> {
    match negotiated {
        Some(negotiated) => negotiated.remote_payloads(),
        None => Ok(Vec::new()),
    }
}

/// Lists our versions and reads back the registrations.
pub async fn fetch(store: &impl RelationStore) -> Result<Vec<ClientRegistration>, sdi::Error> {
    sdi::advertise_versions(store, OIDC_CLIENT_ENDPOINT).await?;
    let negotiated = sdi::negotiate(store, OIDC_CLIENT_ENDPOINT).await?;
    let clients = registrations(negotiated.as_ref())?;
    tracing::debug!(clients = clients.len(), "read OIDC client registrations");
    Ok(clients)
}
