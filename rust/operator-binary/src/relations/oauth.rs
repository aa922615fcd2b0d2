//! Provider side of the `oauth` relation.
//!
//! Dex advertises its endpoints to every related application and keeps one synthesized static
//! client for the dynamic client registered over the relation.

use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    backend,
    relations::{oidc_client::ClientRegistration, publish, RelationData, RelationStore, OAUTH_ENDPOINT},
    state::{self, OauthStaticClient, SecretStore},
};

pub const SCOPE: &str = "openid profile email offline_access";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to list oauth relations"))]
    ListRelations { source: backend::Error },

    #[snafu(display("oauth relation {relation_id} does not exist"))]
    MissingRelation { relation_id: u32 },

    #[snafu(display("failed to publish data on oauth relation {relation_id}"))]
    PublishData {
        source: backend::Error,
        relation_id: u32,
    },

    #[snafu(display("failed to access the OAuth static client"))]
    StaticClient { source: state::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Endpoints of this provider, derived from the issuer URL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProviderInfo {
    pub issuer_url: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_endpoint: String,
    pub scope: String,
}

impl ProviderInfo {
    pub fn new(issuer_url: &str) -> Self {
        let base = issuer_url.trim_end_matches('/');
        Self {
            issuer_url: issuer_url.to_string(),
            authorization_endpoint: format!("{base}/auth"),
            token_endpoint: format!("{base}/token"),
            userinfo_endpoint: format!("{base}/userinfo"),
            jwks_endpoint: format!("{base}/keys"),
            scope: SCOPE.to_string(),
        }
    }

    fn into_data(self) -> RelationData {
        RelationData::from([
            ("issuer_url".to_string(), self.issuer_url),
            (
                "authorization_endpoint".to_string(),
                self.authorization_endpoint,
            ),
            ("token_endpoint".to_string(), self.token_endpoint),
            ("userinfo_endpoint".to_string(), self.userinfo_endpoint),
            ("jwks_endpoint".to_string(), self.jwks_endpoint),
            ("scope".to_string(), self.scope),
        ])
    }
}

/// Name of the static client registered over the relation with `relation_id`.
pub fn client_name(relation_id: u32) -> String {
    format!("{OAUTH_ENDPOINT}-{relation_id}")
}

impl From<&OauthStaticClient> for ClientRegistration {
    fn from(client: &OauthStaticClient) -> Self {
        Self {
            id: client.client_id.clone(),
            name: client.name.clone(),
            redirect_uris: vec![client.redirect_uri.clone()],
            secret: client.client_secret.clone(),
        }
    }
}

/// Publishes the provider endpoints on every `oauth` relation.
pub async fn publish_provider_info(store: &impl RelationStore, info: &ProviderInfo) -> Result<()> {
    let relations = store
        .relations(OAUTH_ENDPOINT)
        .await
        .context(ListRelationsSnafu)?;
    let data = info.clone().into_data();
    for relation in &relations {
        publish(store, OAUTH_ENDPOINT, relation, data.clone())
            .await
            .context(PublishDataSnafu {
                relation_id: relation.id,
            })?;
    }
    Ok(())
}

/// Creates the static client for a newly registered dynamic client and hands its credentials back
/// to the requirer.
pub async fn client_created(
    secrets: &impl SecretStore,
    store: &impl RelationStore,
    relation_id: u32,
    redirect_uri: &str,
) -> Result<OauthStaticClient> {
    let client =
        state::create_oauth_static_client(secrets, &client_name(relation_id), redirect_uri)
            .await
            .context(StaticClientSnafu)?;
    let relation = store
        .relations(OAUTH_ENDPOINT)
        .await
        .context(ListRelationsSnafu)?
        .into_iter()
        .find(|relation| relation.id == relation_id)
        .context(MissingRelationSnafu { relation_id })?;
    let data = RelationData::from([
        ("client_id".to_string(), client.client_id.clone()),
        ("client_secret".to_string(), client.client_secret.clone()),
    ]);
    publish(store, OAUTH_ENDPOINT, &relation, data)
        .await
        .context(PublishDataSnafu { relation_id })?;
    tracing::info!(name = %client.name, "registered OAuth static client");
    Ok(client)
}

pub async fn client_changed(
    secrets: &impl SecretStore,
    redirect_uri: &str,
) -> Result<Option<OauthStaticClient>> {
    let client = state::update_oauth_redirect_uri(secrets, redirect_uri)
        .await
        .context(StaticClientSnafu)?;
    if client.is_none() {
        tracing::info!("no OAuth static client registered, ignoring redirect URI change");
    }
    Ok(client)
}

/// Removes the static client. A client that is already gone is not an error.
pub async fn client_deleted(secrets: &impl SecretStore) -> Result<()> {
    let removed = state::remove_oauth_static_client(secrets)
        .await
        .context(StaticClientSnafu)?;
    if !removed {
        tracing::warn!(
            label = state::OAUTH_STATIC_CLIENT_SECRET_LABEL,
            "OAuth static client already removed, skipping"
        );
    }
    Ok(())
}
