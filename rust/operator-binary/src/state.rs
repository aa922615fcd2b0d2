//! Persisted identity material and the OAuth static client secret.
//!
//! Both are generated lazily by the leader and stored in a [`SecretStore`]; once set they are never
//! regenerated.

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt, Snafu};

use crate::backend;

pub const IDENTITY_LABEL: &str = "dex-auth.identity";
pub const OAUTH_STATIC_CLIENT_SECRET_LABEL: &str = "oauth.static.client";

pub const DEFAULT_USERNAME: &str = "admin";
const PASSWORD_LENGTH: usize = 30;
/// Client ids and secrets are hex encoded 16 byte tokens.
const OAUTH_TOKEN_LENGTH: usize = 32;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to read secret {label:?}"))]
    ReadSecret {
        source: backend::Error,
        label: &'static str,
    },

    #[snafu(display("failed to write secret {label:?}"))]
    WriteSecret {
        source: backend::Error,
        label: &'static str,
    },

    #[snafu(display("failed to remove secret {label:?}"))]
    RemoveSecret {
        source: backend::Error,
        label: &'static str,
    },

    #[snafu(display("failed to decode secret {label:?}"))]
    DecodeSecret {
        source: serde_json::Error,
        label: &'static str,
    },

    #[snafu(display("failed to encode secret {label:?}"))]
    EncodeSecret {
        source: serde_json::Error,
        label: &'static str,
    },

    #[snafu(display("OAuth static client {field} must be 32 characters, got {len}"))]
    InvalidOauthToken { field: &'static str, len: usize },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Label-addressed secret storage, owned by the leader and readable by every unit.
#[allow(async_fn_in_trait)]
pub trait SecretStore {
    async fn get(&self, label: &str) -> Result<Option<Vec<u8>>, backend::Error>;

    async fn put(&self, label: &str, content: Vec<u8>) -> Result<(), backend::Error>;

    /// Returns whether there was anything to delete.
    async fn delete(&self, label: &str) -> Result<bool, backend::Error>;
}

/// Credentials of the generated static Dex user.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct IdentityState {
    pub username: String,
    pub password: String,
    #[serde(with = "salt")]
    pub salt: [u8; 16],
    pub user_id: String,
}

impl IdentityState {
    pub fn generate() -> Self {
        let password = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LENGTH)
            .map(char::from)
            .collect();
        Self {
            username: DEFAULT_USERNAME.to_string(),
            password,
            salt: rand::random(),
            user_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

mod salt {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(salt: &[u8; 16], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(salt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 16], D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let decoded = STANDARD.decode(&encoded).map_err(de::Error::custom)?;
        decoded
            .try_into()
            .map_err(|bytes: Vec<u8>| de::Error::invalid_length(bytes.len(), &"16 bytes"))
    }
}

/// Returns the persisted identity, generating and storing it on first use.
pub async fn ensure_identity(secrets: &impl SecretStore) -> Result<IdentityState> {
    if let Some(identity) = read(secrets, IDENTITY_LABEL).await? {
        return Ok(identity);
    }
    let identity = IdentityState::generate();
    tracing::info!(user_id = %identity.user_id, "generated static user identity");
    write(secrets, IDENTITY_LABEL, &identity).await?;
    Ok(identity)
}

/// The static client synthesized for the application related over `oauth`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OauthStaticClient {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub name: String,
}

impl OauthStaticClient {
    pub fn generate(name: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: token_hex(),
            client_secret: token_hex(),
            redirect_uri: redirect_uri.into(),
            name: name.into(),
        }
    }

    fn validate(self) -> Result<Self> {
        for (field, value) in [
            ("client id", &self.client_id),
            ("client secret", &self.client_secret),
        ] {
            ensure!(
                value.len() == OAUTH_TOKEN_LENGTH,
                InvalidOauthTokenSnafu {
                    field,
                    len: value.len()
                }
            );
        }
        Ok(self)
    }
}

fn token_hex() -> String {
    rand::random::<[u8; OAUTH_TOKEN_LENGTH / 2]>()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

pub async fn oauth_static_client(secrets: &impl SecretStore) -> Result<Option<OauthStaticClient>> {
    read::<OauthStaticClient>(secrets, OAUTH_STATIC_CLIENT_SECRET_LABEL)
        .await?
        .map(OauthStaticClient::validate)
        .transpose()
}

/// Returns the persisted static client, creating it if none exists yet.
pub async fn create_oauth_static_client(
    secrets: &impl SecretStore,
    name: &str,
    redirect_uri: &str,
) -> Result<OauthStaticClient> {
    if let Some(client) = oauth_static_client(secrets).await? {
        tracing::debug!(name = %client.name, "OAuth static client already exists");
        return Ok(client);
    }
    let client = OauthStaticClient::generate(name, redirect_uri);
    write(secrets, OAUTH_STATIC_CLIENT_SECRET_LABEL, &client).await?;
    Ok(client)
}

/// Replaces the redirect URI of the persisted static client, if there is one.
pub async fn update_oauth_redirect_uri(
    secrets: &impl SecretStore,
    redirect_uri: &str,
) -> Result<Option<OauthStaticClient>> {
    let Some(mut client) = oauth_static_client(secrets).await? else {
        return Ok(None);
    };
    if client.redirect_uri != redirect_uri {
        client.redirect_uri = redirect_uri.to_string();
        write(secrets, OAUTH_STATIC_CLIENT_SECRET_LABEL, &client).await?;
    }
    Ok(Some(client))
}

/// Returns whether a static client was removed.
pub async fn remove_oauth_static_client(secrets: &impl SecretStore) -> Result<bool> {
    secrets
        .delete(OAUTH_STATIC_CLIENT_SECRET_LABEL)
        .await
        .context(RemoveSecretSnafu {
            label: OAUTH_STATIC_CLIENT_SECRET_LABEL,
        })
}

async fn read<T: for<'de> Deserialize<'de>>(
    secrets: &impl SecretStore,
    label: &'static str,
) -> Result<Option<T>> {
    secrets
        .get(label)
        .await
        .context(ReadSecretSnafu { label })?
        .map(|content| serde_json::from_slice(&content).context(DecodeSecretSnafu { label }))
        .transpose()
}

async fn write<T: Serialize>(
    secrets: &impl SecretStore,
    label: &'static str,
    value: &T,
) -> Result<()> {
    let content = serde_json::to_vec(value).context(EncodeSecretSnafu { label })?;
    secrets
        .put(label, content)
        .await
        .context(WriteSecretSnafu { label })
}
