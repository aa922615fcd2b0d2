//! Compilation of the Dex configuration file.

use serde::Serialize;
use snafu::{ensure, ResultExt, Snafu};

use crate::{
    product_logging::{DexLogLevel, Logger},
    relations::oidc_client::ClientRegistration,
    state::{IdentityState, OauthStaticClient},
    status::Severity,
};

pub const TELEMETRY_PORT: u16 = 5558;
const BIND_ADDRESS: &str = "0.0.0.0";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display(
        "Please add connectors or enable the password database (enable-password-db=true)"
    ))]
    NoLoginMethod,

    #[snafu(display("failed to hash the static password"))]
    HashPassword { source: bcrypt::BcryptError },

    #[snafu(display("failed to serialize the Dex configuration"))]
    Serialize { source: serde_yaml::Error },
}

impl Error {
    pub fn severity(&self) -> Severity {
        match self {
            Self::NoLoginMethod => Severity::Blocked,
            Self::HashPassword { .. } | Self::Serialize { .. } => Severity::Fatal,
        }
    }
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Resolved inputs of [`compile`].
#[derive(Clone, Copy, Debug)]
pub struct CompileInputs<'a> {
    pub identity: &'a IdentityState,
    pub oidc_clients: &'a [ClientRegistration],
    pub oauth_static_client: Option<&'a OauthStaticClient>,
    pub connectors: Option<&'a serde_yaml::Value>,
    pub port: u16,
    pub issuer_url: &'a str,
    pub enable_password_db: bool,
    /// Overrides the generated username.
    pub static_username: Option<&'a str>,
    /// Overrides the generated password.
    pub static_password: Option<&'a str>,
    pub log_level: DexLogLevel,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DexConfig {
    pub issuer: String,
    pub storage: Storage,
    pub web: Endpoint,
    pub telemetry: Endpoint,
    pub logger: Logger,
    pub oauth2: OAuth2,
    pub static_clients: Vec<ClientRegistration>,
    pub connectors: Option<serde_yaml::Value>,
    #[serde(rename = "enablePasswordDB")]
    pub enable_password_db: bool,
    pub static_passwords: Vec<StaticPassword>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Storage {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub config: StorageConfig,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    pub in_cluster: bool,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            type_: "kubernetes",
            config: StorageConfig { in_cluster: true },
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Endpoint {
    pub http: String,
}

impl Endpoint {
    fn listen(port: u16) -> Self {
        Self {
            http: format!("{BIND_ADDRESS}:{port}"),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2 {
    pub skip_approval_screen: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct StaticPassword {
    pub email: String,
    pub hash: String,
    pub username: String,
    #[serde(rename = "userID")]
    pub user_id: String,
}

/// Dex needs either the password database or at least one connector to let anyone log in.
pub fn check_login_method(
    enable_password_db: bool,
    connectors: Option<&serde_yaml::Value>,
) -> Result<()> {
    ensure!(enable_password_db || connectors.is_some(), NoLoginMethodSnafu);
    Ok(())
}

/// Builds the Dex configuration.
pub fn compile(inputs: CompileInputs<'_>) -> Result<DexConfig> {
    check_login_method(inputs.enable_password_db, inputs.connectors)?;

    let static_clients = inputs
        .oidc_clients
        .iter()
        .cloned()
        .chain(inputs.oauth_static_client.map(ClientRegistration::from))
        .collect();

    let static_passwords = if inputs.enable_password_db {
        vec![static_password(&inputs)?]
    } else {
        Vec::new()
    };

    Ok(DexConfig {
        issuer: inputs.issuer_url.to_string(),
        storage: Storage::default(),
        web: Endpoint::listen(inputs.port),
        telemetry: Endpoint::listen(TELEMETRY_PORT),
        logger: inputs.log_level.into(),
        oauth2: OAuth2 {
            skip_approval_screen: true,
        },
        static_clients,
        connectors: inputs.connectors.cloned(),
        enable_password_db: inputs.enable_password_db,
        static_passwords,
    })
}

fn static_password(inputs: &CompileInputs<'_>) -> Result<StaticPassword> {
    let identity = inputs.identity;
    let username = inputs.static_username.unwrap_or(&identity.username);
    let password = inputs.static_password.unwrap_or(&identity.password);
    let hash = bcrypt::hash_with_salt(password, bcrypt::DEFAULT_COST, identity.salt)
        .context(HashPasswordSnafu)?
        .format_for_version(bcrypt::Version::TwoB);
    Ok(StaticPassword {
        email: username.to_string(),
        hash,
        username: username.to_string(),
        user_id: identity.user_id.clone(),
    })
}

impl DexConfig {
    /// The contents of the configuration file. Identical configurations render identical bytes.
    pub fn to_yaml(&self) -> Result<Vec<u8>> {
        serde_yaml::to_string(self)
            .map(String::into_bytes)
            .context(SerializeSnafu)
    }
}
