//! Charm configuration options, as set by the operator of the deployment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::product_logging::DexLogLevel;

pub const DEFAULT_PORT: u16 = 5556;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("the connectors option is not valid YAML"))]
    ParseConnectors { source: serde_yaml::Error },

    #[snafu(display("failed to serialize the configuration schema"))]
    SerializeSchema { source: serde_yaml::Error },
}

/// A snapshot of the configuration options. Empty strings mean "not set".
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CharmConfig {
    pub port: u16,
    pub issuer_url: String,
    pub public_url: String,
    pub connectors: String,
    pub enable_password_db: bool,
    pub static_username: String,
    pub static_password: String,
    pub log_level: DexLogLevel,
}

impl Default for CharmConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            issuer_url: String::new(),
            public_url: String::new(),
            connectors: String::new(),
            enable_password_db: true,
            static_username: String::new(),
            static_password: String::new(),
            log_level: DexLogLevel::default(),
        }
    }
}

impl CharmConfig {
    pub fn issuer_url(&self) -> Option<&str> {
        non_empty(&self.issuer_url)
    }

    /// Deprecated in favour of `issuer-url`.
    pub fn public_url(&self) -> Option<&str> {
        non_empty(&self.public_url)
    }

    pub fn static_username(&self) -> Option<&str> {
        non_empty(&self.static_username)
    }

    pub fn static_password(&self) -> Option<&str> {
        non_empty(&self.static_password)
    }

    /// Parses the opaque `connectors` option.
    ///
    /// An empty option, a YAML `null`, an empty string, an empty list and an empty mapping all
    /// mean that no connector is configured.
    pub fn connectors(&self) -> Result<Option<serde_yaml::Value>, Error> {
        if self.connectors.trim().is_empty() {
            return Ok(None);
        }
        let connectors: serde_yaml::Value =
            serde_yaml::from_str(&self.connectors).context(ParseConnectorsSnafu)?;
        Ok(match connectors {
            serde_yaml::Value::Null => None,
            serde_yaml::Value::String(ref s) if s.is_empty() => None,
            serde_yaml::Value::Sequence(ref seq) if seq.is_empty() => None,
            serde_yaml::Value::Mapping(ref map) if map.is_empty() => None,
            connectors => Some(connectors),
        })
    }
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|value| !value.is_empty())
}

#[derive(Serialize)]
struct OptionSchema {
    #[serde(rename = "type")]
    type_: &'static str,
    default: serde_yaml::Value,
    description: &'static str,
}

/// Renders the recognised options, their types and defaults as YAML.
pub fn schema() -> Result<String, Error> {
    let defaults = CharmConfig::default();
    let options = BTreeMap::from([
        (
            "port",
            OptionSchema {
                type_: "int",
                default: defaults.port.into(),
                description: "Port Dex listens on",
            },
        ),
        (
            "issuer-url",
            OptionSchema {
                type_: "string",
                default: defaults.issuer_url.into(),
                description: "Canonical URL OIDC clients use to refer to Dex, used verbatim",
            },
        ),
        (
            "public-url",
            OptionSchema {
                type_: "string",
                default: defaults.public_url.into(),
                description: "DEPRECATED: use issuer-url. Public URL of the Dex service, /dex is appended",
            },
        ),
        (
            "connectors",
            OptionSchema {
                type_: "string",
                default: defaults.connectors.into(),
                description: "YAML list of Dex connectors",
            },
        ),
        (
            "enable-password-db",
            OptionSchema {
                type_: "boolean",
                default: defaults.enable_password_db.into(),
                description: "Allow logging in with the static username and password",
            },
        ),
        (
            "static-username",
            OptionSchema {
                type_: "string",
                default: defaults.static_username.into(),
                description: "Static username, a generated one is used when unset",
            },
        ),
        (
            "static-password",
            OptionSchema {
                type_: "string",
                default: defaults.static_password.into(),
                description: "Static password, a generated one is used when unset",
            },
        ),
        (
            "log-level",
            OptionSchema {
                type_: "string",
                default: defaults.log_level.to_string().into(),
                description: "Dex log level, one of debug, info, warn or error",
            },
        ),
    ]);
    serde_yaml::to_string(&BTreeMap::from([("options", options)])).context(SerializeSchemaSnafu)
}
