//! Pebble layer supervising the Dex process.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::OPERATOR_NAME;

pub const CONTAINER_NAME: &str = "dex";
pub const SERVICE_NAME: &str = "dex";
pub const CONFIG_PATH: &str = "/etc/dex/config.docker.yaml";
pub const NAMESPACE_ENV: &str = "KUBERNETES_POD_NAMESPACE";

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Layer {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Service {
    #[serde(rename = "override")]
    pub override_: Override,
    #[serde(default)]
    pub summary: String,
    pub command: String,
    #[serde(default)]
    pub startup: Startup,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    Merge,
    Replace,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Startup {
    Enabled,
    #[default]
    Disabled,
}

impl Layer {
    /// Whether applying `self` over `current` would change any service.
    pub fn differs_from(&self, current: &Layer) -> bool {
        self.services != current.services
    }
}

/// The layer running Dex with the configuration file at [`CONFIG_PATH`].
pub fn build(namespace: &str) -> Layer {
    let service = Service {
        override_: Override::Replace,
        summary: "dex".to_string(),
        command: format!("dex serve {CONFIG_PATH}"),
        startup: Startup::Enabled,
        environment: BTreeMap::from([(NAMESPACE_ENV.to_string(), namespace.to_string())]),
    };
    Layer {
        summary: format!("{OPERATOR_NAME} layer"),
        description: format!("pebble config layer for {OPERATOR_NAME}"),
        services: BTreeMap::from([(SERVICE_NAME.to_string(), service)]),
    }
}
