//! Versioned relation payloads.
//!
//! Both sides of a versioned relation list the schema versions they understand under
//! `_supported_versions` and exchange a YAML payload under `data`.

use serde::{de::DeserializeOwned, Serialize};
use snafu::{ResultExt, Snafu};

use crate::{
    backend,
    relations::{publish, Relation, RelationData, RelationStore},
    status::Severity,
};

pub const SUPPORTED_VERSIONS_KEY: &str = "_supported_versions";
pub const DATA_KEY: &str = "data";

/// Versions this side understands, oldest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["v1"];

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to list {endpoint} relations"))]
    ListRelations {
        source: backend::Error,
        endpoint: &'static str,
    },

    #[snafu(display("failed to publish {endpoint} relation data"))]
    PublishData {
        source: backend::Error,
        endpoint: &'static str,
    },

    #[snafu(display("List of {endpoint} versions not found for apps: {}", apps.join(", ")))]
    NoVersionsListed {
        endpoint: &'static str,
        apps: Vec<String>,
    },

    #[snafu(display("No compatible {endpoint} versions found for apps: {}", apps.join(", ")))]
    NoCompatibleVersions {
        endpoint: &'static str,
        apps: Vec<String>,
    },

    #[snafu(display("{app} listed invalid {endpoint} versions"))]
    ParseVersions {
        source: serde_yaml::Error,
        endpoint: &'static str,
        app: String,
    },

    #[snafu(display("{app} published an invalid {endpoint} payload"))]
    ParsePayload {
        source: serde_yaml::Error,
        endpoint: &'static str,
        app: String,
    },

    #[snafu(display("failed to serialize the {endpoint} payload"))]
    SerializePayload {
        source: serde_yaml::Error,
        endpoint: &'static str,
    },
}

impl Error {
    pub fn severity(&self) -> Severity {
        match self {
            Self::NoVersionsListed { .. } => Severity::Waiting,
            Self::NoCompatibleVersions { .. } => Severity::Blocked,
            _ => Severity::Fatal,
        }
    }
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// An endpoint whose schema version was agreed on with every related application.
#[derive(Debug)]
pub struct Negotiated {
    pub endpoint: &'static str,
    pub version: &'static str,
    /// Relations with a joined remote application.
    pub relations: Vec<Relation>,
}

/// Negotiates the schema version of `endpoint`, `Ok(None)` if no application is related.
pub async fn negotiate(
    store: &impl RelationStore,
    endpoint: &'static str,
) -> Result<Option<Negotiated>> {
    let relations = store
        .relations(endpoint)
        .await
        .context(ListRelationsSnafu { endpoint })?
        .into_iter()
        .filter(|relation| relation.remote_app.is_some())
        .collect::<Vec<_>>();
    if relations.is_empty() {
        return Ok(None);
    }

    let mut unlisted = Vec::new();
    let mut listed = Vec::new();
    for relation in &relations {
        let app = remote_app(relation);
        match remote_versions(endpoint, relation)? {
            Some(versions) => listed.push((app, versions)),
            None => unlisted.push(app),
        }
    }
    if !unlisted.is_empty() {
        return NoVersionsListedSnafu {
            endpoint,
            apps: unlisted,
        }
        .fail();
    }

    let incompatible = listed
        .iter()
        .filter(|(_, versions)| {
            !SUPPORTED_VERSIONS
                .iter()
                .any(|ours| versions.iter().any(|theirs| theirs == ours))
        })
        .map(|(app, _)| app.clone())
        .collect::<Vec<_>>();
    if !incompatible.is_empty() {
        return NoCompatibleVersionsSnafu {
            endpoint,
            apps: incompatible,
        }
        .fail();
    }

    let Some(version) = SUPPORTED_VERSIONS.iter().rev().copied().find(|ours| {
        listed
            .iter()
            .all(|(_, versions)| versions.iter().any(|theirs| theirs == ours))
    }) else {
        return NoCompatibleVersionsSnafu {
            endpoint,
            apps: listed.into_iter().map(|(app, _)| app).collect::<Vec<_>>(),
        }
        .fail();
    };

    tracing::debug!(endpoint, version, "negotiated relation version");
    Ok(Some(Negotiated {
        endpoint,
        version,
        relations,
    }))
}

/// Lists our versions on every relation of `endpoint` so the related applications can negotiate.
pub async fn advertise_versions(
    store: &impl RelationStore,
    endpoint: &'static str,
) -> Result<()> {
    let relations = store
        .relations(endpoint)
        .await
        .context(ListRelationsSnafu { endpoint })?;
    let data = RelationData::from([(SUPPORTED_VERSIONS_KEY.to_string(), versions(endpoint)?)]);
    for relation in &relations {
        publish(store, endpoint, relation, data.clone())
            .await
            .context(PublishDataSnafu { endpoint })?;
    }
    Ok(())
}

impl Negotiated {
    /// Payloads published by the related applications, skipping those that have not sent one yet.
    pub fn remote_payloads<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.relations
            .iter()
            .filter_map(|relation| {
                let payload = relation
                    .remote_app_data
                    .get(DATA_KEY)
                    .filter(|payload| !payload.trim().is_empty())?;
                Some(serde_yaml::from_str(payload).with_context(|_| ParsePayloadSnafu {
                    endpoint: self.endpoint,
                    app: remote_app(relation),
                }))
            })
            .collect()
    }

    /// Publishes `payload` together with our versions on every relation.
    pub async fn send_payload<T: Serialize>(
        &self,
        store: &impl RelationStore,
        payload: &T,
    ) -> Result<()> {
        let endpoint = self.endpoint;
        let data = RelationData::from([
            (SUPPORTED_VERSIONS_KEY.to_string(), versions(endpoint)?),
            (
                DATA_KEY.to_string(),
                serde_yaml::to_string(payload).context(SerializePayloadSnafu { endpoint })?,
            ),
        ]);
        for relation in &self.relations {
            publish(store, endpoint, relation, data.clone())
                .await
                .context(PublishDataSnafu { endpoint })?;
        }
        Ok(())
    }
}

fn versions(endpoint: &'static str) -> Result<String> {
    serde_yaml::to_string(SUPPORTED_VERSIONS).context(SerializePayloadSnafu { endpoint })
}

fn remote_app(relation: &Relation) -> String {
    relation
        .remote_app
        .clone()
        .unwrap_or_else(|| format!("relation-{}", relation.id))
}

fn remote_versions(endpoint: &'static str, relation: &Relation) -> Result<Option<Vec<String>>> {
    let Some(versions) = relation
        .remote_app_data
        .get(SUPPORTED_VERSIONS_KEY)
        .filter(|versions| !versions.trim().is_empty())
    else {
        return Ok(None);
    };
    let versions: Vec<String> =
        serde_yaml::from_str(versions).with_context(|_| ParseVersionsSnafu {
            endpoint,
            app: remote_app(relation),
        })?;
    Ok(Some(versions).filter(|versions| !versions.is_empty()))
}
