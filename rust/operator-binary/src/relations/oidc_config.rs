//! Sharing Dex's issuer URL over `dex-oidc-config`.
//!
//! The provider side runs in this operator. The requirer side is used by OIDC clients that need to
//! know where Dex lives.

use snafu::{ensure, OptionExt, ResultExt, Snafu};

use crate::{
    backend,
    relations::{publish, RelationData, RelationStore, DEX_OIDC_CONFIG_ENDPOINT},
    unit::Unit,
};

pub const ISSUER_URL_KEY: &str = "issuer-url";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to check leadership"))]
    Leadership { source: backend::Error },

    #[snafu(display("failed to list {endpoint} relations"))]
    ListRelations {
        source: backend::Error,
        endpoint: String,
    },

    #[snafu(display("failed to publish the issuer URL on relation {relation_id}"))]
    PublishData {
        source: backend::Error,
        relation_id: u32,
    },

    #[snafu(display("Missing relation with a Dex OIDC config provider."))]
    RelationMissing,

    #[snafu(display("No data found in relation {endpoint} data bag."))]
    RelationDataMissing { endpoint: String },

    #[snafu(display("{key:?} not found in relation {endpoint} data bag."))]
    AttributeMissing { endpoint: String, key: &'static str },

    #[snafu(display("expected a single {endpoint} relation, found {count}"))]
    TooManyRelatedApps { endpoint: String, count: usize },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DexOidcConfig {
    /// The canonical URL OIDC clients must use to refer to Dex.
    pub issuer_url: String,
}

/// Publishes `issuer_url` to every related application.
///
/// Non-leaders send nothing. Completes successfully when nothing is related.
pub async fn send_data(
    unit: &impl Unit,
    store: &impl RelationStore,
    issuer_url: &str,
) -> Result<()> {
    if !unit.is_leader().await.context(LeadershipSnafu)? {
        tracing::info!("not the leader, skipping sending the issuer URL");
        return Ok(());
    }
    let relations = store
        .relations(DEX_OIDC_CONFIG_ENDPOINT)
        .await
        .context(ListRelationsSnafu {
            endpoint: DEX_OIDC_CONFIG_ENDPOINT,
        })?;
    let data = RelationData::from([(ISSUER_URL_KEY.to_string(), issuer_url.to_string())]);
    for relation in &relations {
        publish(store, DEX_OIDC_CONFIG_ENDPOINT, relation, data.clone())
            .await
            .context(PublishDataSnafu {
                relation_id: relation.id,
            })?;
    }
    Ok(())
}

/// Reads the issuer URL published by the single related provider on `endpoint`.
pub async fn get_data(store: &impl RelationStore, endpoint: &str) -> Result<DexOidcConfig> {
    let relations = store
        .relations(endpoint)
        .await
        .context(ListRelationsSnafu { endpoint })?;
    ensure!(
        relations.len() <= 1,
        TooManyRelatedAppsSnafu {
            endpoint,
            count: relations.len()
        }
    );
    let relation = relations.into_iter().next().context(RelationMissingSnafu)?;
    ensure!(relation.remote_app.is_some(), RelationMissingSnafu);
    ensure!(
        !relation.remote_app_data.is_empty(),
        RelationDataMissingSnafu { endpoint }
    );
    let issuer_url = relation
        .remote_app_data
        .get(ISSUER_URL_KEY)
        .context(AttributeMissingSnafu {
            endpoint,
            key: ISSUER_URL_KEY,
        })?;
    Ok(DexOidcConfig {
        issuer_url: issuer_url.clone(),
    })
}
