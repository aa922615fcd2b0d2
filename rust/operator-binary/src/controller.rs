//! Reconciles the Dex workload with the charm configuration, relation data and persisted secrets.

use snafu::{ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::{
    backend,
    config::{self, CharmConfig},
    dex_config::{self, CompileInputs},
    event::Event,
    issuer::{self, IssuerInputs},
    layer,
    relations::{
        ingress::{self, Route},
        oauth::{self, ProviderInfo},
        oidc_client, oidc_config, sdi, RelationStore,
    },
    state::{self, SecretStore},
    status::{Severity, Status},
    unit::Unit,
    workload::{self, ApplyReport, Plan, Workload},
};

/// Everything a reconciliation reads from and writes to.
pub struct Ctx<U, S, R, W> {
    pub unit: U,
    pub secrets: S,
    pub relations: R,
    pub workload: W,
    pub config: CharmConfig,
}

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("failed to check leadership"))]
    Leadership { source: backend::Error },

    #[snafu(display("Waiting for leadership"))]
    NotLeader,

    #[snafu(display("failed to set unit status"))]
    SetStatus { source: backend::Error },

    #[snafu(display("invalid connectors configuration"))]
    InvalidConnectors { source: config::Error },

    #[snafu(display("invalid login configuration"))]
    LoginMethod { source: dex_config::Error },

    #[snafu(display("failed to handle the oauth client event"))]
    OauthClient { source: oauth::Error },

    #[snafu(display("failed to load the static user identity"))]
    Identity { source: state::Error },

    #[snafu(display("failed to read OIDC client registrations"))]
    OidcClients { source: sdi::Error },

    #[snafu(display("failed to sync the ingress route"))]
    Ingress { source: ingress::Error },

    #[snafu(display("failed to publish the issuer URL"))]
    OidcConfig { source: oidc_config::Error },

    #[snafu(display("failed to publish the OAuth provider info"))]
    ProviderInfo { source: oauth::Error },

    #[snafu(display("failed to load the OAuth static client"))]
    StaticClient { source: state::Error },

    #[snafu(display("failed to compile the Dex configuration"))]
    CompileConfig { source: dex_config::Error },

    #[snafu(display("Waiting for Pebble in workload container"))]
    WorkloadUnreachable,

    #[snafu(display("failed to apply the desired state to the workload"))]
    Apply { source: workload::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::NotLeader | Self::WorkloadUnreachable => Severity::Waiting,
            Self::InvalidConnectors { .. } => Severity::Blocked,
            Self::LoginMethod { source } | Self::CompileConfig { source } => source.severity(),
            Self::OidcClients { source } => source.severity(),
            Self::Ingress { source } => source.severity(),
            _ => Severity::Fatal,
        }
    }

    /// The message shown in the unit status.
    pub fn status_message(&self) -> String {
        match self {
            Self::InvalidConnectors { source } => source.to_string(),
            Self::LoginMethod { source } | Self::CompileConfig { source } => source.to_string(),
            Self::OidcClients { source } => source.to_string(),
            Self::Ingress { source } => source.to_string(),
            _ => self.to_string(),
        }
    }
}

/// Runs one reconciliation pass for `event` and reports the resulting status.
///
/// Waiting and blocked conditions end the pass with the matching status. Any other error is
/// returned, leaving the unit in maintenance.
#[tracing::instrument(skip_all, fields(event = %event.kind()))]
pub async fn reconcile<U, S, R, W>(ctx: &Ctx<U, S, R, W>, event: &Event) -> Result<Status>
where
    U: Unit,
    S: SecretStore,
    R: RelationStore,
    W: Workload,
{
    tracing::info!("Starting reconcile");
    ctx.unit
        .set_status(&Status::maintenance("configuring"))
        .await
        .context(SetStatusSnafu)?;

    let status = match apply(ctx, event).await {
        Ok(report) => {
            tracing::info!(
                layer_replaced = report.layer_replaced,
                config_written = report.config_written,
                "Reconcile complete"
            );
            Status::Active
        }
        Err(err) => match err.severity().status(err.status_message()) {
            Some(status) => {
                tracing::info!(
                    error = &err as &dyn std::error::Error,
                    category = err.category(),
                    %status,
                    "Reconcile halted"
                );
                status
            }
            None => return Err(err),
        },
    };
    ctx.unit.set_status(&status).await.context(SetStatusSnafu)?;
    Ok(status)
}

async fn apply<U, S, R, W>(ctx: &Ctx<U, S, R, W>, event: &Event) -> Result<ApplyReport>
where
    U: Unit,
    S: SecretStore,
    R: RelationStore,
    W: Workload,
{
    let Ctx {
        unit,
        secrets,
        relations,
        workload,
        config,
    } = ctx;

    if !unit.is_leader().await.context(LeadershipSnafu)? {
        return NotLeaderSnafu.fail();
    }

    // oauth client lifecycle events are not redelivered
    handle_oauth_client_event(secrets, relations, event).await?;

    let connectors = config.connectors().context(InvalidConnectorsSnafu)?;
    dex_config::check_login_method(config.enable_password_db, connectors.as_ref())
        .context(LoginMethodSnafu)?;

    let identity = state::ensure_identity(secrets)
        .await
        .context(IdentitySnafu)?;
    let oidc_clients = oidc_client::fetch(relations)
        .await
        .context(OidcClientsSnafu)?;
    let ingress_url = ingress::sync(relations, &Route::new(unit.app_name(), config.port))
        .await
        .context(IngressSnafu)?;

    let issuer_url = issuer::resolve(IssuerInputs {
        issuer_url: config.issuer_url(),
        public_url: config.public_url(),
        ingress_url: ingress_url.as_deref(),
        app_name: unit.app_name(),
        namespace: unit.namespace(),
        port: config.port,
    });
    tracing::debug!(issuer_url, "resolved issuer URL");

    oidc_config::send_data(unit, relations, &issuer_url)
        .await
        .context(OidcConfigSnafu)?;
    oauth::publish_provider_info(relations, &ProviderInfo::new(&issuer_url))
        .await
        .context(ProviderInfoSnafu)?;

    let oauth_static_client = state::oauth_static_client(secrets)
        .await
        .context(StaticClientSnafu)?;
    let dex_config = dex_config::compile(CompileInputs {
        identity: &identity,
        oidc_clients: &oidc_clients,
        oauth_static_client: oauth_static_client.as_ref(),
        connectors: connectors.as_ref(),
        port: config.port,
        issuer_url: &issuer_url,
        enable_password_db: config.enable_password_db,
        static_username: config.static_username(),
        static_password: config.static_password(),
        log_level: config.log_level,
    })
    .context(CompileConfigSnafu)?;
    let plan = Plan {
        layer: layer::build(unit.namespace()),
        config: dex_config.to_yaml().context(CompileConfigSnafu)?,
    };

    if !workload.can_connect().await {
        tracing::debug!(container = layer::CONTAINER_NAME, "cannot connect to pebble");
        return WorkloadUnreachableSnafu.fail();
    }
    plan.apply(workload).await.context(ApplySnafu)
}

async fn handle_oauth_client_event(
    secrets: &impl SecretStore,
    relations: &impl RelationStore,
    event: &Event,
) -> Result<()> {
    match event {
        Event::OauthClientCreated {
            relation_id,
            redirect_uri,
        } => {
            oauth::client_created(secrets, relations, *relation_id, redirect_uri)
                .await
                .context(OauthClientSnafu)?;
        }
        Event::OauthClientChanged { redirect_uri, .. } => {
            oauth::client_changed(secrets, redirect_uri)
                .await
                .context(OauthClientSnafu)?;
        }
        Event::OauthClientDeleted { .. } => {
            oauth::client_deleted(secrets)
                .await
                .context(OauthClientSnafu)?;
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        layer::CONFIG_PATH,
        memory::{MemoryRelations, MemorySecrets, MemoryUnit, MemoryWorkload},
        relations::{
            oidc_config::ISSUER_URL_KEY,
            sdi::{DATA_KEY, SUPPORTED_VERSIONS_KEY},
            Relation, RelationData, DEX_OIDC_CONFIG_ENDPOINT, INGRESS_ENDPOINT, OAUTH_ENDPOINT,
            OIDC_CLIENT_ENDPOINT,
        },
        state::IDENTITY_LABEL,
    };

    type TestCtx = Ctx<MemoryUnit, MemorySecrets, MemoryRelations, MemoryWorkload>;

    fn ctx(config: CharmConfig) -> TestCtx {
        Ctx {
            unit: MemoryUnit::leader(),
            secrets: MemorySecrets::default(),
            relations: MemoryRelations::default(),
            workload: MemoryWorkload::default(),
            config,
        }
    }

    fn versioned(id: u32, app: &str, data: Option<&str>) -> Relation {
        let mut remote_app_data =
            RelationData::from([(SUPPORTED_VERSIONS_KEY.to_string(), "- v1".to_string())]);
        if let Some(data) = data {
            remote_app_data.insert(DATA_KEY.to_string(), data.to_string());
        }
        Relation {
            id,
            remote_app: Some(app.to_string()),
            remote_app_data,
            ..Relation::default()
        }
    }

    fn rendered(ctx: &TestCtx) -> serde_yaml::Value {
        let config = ctx.workload.file(CONFIG_PATH).unwrap();
        serde_yaml::from_slice(&config).unwrap()
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let ctx = ctx(CharmConfig::default());
        assert_eq!(
            reconcile(&ctx, &Event::Install).await.unwrap(),
            Status::Active
        );
        let first = ctx.workload.file(CONFIG_PATH).unwrap();

        assert_eq!(
            reconcile(&ctx, &Event::ConfigChanged).await.unwrap(),
            Status::Active
        );
        assert_eq!(ctx.workload.file(CONFIG_PATH).unwrap(), first);
        assert_eq!(ctx.workload.file_writes(), 1);
        assert_eq!(ctx.workload.layer_writes(), 1);
        assert_eq!(ctx.workload.restarts(), 2);
        assert_eq!(
            ctx.unit.statuses(),
            [
                Status::maintenance("configuring"),
                Status::Active,
                Status::maintenance("configuring"),
                Status::Active,
            ]
        );
    }

    #[tokio::test]
    async fn test_identity_is_stable() {
        let ctx = ctx(CharmConfig::default());
        reconcile(&ctx, &Event::Install).await.unwrap();
        let user_id = rendered(&ctx)["staticPasswords"][0]["userID"].clone();
        for _ in 0..5 {
            reconcile(&ctx, &Event::UpdateStatus).await.unwrap();
            assert_eq!(rendered(&ctx)["staticPasswords"][0]["userID"], user_id);
        }
        assert_eq!(ctx.secrets.writes(), [IDENTITY_LABEL]);
    }

    #[tokio::test]
    async fn test_follower_waits_without_side_effects() {
        let ctx = Ctx {
            unit: MemoryUnit::follower(),
            relations: MemoryRelations::default()
                .with(INGRESS_ENDPOINT, versioned(1, "istio-pilot", None))
                .with(DEX_OIDC_CONFIG_ENDPOINT, versioned(2, "oidc-gatekeeper", None)),
            ..ctx(CharmConfig::default())
        };
        let event = Event::OauthClientDeleted { relation_id: 3 };
        assert_eq!(
            reconcile(&ctx, &event).await.unwrap(),
            Status::waiting("Waiting for leadership")
        );
        assert!(ctx.relations.writes().is_empty());
        assert!(ctx.secrets.writes().is_empty());
        assert_eq!(ctx.workload.restarts(), 0);
    }

    #[tokio::test]
    async fn test_password_db_without_connectors_blocks() {
        let ctx = ctx(CharmConfig {
            enable_password_db: false,
            ..CharmConfig::default()
        });
        let status = reconcile(&ctx, &Event::ConfigChanged).await.unwrap();
        assert!(matches!(status, Status::Blocked(_)));
        assert!(ctx.secrets.writes().is_empty());
        assert_eq!(ctx.workload.file_writes(), 0);
        assert_eq!(ctx.workload.restarts(), 0);
    }

    #[tokio::test]
    async fn test_connectors_without_password_db() {
        let ctx = ctx(CharmConfig {
            enable_password_db: false,
            connectors: "foo: bar".to_string(),
            ..CharmConfig::default()
        });
        assert_eq!(
            reconcile(&ctx, &Event::ConfigChanged).await.unwrap(),
            Status::Active
        );
        let document = rendered(&ctx);
        assert_eq!(document["enablePasswordDB"].as_bool(), Some(false));
        assert_eq!(document["staticPasswords"].as_sequence().map(Vec::len), Some(0));
        assert_eq!(document["connectors"]["foo"].as_str(), Some("bar"));
    }

    #[tokio::test]
    async fn test_invalid_connectors_block() {
        let ctx = ctx(CharmConfig {
            connectors: "- type: [unterminated".to_string(),
            ..CharmConfig::default()
        });
        assert_eq!(
            reconcile(&ctx, &Event::ConfigChanged).await.unwrap(),
            Status::blocked("the connectors option is not valid YAML")
        );
    }

    #[tokio::test]
    async fn test_unreachable_workload_waits() {
        let ctx = Ctx {
            workload: MemoryWorkload::disconnected(),
            ..ctx(CharmConfig::default())
        };
        assert_eq!(
            reconcile(&ctx, &Event::Install).await.unwrap(),
            Status::waiting("Waiting for Pebble in workload container")
        );
    }

    #[tokio::test]
    async fn test_unlisted_ingress_versions_wait() {
        let ctx = Ctx {
            relations: MemoryRelations::default().with(
                INGRESS_ENDPOINT,
                Relation {
                    id: 1,
                    remote_app: Some("istio-pilot".to_string()),
                    ..Relation::default()
                },
            ),
            ..ctx(CharmConfig::default())
        };
        assert_eq!(
            reconcile(&ctx, &Event::IngressRelationChanged).await.unwrap(),
            Status::waiting("List of ingress versions not found for apps: istio-pilot")
        );
    }

    #[tokio::test]
    async fn test_incompatible_oidc_client_versions_block() {
        let ctx = Ctx {
            relations: MemoryRelations::default().with(
                OIDC_CLIENT_ENDPOINT,
                Relation {
                    id: 1,
                    remote_app: Some("oidc-gatekeeper".to_string()),
                    remote_app_data: RelationData::from([(
                        SUPPORTED_VERSIONS_KEY.to_string(),
                        "- v2".to_string(),
                    )]),
                    ..Relation::default()
                },
            ),
            ..ctx(CharmConfig::default())
        };
        assert_eq!(
            reconcile(&ctx, &Event::OidcClientRelationChanged)
                .await
                .unwrap(),
            Status::blocked("No compatible oidc-client versions found for apps: oidc-gatekeeper")
        );
    }

    #[tokio::test]
    async fn test_ingress_url_becomes_issuer() {
        let ctx = Ctx {
            relations: MemoryRelations::default()
                .with(
                    INGRESS_ENDPOINT,
                    versioned(1, "istio-pilot", Some("url: http://10.64.140.43.nip.io/dex")),
                )
                .with(DEX_OIDC_CONFIG_ENDPOINT, versioned(2, "oidc-gatekeeper", None)),
            ..ctx(CharmConfig::default())
        };
        reconcile(&ctx, &Event::IngressReady).await.unwrap();
        assert_eq!(
            rendered(&ctx)["issuer"].as_str(),
            Some("http://10.64.140.43.nip.io/dex")
        );
        let oidc_config = &ctx.relations.relations(DEX_OIDC_CONFIG_ENDPOINT).await.unwrap()[0];
        assert_eq!(
            oidc_config.app_data[ISSUER_URL_KEY],
            "http://10.64.140.43.nip.io/dex"
        );
    }

    #[tokio::test]
    async fn test_default_issuer_and_overrides() {
        let ctx = ctx(CharmConfig {
            port: 5557,
            static_username: "new-user".to_string(),
            ..CharmConfig::default()
        });
        reconcile(&ctx, &Event::ConfigChanged).await.unwrap();
        let document = rendered(&ctx);
        assert_eq!(
            document["issuer"].as_str(),
            Some("http://dex-auth.kubeflow.svc:5557/dex")
        );
        assert_eq!(document["web"]["http"].as_str(), Some("0.0.0.0:5557"));
        assert_eq!(
            document["staticPasswords"][0]["username"].as_str(),
            Some("new-user")
        );
        let identity = state::ensure_identity(&ctx.secrets).await.unwrap();
        assert_eq!(identity.username, "admin");
    }

    /// Two registered OIDC clients and an OAuth requirer on relation 3.
    fn oauth_relations() -> MemoryRelations {
        MemoryRelations::default()
            .with(
                OIDC_CLIENT_ENDPOINT,
                versioned(1, "a", Some("{id: a, name: A, redirectURIs: [], secret: s}")),
            )
            .with(
                OIDC_CLIENT_ENDPOINT,
                versioned(2, "b", Some("{id: b, name: B, redirectURIs: [], secret: s}")),
            )
            .with(
                OAUTH_ENDPOINT,
                Relation {
                    id: 3,
                    remote_app: Some("openfga".to_string()),
                    ..Relation::default()
                },
            )
    }

    fn static_client_ids(ctx: &TestCtx) -> Vec<String> {
        rendered(ctx)["staticClients"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|client| client["id"].as_str().unwrap().to_string())
            .collect()
    }

    fn without_login_method() -> CharmConfig {
        CharmConfig {
            enable_password_db: false,
            ..CharmConfig::default()
        }
    }

    fn with_connectors() -> CharmConfig {
        CharmConfig {
            enable_password_db: false,
            connectors: "foo: bar".to_string(),
            ..CharmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_oauth_client_lifecycle() {
        let ctx = Ctx {
            relations: oauth_relations(),
            ..ctx(CharmConfig::default())
        };

        let created = Event::OauthClientCreated {
            relation_id: 3,
            redirect_uri: "https://app/cb".to_string(),
        };
        assert_eq!(reconcile(&ctx, &created).await.unwrap(), Status::Active);
        let oauth = &ctx.relations.relations(OAUTH_ENDPOINT).await.unwrap()[0];
        let client_id = oauth.app_data["client_id"].clone();
        assert_eq!(
            oauth.app_data["token_endpoint"],
            "http://dex-auth.kubeflow.svc:5556/dex/token"
        );

        assert_eq!(
            static_client_ids(&ctx),
            ["a".to_string(), "b".to_string(), client_id]
        );

        let changed = Event::OauthClientChanged {
            relation_id: 3,
            redirect_uri: "https://app/new-cb".to_string(),
        };
        reconcile(&ctx, &changed).await.unwrap();
        assert_eq!(
            rendered(&ctx)["staticClients"][2]["redirectURIs"][0].as_str(),
            Some("https://app/new-cb")
        );

        let deleted = Event::OauthClientDeleted { relation_id: 3 };
        reconcile(&ctx, &deleted).await.unwrap();
        assert_eq!(
            rendered(&ctx)["staticClients"].as_sequence().map(Vec::len),
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_client_deleted_while_blocked() {
        let ctx = Ctx {
            relations: oauth_relations(),
            ..ctx(CharmConfig::default())
        };
        let created = Event::OauthClientCreated {
            relation_id: 3,
            redirect_uri: "https://app/cb".to_string(),
        };
        assert_eq!(reconcile(&ctx, &created).await.unwrap(), Status::Active);
        assert_eq!(static_client_ids(&ctx).len(), 3);

        let ctx = Ctx {
            config: without_login_method(),
            ..ctx
        };
        let deleted = Event::OauthClientDeleted { relation_id: 3 };
        assert!(matches!(
            reconcile(&ctx, &deleted).await.unwrap(),
            Status::Blocked(_)
        ));
        assert_eq!(state::oauth_static_client(&ctx.secrets).await.unwrap(), None);

        let ctx = Ctx {
            config: with_connectors(),
            ..ctx
        };
        assert_eq!(
            reconcile(&ctx, &Event::ConfigChanged).await.unwrap(),
            Status::Active
        );
        assert_eq!(static_client_ids(&ctx), ["a", "b"]);
    }

    #[tokio::test]
    async fn test_client_created_while_blocked() {
        let ctx = Ctx {
            relations: oauth_relations(),
            ..ctx(without_login_method())
        };
        let created = Event::OauthClientCreated {
            relation_id: 3,
            redirect_uri: "https://app/cb".to_string(),
        };
        assert!(matches!(
            reconcile(&ctx, &created).await.unwrap(),
            Status::Blocked(_)
        ));
        let oauth = &ctx.relations.relations(OAUTH_ENDPOINT).await.unwrap()[0];
        let client_id = oauth.app_data["client_id"].clone();
        assert_eq!(oauth.app_data["client_secret"].len(), 32);
        assert_eq!(ctx.workload.file_writes(), 0);

        let ctx = Ctx {
            config: with_connectors(),
            ..ctx
        };
        assert_eq!(
            reconcile(&ctx, &Event::ConfigChanged).await.unwrap(),
            Status::Active
        );
        assert_eq!(
            static_client_ids(&ctx),
            ["a".to_string(), "b".to_string(), client_id]
        );
    }

    #[tokio::test]
    async fn test_client_deleted_without_client() {
        let ctx = ctx(CharmConfig::default());
        let event = Event::OauthClientDeleted { relation_id: 7 };
        assert_eq!(reconcile(&ctx, &event).await.unwrap(), Status::Active);
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(Error::NotLeader.category(), "NotLeader");
        assert_eq!(Error::NotLeader.severity(), Severity::Waiting);
        let blocked = Error::LoginMethod {
            source: dex_config::Error::NoLoginMethod,
        };
        assert_eq!(blocked.severity(), Severity::Blocked);
        assert_eq!(
            blocked.status_message(),
            dex_config::Error::NoLoginMethod.to_string()
        );
    }
}
