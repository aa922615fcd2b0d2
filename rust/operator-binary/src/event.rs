//! Events that trigger a reconciliation.

use snafu::{OptionExt, Snafu};
use strum::{Display, EnumDiscriminants, EnumIter, EnumString, IntoStaticStr};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("event {kind} requires a relation id"))]
    MissingRelationId { kind: EventKind },

    #[snafu(display("event {kind} requires a redirect URI"))]
    MissingRedirectUri { kind: EventKind },
}

#[derive(Clone, Debug, EnumDiscriminants, Eq, PartialEq)]
#[strum_discriminants(
    name(EventKind),
    derive(Display, EnumIter, EnumString, IntoStaticStr, Hash),
    strum(serialize_all = "kebab-case")
)]
pub enum Event {
    Install,
    UpgradeCharm,
    ConfigChanged,
    LeaderElected,
    DexPebbleReady,
    UpdateStatus,
    OidcClientRelationChanged,
    IngressRelationCreated,
    IngressRelationChanged,
    IngressReady,
    IngressRevoked,
    DexOidcConfigRelationCreated,
    /// A dynamic client was registered over the `oauth` relation.
    OauthClientCreated {
        relation_id: u32,
        redirect_uri: String,
    },
    OauthClientChanged {
        relation_id: u32,
        redirect_uri: String,
    },
    OauthClientDeleted {
        relation_id: u32,
    },
}

impl Event {
    /// Builds the event of `kind`, taking the arguments the OAuth client events carry.
    pub fn from_kind(
        kind: EventKind,
        relation_id: Option<u32>,
        redirect_uri: Option<String>,
    ) -> Result<Self, Error> {
        Ok(match kind {
            EventKind::Install => Self::Install,
            EventKind::UpgradeCharm => Self::UpgradeCharm,
            EventKind::ConfigChanged => Self::ConfigChanged,
            EventKind::LeaderElected => Self::LeaderElected,
            EventKind::DexPebbleReady => Self::DexPebbleReady,
            EventKind::UpdateStatus => Self::UpdateStatus,
            EventKind::OidcClientRelationChanged => Self::OidcClientRelationChanged,
            EventKind::IngressRelationCreated => Self::IngressRelationCreated,
            EventKind::IngressRelationChanged => Self::IngressRelationChanged,
            EventKind::IngressReady => Self::IngressReady,
            EventKind::IngressRevoked => Self::IngressRevoked,
            EventKind::DexOidcConfigRelationCreated => Self::DexOidcConfigRelationCreated,
            EventKind::OauthClientCreated => Self::OauthClientCreated {
                relation_id: relation_id.context(MissingRelationIdSnafu { kind })?,
                redirect_uri: redirect_uri.context(MissingRedirectUriSnafu { kind })?,
            },
            EventKind::OauthClientChanged => Self::OauthClientChanged {
                relation_id: relation_id.context(MissingRelationIdSnafu { kind })?,
                redirect_uri: redirect_uri.context(MissingRedirectUriSnafu { kind })?,
            },
            EventKind::OauthClientDeleted => Self::OauthClientDeleted {
                relation_id: relation_id.context(MissingRelationIdSnafu { kind })?,
            },
        })
    }

    pub fn kind(&self) -> EventKind {
        self.into()
    }
}
