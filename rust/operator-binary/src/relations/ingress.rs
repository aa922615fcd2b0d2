//! Route published to the ingress provider, and the public URL it assigns in return.

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use url::Url;

use crate::{
    relations::{sdi, RelationStore, INGRESS_ENDPOINT},
    status::Severity,
};

pub const ROUTE_PREFIX: &str = "/dex";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("{source}"))]
    Negotiate { source: sdi::Error },

    #[snafu(display("failed to publish the ingress route"))]
    PublishRoute { source: sdi::Error },

    #[snafu(display("failed to read the ingress URL"))]
    ReadUrl { source: sdi::Error },

    #[snafu(display("ingress provider published an invalid URL {url:?}"))]
    InvalidUrl {
        source: url::ParseError,
        url: String,
    },
}

impl Error {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Negotiate { source } => source.severity(),
            Self::InvalidUrl { .. } => Severity::Blocked,
            Self::PublishRoute { .. } | Self::ReadUrl { .. } => Severity::Fatal,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Route {
    pub prefix: String,
    pub rewrite: String,
    pub service: String,
    pub port: u16,
}

impl Route {
    pub fn new(service: impl Into<String>, port: u16) -> Self {
        Self {
            prefix: ROUTE_PREFIX.to_string(),
            rewrite: ROUTE_PREFIX.to_string(),
            service: service.into(),
            port,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Assigned {
    url: Option<String>,
}

/// Publishes `route` on the ingress relation and returns the URL assigned by the provider, if any.
pub async fn sync(store: &impl RelationStore, route: &Route) -> Result<Option<String>, Error> {
    sdi::advertise_versions(store, INGRESS_ENDPOINT)
        .await
        .context(NegotiateSnafu)?;
    let Some(negotiated) = sdi::negotiate(store, INGRESS_ENDPOINT)
        .await
        .context(NegotiateSnafu)?
    else {
        return Ok(None);
    };
    negotiated
        .send_payload(store, route)
        .await
        .context(PublishRouteSnafu)?;

    let assigned = negotiated
        .remote_payloads::<Assigned>()
        .context(ReadUrlSnafu)?
        .into_iter()
        .find_map(|assigned| assigned.url.filter(|url| !url.is_empty()));
    if let Some(url) = &assigned {
        Url::parse(url).context(InvalidUrlSnafu { url })?;
        tracing::debug!(url, "ingress URL assigned");
    }
    Ok(assigned)
}
