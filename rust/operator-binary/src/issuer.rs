//! Resolution of the externally visible issuer URL.

use crate::relations::ingress::ROUTE_PREFIX;

/// Everything the issuer URL may be derived from.
#[derive(Clone, Copy, Debug)]
pub struct IssuerInputs<'a> {
    pub issuer_url: Option<&'a str>,
    /// Deprecated in favour of `issuer_url`.
    pub public_url: Option<&'a str>,
    pub ingress_url: Option<&'a str>,
    pub app_name: &'a str,
    pub namespace: &'a str,
    pub port: u16,
}

/// Returns the first of: the configured issuer URL, the normalized public URL, the ingress URL,
/// and the in-cluster service URL.
pub fn resolve(inputs: IssuerInputs<'_>) -> String {
    if let Some(issuer_url) = inputs.issuer_url {
        return issuer_url.to_string();
    }
    if let Some(public_url) = inputs.public_url {
        tracing::warn!(
            "the public-url option is deprecated and will be removed, use issuer-url instead"
        );
        return format!("{}{ROUTE_PREFIX}", with_scheme(public_url));
    }
    if let Some(ingress_url) = inputs.ingress_url {
        return ingress_url.to_string();
    }
    format!(
        "http://{app}.{namespace}.svc:{port}{ROUTE_PREFIX}",
        app = inputs.app_name,
        namespace = inputs.namespace,
        port = inputs.port,
    )
}

fn with_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}
