//! The Dex container and the desired state pushed into it.

use snafu::{ResultExt, Snafu};

use crate::{
    backend,
    layer::{Layer, CONFIG_PATH, SERVICE_NAME},
};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to read the current layer"))]
    ReadLayer { source: backend::Error },

    #[snafu(display("failed to replace the layer"))]
    ReplaceLayer { source: backend::Error },

    #[snafu(display("failed to read {path}"))]
    PullConfig {
        source: backend::Error,
        path: &'static str,
    },

    #[snafu(display("failed to write {path}"))]
    PushConfig {
        source: backend::Error,
        path: &'static str,
    },

    #[snafu(display("failed to restart service {service}"))]
    Restart {
        source: backend::Error,
        service: &'static str,
    },
}

/// Process supervisor and filesystem of the workload container.
#[allow(async_fn_in_trait)]
pub trait Workload {
    /// Whether the container accepts configuration yet.
    async fn can_connect(&self) -> bool;

    /// The layer currently applied, empty if none was applied yet.
    async fn layer(&self) -> Result<Layer, backend::Error>;

    async fn replace_layer(&self, layer: &Layer) -> Result<(), backend::Error>;

    /// `None` if there is no file at `path`.
    async fn pull(&self, path: &str) -> Result<Option<Vec<u8>>, backend::Error>;

    /// Writes `content` to `path`, creating missing parent directories.
    async fn push(&self, path: &str, content: &[u8]) -> Result<(), backend::Error>;

    async fn restart(&self, service: &str) -> Result<(), backend::Error>;
}

/// Desired state of the workload, computed in full before anything is applied.
#[derive(Debug)]
pub struct Plan {
    pub layer: Layer,
    pub config: Vec<u8>,
}

/// What [`Plan::apply`] had to change. The service is restarted either way.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ApplyReport {
    pub layer_replaced: bool,
    pub config_written: bool,
}

impl Plan {
    /// Replaces the layer and rewrites the configuration file where they differ from what is
    /// applied, then restarts Dex.
    #[tracing::instrument(skip_all, ret(level = "debug"))]
    pub async fn apply(&self, workload: &impl Workload) -> Result<ApplyReport, Error> {
        let mut report = ApplyReport::default();

        let current = workload.layer().await.context(ReadLayerSnafu)?;
        if self.layer.differs_from(&current) {
            tracing::info!("replacing pebble layer");
            workload
                .replace_layer(&self.layer)
                .await
                .context(ReplaceLayerSnafu)?;
            report.layer_replaced = true;
        }

        let applied = workload
            .pull(CONFIG_PATH)
            .await
            .context(PullConfigSnafu { path: CONFIG_PATH })?;
        if applied.as_deref() != Some(self.config.as_slice()) {
            tracing::info!(path = CONFIG_PATH, "writing dex configuration");
            workload
                .push(CONFIG_PATH, &self.config)
                .await
                .context(PushConfigSnafu { path: CONFIG_PATH })?;
            report.config_written = true;
        }

        // dex does not reload its configuration file reliably
        workload
            .restart(SERVICE_NAME)
            .await
            .context(RestartSnafu {
                service: SERVICE_NAME,
            })?;
        Ok(report)
    }
}
