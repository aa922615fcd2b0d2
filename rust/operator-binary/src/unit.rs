use crate::{backend, status::Status};

/// The unit this operator runs as: its identity, leadership and status.
#[allow(async_fn_in_trait)]
pub trait Unit {
    fn app_name(&self) -> &str;

    /// Namespace (model name) the workload is deployed into.
    fn namespace(&self) -> &str;

    /// Whether this unit holds exclusive write authority over the application.
    async fn is_leader(&self) -> Result<bool, backend::Error>;

    async fn set_status(&self, status: &Status) -> Result<(), backend::Error>;
}
