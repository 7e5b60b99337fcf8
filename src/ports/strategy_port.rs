//! Strategy loading and deployment port traits.

use std::sync::Arc;

use crate::domain::error::QuantgateError;
use crate::domain::strategy::Strategy;

/// Turns strategy source text into a runnable instance.
pub trait StrategyLoader: Send + Sync {
    /// Each call returns a fresh instance that shares no state with any
    /// other loaded or deployed strategy.
    fn load(&self, name: &str, code: &str) -> Result<Arc<dyn Strategy>, QuantgateError>;
}

/// The deployed strategy sources, keyed by strategy name.
pub trait DeploymentStore: Send + Sync {
    /// Current deployed bytes, or `None` when nothing is deployed under `name`.
    fn snapshot(&self, name: &str) -> Result<Option<Vec<u8>>, QuantgateError>;

    /// Put back exactly `snapshot`; `None` removes the deployment.
    fn restore(&self, name: &str, snapshot: Option<&[u8]>) -> Result<(), QuantgateError>;

    /// Deployed strategy names, sorted.
    fn list(&self) -> Result<Vec<String>, QuantgateError>;
}
