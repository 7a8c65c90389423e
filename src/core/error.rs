use crate::core::config::ConfigError;
use crate::core::coordinator::CoordinatorError;

/// Errors surfaced by the supervisor itself.
///
/// Activity failures are not errors here; they are reported to the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("invalid supervisor configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to report activity outcome: {source}")]
    Report {
        #[source]
        source: CoordinatorError,
    },
}
