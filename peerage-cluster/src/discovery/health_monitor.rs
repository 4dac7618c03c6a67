//! TTL liveness loop for the Consul backend
//!
//! Marks the service check passing at half the TTL. When Consul fails
//! internally while handling the pass, the loop polls the peer list until
//! Consul answers again and re-registers this node if it has dropped out.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use peerage_core::ConsulConfig;

use super::backend::DiscoveryBackend;
use super::consul::ConsulBackend;

/// Where the loop currently is within a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    CheckingLiveness,
    Recovering,
}

/// How hard to retry discovery after Consul reports an internal fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub max_attempts: u32,
    pub retry_interval: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            retry_interval: Duration::from_secs(1),
        }
    }
}

impl RecoveryPolicy {
    #[must_use]
    pub fn from_config(config: &ConsulConfig) -> Self {
        Self {
            max_attempts: config.recovery_attempts.max(1),
            retry_interval: Duration::from_secs(config.recovery_interval_secs),
        }
    }
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The check was marked passing
    Passed,
    /// The pass failed for a reason that needs no corrective action
    Ignored,
    /// Consul failed internally and recovery ran
    Recovered(RecoveryOutcome),
}

/// Result of the recovery protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Consul still lists this node; nothing was re-registered
    StillRegistered,
    /// This node was missing and has been registered again
    Reregistered,
    /// This node was missing and registering it again failed
    ReregistrationFailed,
    /// Discovery never succeeded within the retry budget
    RegistryUnavailable,
    /// Shutdown was requested while waiting between attempts
    Cancelled,
}

/// Periodic TTL check pass with self-healing re-registration
///
/// Ticks run one at a time inside a single task; a tick that outlives the
/// interval causes the missed ticks to be skipped, not queued.
pub struct HealthCheckLoop {
    backend: Arc<ConsulBackend>,
    check_interval: Duration,
    policy: RecoveryPolicy,
    state: Mutex<LoopState>,
    started: AtomicBool,
    cancel_token: CancellationToken,
}

impl HealthCheckLoop {
    /// Loop for the backend's configured TTL, or `None` when no TTL is set
    #[must_use]
    pub fn for_backend(backend: Arc<ConsulBackend>) -> Option<Self> {
        let ttl = backend.service_ttl()?;
        let policy = RecoveryPolicy::from_config(backend.config());
        Some(Self::with_policy(backend, ttl, policy))
    }

    /// Create a loop firing at half of `ttl`
    #[must_use]
    pub fn with_policy(backend: Arc<ConsulBackend>, ttl: Duration, policy: RecoveryPolicy) -> Self {
        Self {
            backend,
            check_interval: ttl / 2,
            policy,
            state: Mutex::new(LoopState::Idle),
            started: AtomicBool::new(false),
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        self.check_interval
    }

    #[must_use]
    pub fn state(&self) -> LoopState {
        *self.state.lock()
    }

    fn set_state(&self, state: LoopState) {
        *self.state.lock() = state;
    }

    /// Start the timer task
    ///
    /// Only the first call spawns the task; later calls return `None`.
    pub fn start(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Health check loop already started");
            return None;
        }

        let this = self.clone();
        let cancel_token = self.cancel_token.clone();
        let period = self.check_interval.max(Duration::from_millis(1));
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            "Starting Consul health check loop"
        );

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        tracing::info!("Health check loop shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        this.tick().await;
                    }
                }
            }
        });

        Some(handle)
    }

    /// Stop the timer task and abort any recovery wait in progress
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Send one TTL check pass and handle its failure
    pub async fn tick(&self) -> TickOutcome {
        self.set_state(LoopState::CheckingLiveness);

        let outcome = match self.backend.send_health_check_pass().await {
            Ok(()) => TickOutcome::Passed,
            Err(e) if e.is_registry_fault() => {
                tracing::warn!(error = %e, "Consul failed to mark the TTL check passing, starting recovery");
                self.set_state(LoopState::Recovering);
                TickOutcome::Recovered(self.recover().await)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to mark the Consul TTL check passing");
                TickOutcome::Ignored
            }
        };

        self.set_state(LoopState::Idle);
        outcome
    }

    /// Wait for Consul to answer discovery again, then re-register if this node is gone
    ///
    /// A node that is still listed is not re-registered even though its check
    /// just failed; the next successful pass is expected to restore it.
    async fn recover(&self) -> RecoveryOutcome {
        let mut nodes = None;
        for attempt in 1..=self.policy.max_attempts {
            match self.backend.discover().await {
                Ok(found) => {
                    nodes = Some(found);
                    break;
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "Consul discovery failed during recovery");
                }
            }

            if attempt < self.policy.max_attempts {
                tokio::select! {
                    () = self.cancel_token.cancelled() => return RecoveryOutcome::Cancelled,
                    () = tokio::time::sleep(self.policy.retry_interval) => {}
                }
            }
        }

        let Some(nodes) = nodes else {
            tracing::error!(
                attempts = self.policy.max_attempts,
                "Consul is unreachable or failing, cannot recover cluster registration"
            );
            return RecoveryOutcome::RegistryUnavailable;
        };

        let local_node = self.backend.local_node();
        if nodes.contains(local_node) {
            tracing::error!(
                node = %local_node,
                "TTL check pass failed but the node is still registered; treating it as a transient Consul fault"
            );
            return RecoveryOutcome::StillRegistered;
        }

        tracing::error!(node = %local_node, "Node is no longer registered in Consul, registering again");
        match self.backend.register().await {
            Ok(()) => RecoveryOutcome::Reregistered,
            Err(e) => {
                tracing::error!(node = %local_node, error = %e, "Failed to register again with Consul");
                RecoveryOutcome::ReregistrationFailed
            }
        }
    }
}
