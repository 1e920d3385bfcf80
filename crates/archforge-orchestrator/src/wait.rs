//! Readiness waiting with a fixed poll interval and cancellation support.
//!
//! Polls a resource's status until it reaches a terminal success value, a
//! terminal failure value, or the configured time bound runs out. The
//! calling stage suspends until the wait resolves.

use crate::config::WaiterConfig;
use crate::error::OrchestrationError;
use crate::provider::{CloudProvider, LookupFilter, ResourceRecord};
use archforge_common::ResourceKind;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// State of a readiness wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitState {
    Pending,
    Ready,
    Failed(String),
    Timeout,
}

/// What counts as done for one kind of wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTarget {
    /// Human-readable goal used in logs ("available", "deleted")
    pub goal: &'static str,
    /// Statuses that resolve the wait successfully
    pub ready: &'static [&'static str],
    /// Statuses that resolve the wait as failed
    pub failed: &'static [&'static str],
    /// Whether the resource disappearing from the provider counts as ready
    pub absent_is_ready: bool,
}

impl WaitTarget {
    pub const VPC_AVAILABLE: WaitTarget = WaitTarget {
        goal: "available",
        ready: &["available"],
        failed: &[],
        absent_is_ready: false,
    };

    pub const NAT_GATEWAY_AVAILABLE: WaitTarget = WaitTarget {
        goal: "available",
        ready: &["available"],
        failed: &["failed", "deleting", "deleted"],
        absent_is_ready: false,
    };

    pub const NAT_GATEWAY_DELETED: WaitTarget = WaitTarget {
        goal: "deleted",
        ready: &["deleted"],
        failed: &["failed"],
        absent_is_ready: true,
    };

    pub const DB_INSTANCE_AVAILABLE: WaitTarget = WaitTarget {
        goal: "available",
        ready: &["available"],
        failed: &[
            "failed",
            "inaccessible-encryption-credentials",
            "incompatible-network",
            "incompatible-option-group",
            "incompatible-parameters",
            "incompatible-restore",
            "restore-error",
            "storage-full",
        ],
        absent_is_ready: false,
    };

    pub const LOAD_BALANCER_ACTIVE: WaitTarget = WaitTarget {
        goal: "active",
        ready: &["active"],
        failed: &["failed"],
        absent_is_ready: false,
    };

    pub const INSTANCE_TERMINATED: WaitTarget = WaitTarget {
        goal: "terminated",
        ready: &["terminated"],
        failed: &[],
        absent_is_ready: true,
    };

    /// Wait for a resource to disappear from the provider entirely.
    pub const GONE: WaitTarget = WaitTarget {
        goal: "gone",
        ready: &[],
        failed: &[],
        absent_is_ready: true,
    };

    /// Classify one observation of the resource.
    ///
    /// A resource that is not (yet) visible stays pending unless absence is
    /// the goal, since freshly created resources can lag in describe calls.
    pub fn classify(&self, record: Option<&ResourceRecord>) -> WaitState {
        let Some(record) = record else {
            return if self.absent_is_ready {
                WaitState::Ready
            } else {
                WaitState::Pending
            };
        };
        match record.status.as_deref() {
            Some(status) if self.ready.contains(&status) => WaitState::Ready,
            Some(status) if self.failed.contains(&status) => {
                WaitState::Failed(status.to_string())
            }
            _ => WaitState::Pending,
        }
    }
}

/// Polls the provider until a resource reaches its target state
pub struct ReadinessWaiter<'a, P> {
    provider: &'a P,
    poll_interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
}

impl<'a, P: CloudProvider> ReadinessWaiter<'a, P> {
    pub fn new(provider: &'a P, config: &WaiterConfig, cancel: CancellationToken) -> Self {
        Self {
            provider,
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
            cancel,
        }
    }

    /// Wait for the resource `id` of `kind` to reach `target`.
    ///
    /// Always polls at least once before resolving, re-polls on a fixed
    /// interval (shortened only to land the last poll on the bound), and gives up with [`OrchestrationError::WaiterTimeout`] once
    /// the bound has elapsed. Cancellation is honoured while sleeping.
    pub async fn wait(
        &self,
        kind: ResourceKind,
        name: &str,
        id: &str,
        target: WaitTarget,
    ) -> Result<(), OrchestrationError> {
        let start = Instant::now();
        let mut polls = 0u32;
        let mut last_status: Option<String> = None;

        info!(kind = %kind, name = %name, id = %id, goal = target.goal, "Waiting for resource");

        loop {
            if self.cancel.is_cancelled() {
                return Err(OrchestrationError::Cancelled);
            }

            polls += 1;
            let records = self
                .provider
                .describe(kind, &LookupFilter::Id(id.to_string()))
                .await
                .map_err(|source| OrchestrationError::Provision {
                    action: "describe",
                    kind,
                    name: name.to_string(),
                    source,
                })?;
            let record = records.first();
            if let Some(status) = record.and_then(|r| r.status.clone()) {
                last_status = Some(status);
            }

            match target.classify(record) {
                WaitState::Ready => {
                    info!(
                        kind = %kind,
                        name = %name,
                        polls,
                        elapsed_secs = start.elapsed().as_secs(),
                        "Resource {}", target.goal
                    );
                    return Ok(());
                }
                WaitState::Failed(status) => {
                    return Err(OrchestrationError::WaiterFailed {
                        kind,
                        name: name.to_string(),
                        status,
                    });
                }
                WaitState::Pending | WaitState::Timeout => {}
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(OrchestrationError::WaiterTimeout {
                    kind,
                    name: name.to_string(),
                    elapsed,
                    polls,
                    last_status,
                });
            }

            // The last sleep is cut short so the final poll lands on the bound
            let delay = self.poll_interval.min(self.timeout.saturating_sub(elapsed));
            debug!(
                kind = %kind,
                name = %name,
                poll = polls,
                status = ?last_status,
                delay_secs = delay.as_secs(),
                "Resource not ready, polling again"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    return Err(OrchestrationError::Cancelled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockCloudProvider;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(poll_secs: u64, timeout_secs: u64) -> WaiterConfig {
        WaiterConfig {
            poll_interval_secs: poll_secs,
            timeout_secs,
        }
    }

    fn with_status(status: &str) -> Vec<ResourceRecord> {
        vec![ResourceRecord::new("db-1").with_status(status)]
    }

    #[test]
    fn test_classify_transitions() {
        let target = WaitTarget::DB_INSTANCE_AVAILABLE;
        assert_eq!(target.classify(None), WaitState::Pending);
        assert_eq!(
            target.classify(with_status("creating").first()),
            WaitState::Pending
        );
        assert_eq!(
            target.classify(with_status("available").first()),
            WaitState::Ready
        );
        assert_eq!(
            target.classify(with_status("storage-full").first()),
            WaitState::Failed("storage-full".to_string())
        );
        assert_eq!(WaitTarget::GONE.classify(None), WaitState::Ready);
        assert_eq!(
            WaitTarget::NAT_GATEWAY_DELETED.classify(with_status("deleting").first()),
            WaitState::Pending
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_status_sequence() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let mut provider = MockCloudProvider::new();
        provider.expect_describe().returning(move |_, filter| {
            assert_eq!(filter, &LookupFilter::Id("db-1".to_string()));
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(with_status(match n {
                0 | 1 => "creating",
                2 => "backing-up",
                _ => "available",
            }))
        });

        let waiter = ReadinessWaiter::new(&provider, &config(5, 600), CancellationToken::new());
        let start = Instant::now();
        waiter
            .wait(ResourceKind::DbInstance, "web-db", "db-1", WaitTarget::DB_INSTANCE_AVAILABLE)
            .await
            .unwrap();
        assert_eq!(polls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_ready_still_polls_once() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_describe()
            .times(1)
            .returning(|_, _| Ok(with_status("available")));

        let waiter = ReadinessWaiter::new(&provider, &config(5, 600), CancellationToken::new());
        let start = Instant::now();
        waiter
            .wait(ResourceKind::Vpc, "web-vpc", "vpc-1", WaitTarget::VPC_AVAILABLE)
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_terminal_times_out() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_describe()
            .returning(|_, _| Ok(with_status("modifying")));

        let waiter = ReadinessWaiter::new(&provider, &config(5, 30), CancellationToken::new());
        let err = waiter
            .wait(ResourceKind::DbInstance, "web-db", "db-1", WaitTarget::DB_INSTANCE_AVAILABLE)
            .await
            .unwrap_err();
        match err {
            OrchestrationError::WaiterTimeout {
                polls,
                elapsed,
                last_status,
                ..
            } => {
                assert_eq!(polls, 7);
                assert_eq!(elapsed, Duration::from_secs(30));
                assert_eq!(last_status.as_deref(), Some("modifying"));
            }
            other => panic!("expected WaiterTimeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_not_overshot_by_poll_interval() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_describe()
            .returning(|_, _| Ok(with_status("pending")));

        let waiter = ReadinessWaiter::new(&provider, &config(5, 12), CancellationToken::new());
        let start = Instant::now();
        let err = waiter
            .wait(ResourceKind::NatGateway, "web-nat", "nat-1", WaitTarget::NAT_GATEWAY_AVAILABLE)
            .await
            .unwrap_err();
        assert_eq!(start.elapsed(), Duration::from_secs(12));
        match err {
            OrchestrationError::WaiterTimeout { polls, elapsed, .. } => {
                // 0s, 5s, 10s, then the shortened poll at 12s
                assert_eq!(polls, 4);
                assert_eq!(elapsed, Duration::from_secs(12));
            }
            other => panic!("expected WaiterTimeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_status_resolves_failed() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_describe()
            .returning(|_, _| Ok(with_status("failed")));

        let waiter = ReadinessWaiter::new(&provider, &config(5, 600), CancellationToken::new());
        let err = waiter
            .wait(ResourceKind::NatGateway, "web-nat", "nat-1", WaitTarget::NAT_GATEWAY_AVAILABLE)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::WaiterFailed { ref status, .. } if status == "failed"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_resource_counts_as_gone() {
        let mut provider = MockCloudProvider::new();
        provider.expect_describe().returning(|_, _| Ok(vec![]));

        let waiter = ReadinessWaiter::new(&provider, &config(5, 600), CancellationToken::new());
        waiter
            .wait(ResourceKind::LoadBalancer, "web-alb", "arn:lb", WaitTarget::GONE)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let mut provider = MockCloudProvider::new();
        provider
            .expect_describe()
            .returning(|_, _| Ok(with_status("pending")));

        let cancel = CancellationToken::new();
        let waiter = ReadinessWaiter::new(&provider, &config(5, 600), cancel.clone());
        let trigger = async {
            tokio::time::sleep(Duration::from_secs(12)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(
            waiter.wait(ResourceKind::Vpc, "web-vpc", "vpc-1", WaitTarget::VPC_AVAILABLE),
            trigger
        );
        assert!(matches!(result, Err(OrchestrationError::Cancelled)));
    }
}
