//! The dispatcher: priority-ordered fallback across providers.
//!
//! For each candidate the dispatcher asks the rate limiter for admission,
//! reserves daily then monthly quota, and hands the task to the executor.
//! Transient failures release the reservations and move down the chain;
//! permanent failures end the task. When every candidate is exhausted the
//! task goes to the deferred queue, which a background sweep replays as
//! capacity frees up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span};
use uuid::Uuid;

use switchboard_types::config::OrchestratorConfig;
use switchboard_types::dispatch::{DispatchDecision, DispatchResult, SubmitOutcome};
use switchboard_types::error::{ConfigError, LedgerError, OrchestratorError, RepositoryError};
use switchboard_types::event::OrchestratorEvent;
use switchboard_types::health::{ComponentHealth, HealthReport};
use switchboard_types::provider::ProviderSpec;
use switchboard_types::quota::{ProviderQuotaStatus, WindowKind};
use switchboard_types::task::RequestTask;
use switchboard_types::usage::{UsageEvent, UsageSummary};

use crate::client::provider::InvokeRequest;
use crate::client::registry::ClientRegistry;
use crate::clock::Clock;
use crate::event::EventBus;
use crate::executor::{Executor, FailureClass};
use crate::ledger::{HeldReservations, QuotaLedger};
use crate::queue::DeferredQueue;
use crate::rate_limiter::RateLimiter;
use crate::registry::ProviderRegistry;
use crate::usage::{UsageRecorder, UsageRepository};

const EVENT_BUS_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Everything a config reload replaces, swapped as one unit.
pub struct Routing {
    pub registry: ProviderRegistry,
    pub clients: ClientRegistry,
    pub executor: Executor,
}

impl Routing {
    pub fn new(config: &OrchestratorConfig, clients: ClientRegistry) -> Self {
        let registry = ProviderRegistry::from_config(config);
        for spec in registry.providers() {
            if spec.enabled && clients.get(&spec.name).is_none() {
                tracing::warn!(provider = %spec.name, "No client registered for provider");
            }
        }
        Self {
            registry,
            clients,
            executor: Executor::from_config(&config.executor),
        }
    }
}

/// Result of one pass over the deferred queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub replayed: usize,
    pub rejected: usize,
    pub remaining: usize,
}

enum RouteOutcome {
    Dispatched(DispatchResult),
    Exhausted,
    Failed(OrchestratorError),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Caller-facing entry point. Share it behind an `Arc`.
pub struct Orchestrator<L: QuotaLedger + 'static, U: UsageRepository + 'static> {
    routing: ArcSwap<Routing>,
    ledger: Arc<L>,
    clock: Arc<dyn Clock>,
    rate_limiter: RateLimiter,
    recorder: UsageRecorder<U>,
    queue: DeferredQueue,
    events: EventBus,
    capacity_freed: Notify,
    sweep_interval: Duration,
    shutdown: CancellationToken,
}

impl<L: QuotaLedger + 'static, U: UsageRepository + 'static> Orchestrator<L, U> {
    pub fn new(
        config: &OrchestratorConfig,
        clients: ClientRegistry,
        ledger: Arc<L>,
        usage: Arc<U>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            routing: ArcSwap::from_pointee(Routing::new(config, clients)),
            ledger,
            rate_limiter: RateLimiter::new(Arc::clone(&clock)),
            clock,
            recorder: UsageRecorder::new(usage),
            queue: DeferredQueue::new(config.queue.capacity),
            events: EventBus::new(EVENT_BUS_CAPACITY),
            capacity_freed: Notify::new(),
            sweep_interval: Duration::from_secs(config.queue.sweep_interval_secs),
            shutdown: CancellationToken::new(),
        })
    }

    // -- Caller API ---------------------------------------------------------

    /// Submit a task with no caller-side cancellation.
    pub async fn submit(&self, task: RequestTask) -> SubmitOutcome {
        self.submit_with(task, &CancellationToken::new()).await
    }

    /// Submit a task. Cancelling `cancel` aborts an in-flight provider call
    /// and releases its reservations; the task is then rejected as
    /// `Cancelled`.
    pub async fn submit_with(&self, task: RequestTask, cancel: &CancellationToken) -> SubmitOutcome {
        let span = info_span!(
            "switchboard.submit",
            switchboard.task.id = %task.id,
            switchboard.task_type = %task.task_type,
            switchboard.task.estimated_tokens = task.estimated_tokens,
        );

        async move {
            let outcome = self.route(&task, cancel, true).await;
            match outcome {
                RouteOutcome::Dispatched(result) => {
                    self.events.publish(OrchestratorEvent::Dispatched {
                        task_id: result.task_id,
                        provider: result.provider.clone(),
                        tokens_consumed: result.tokens_consumed,
                        fallback_from: result.fallback_from.clone(),
                    });
                    SubmitOutcome::Dispatched(result)
                }
                RouteOutcome::Failed(error) => self.reject(task.id, error),
                RouteOutcome::Exhausted => self.defer(task).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Replace the provider registry, clients and executor settings.
    ///
    /// In-flight requests finish against the routing they started with.
    /// An invalid config is rejected and the current routing is kept.
    pub fn reload(&self, config: &OrchestratorConfig, clients: ClientRegistry) -> Result<(), ConfigError> {
        config.validate()?;
        let routing = Routing::new(config, clients);
        let provider_count = routing.registry.len();
        self.routing.store(Arc::new(routing));

        tracing::info!(providers = provider_count, "Provider registry reloaded");
        self.events
            .publish(OrchestratorEvent::RegistryReloaded { provider_count });
        // New providers or budgets may admit deferred work.
        self.capacity_freed.notify_one();
        Ok(())
    }

    /// Quota and rate status for every configured provider.
    pub async fn quota_summary(&self) -> Result<Vec<ProviderQuotaStatus>, LedgerError> {
        let routing = self.routing.load_full();
        let mut statuses = Vec::with_capacity(routing.registry.len());
        for spec in routing.registry.providers() {
            let daily = self
                .ledger
                .snapshot(&spec.name, WindowKind::Daily, spec.budget.daily_token_limit)
                .await?;
            let monthly = self
                .ledger
                .snapshot(&spec.name, WindowKind::Monthly, spec.budget.monthly_token_limit)
                .await?;
            statuses.push(ProviderQuotaStatus {
                provider: spec.name.clone(),
                priority: spec.priority,
                enabled: spec.enabled,
                daily,
                monthly,
                requests_this_minute: self.rate_limiter.current_count(&spec.name),
                requests_per_minute_limit: spec.budget.requests_per_minute_limit,
            });
        }
        Ok(statuses)
    }

    pub async fn usage_summary(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<UsageSummary>, RepositoryError> {
        self.recorder.repository().summarize(since).await
    }

    /// Check every component the routing path depends on.
    ///
    /// Enabled providers need a registered client, the ledger and usage log
    /// must answer a read, and at least one provider must be enabled.
    pub async fn health(&self) -> HealthReport {
        let routing = self.routing.load_full();
        let now = self.clock.now();

        let clients = routing
            .registry
            .providers()
            .iter()
            .map(|spec| {
                let health = if !spec.enabled {
                    ComponentHealth::disabled()
                } else if routing.clients.get(&spec.name).is_some() {
                    ComponentHealth::healthy()
                } else {
                    ComponentHealth::error("no client registered")
                };
                (spec.name.clone(), health)
            })
            .collect();

        let ledger = match self.ledger.outstanding().await {
            Ok(held) => ComponentHealth::healthy_with(format!("{held} outstanding reservations")),
            Err(e) => ComponentHealth::error(e.to_string()),
        };

        let usage_log = match self.recorder.repository().list_since(now).await {
            Ok(_) => ComponentHealth::healthy(),
            Err(e) => ComponentHealth::error(e.to_string()),
        };

        let enabled = routing.registry.providers().iter().filter(|spec| spec.enabled).count();
        let configuration = if routing.registry.is_empty() {
            ComponentHealth::error("no providers configured")
        } else if enabled == 0 {
            ComponentHealth::error("every provider is disabled")
        } else {
            ComponentHealth::healthy_with(format!("{enabled} of {} providers enabled", routing.registry.len()))
        };

        let report = HealthReport::new(now, clients, ledger, usage_log, configuration);
        if !report.is_healthy() {
            tracing::warn!(report = ?report, "Health check degraded");
        }
        report
    }

    /// Configured providers in priority order.
    pub fn providers(&self) -> Vec<ProviderSpec> {
        self.routing.load().registry.providers().to_vec()
    }

    /// Deferred tasks, oldest first.
    pub fn pending_tasks(&self) -> Vec<RequestTask> {
        self.queue.pending()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn usage(&self) -> &Arc<U> {
        self.recorder.repository()
    }

    // -- Deferred queue sweep ----------------------------------------------

    /// Re-dispatch deferred tasks oldest first, stopping at the first task
    /// that still cannot be admitted anywhere.
    pub async fn run_sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        while let Some(task) = self.queue.pop_front() {
            let task_id = task.id;
            let span = info_span!("switchboard.replay", switchboard.task.id = %task_id);

            let outcome = self
                .route(&task, &self.shutdown, false)
                .instrument(span)
                .await;
            match outcome {
                RouteOutcome::Dispatched(result) => {
                    report.replayed += 1;
                    tracing::info!(
                        task_id = %task_id,
                        provider = %result.provider,
                        "Deferred task dispatched"
                    );
                    self.events.publish(OrchestratorEvent::Replayed {
                        task_id,
                        provider: result.provider,
                        tokens_consumed: result.tokens_consumed,
                    });
                }
                RouteOutcome::Exhausted | RouteOutcome::Failed(OrchestratorError::Cancelled) => {
                    self.queue.requeue_front(task);
                    break;
                }
                RouteOutcome::Failed(error) => {
                    report.rejected += 1;
                    self.reject(task_id, error);
                }
            }
        }

        report.remaining = self.queue.len();
        report
    }

    /// Spawn the background sweep.
    ///
    /// Wakes when a reservation is released, when the registry is reloaded,
    /// and every `sweep_interval` to pick up window rollovers. Stops on
    /// [`shutdown`](Self::shutdown).
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.sweep_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = this.shutdown.cancelled() => break,
                    _ = this.capacity_freed.notified() => {}
                    _ = interval.tick() => {}
                }
                if this.queue.is_empty() {
                    continue;
                }

                let report = this.run_sweep().await;
                if report.replayed > 0 || report.rejected > 0 {
                    tracing::info!(
                        replayed = report.replayed,
                        rejected = report.rejected,
                        remaining = report.remaining,
                        "Deferred queue sweep"
                    );
                }
            }
            tracing::debug!("Deferred queue sweeper stopped");
        })
    }

    /// Stop the sweeper and abort in-flight replays.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // -- Dispatch -----------------------------------------------------------

    /// `wake_sweeper` is false for replays so a sweep's own releases do not
    /// immediately trigger another sweep.
    async fn route(
        &self,
        task: &RequestTask,
        cancel: &CancellationToken,
        wake_sweeper: bool,
    ) -> RouteOutcome {
        let routing = self.routing.load_full();
        let candidates = match routing.registry.candidates(&task.task_type) {
            Ok(candidates) => candidates,
            Err(error) => {
                tracing::error!(task_type = %task.task_type, "No provider configured for task type");
                return RouteOutcome::Failed(error);
            }
        };

        // A task larger than every window limit would sit in the queue forever.
        let fits_somewhere = candidates.iter().any(|spec| {
            WindowKind::ALL
                .into_iter()
                .all(|kind| task.estimated_tokens <= spec.budget.limit_for(kind))
        });
        if !fits_somewhere {
            tracing::error!(
                task_type = %task.task_type,
                estimated_tokens = task.estimated_tokens,
                "Estimate exceeds every provider's quota limit"
            );
            return RouteOutcome::Failed(OrchestratorError::EstimateExceedsLimits {
                task_type: task.task_type.to_string(),
                estimated_tokens: task.estimated_tokens,
            });
        }

        let mut passed_over: Vec<String> = Vec::new();

        for (index, spec) in candidates.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return RouteOutcome::Failed(OrchestratorError::Cancelled);
            }

            let (Some(client), Some(model)) = (
                routing.clients.get(&spec.name),
                spec.model_for(&task.task_type),
            ) else {
                tracing::warn!(provider = %spec.name, "Provider has no client, skipping");
                continue;
            };

            if !self
                .rate_limiter
                .admit(&spec.name, spec.budget.requests_per_minute_limit)
            {
                tracing::debug!(provider = %spec.name, "Rate limited, trying next provider");
                passed_over.push(spec.name.clone());
                continue;
            }

            let Some(held) = self.reserve(spec, task.estimated_tokens).await else {
                passed_over.push(spec.name.clone());
                continue;
            };

            let decision = DispatchDecision {
                provider: spec.name.clone(),
                model: model.to_string(),
                reserved_tokens: task.estimated_tokens,
                attempt: index as u32 + 1,
            };
            tracing::debug!(
                provider = %decision.provider,
                model = %decision.model,
                attempt = decision.attempt,
                reserved_tokens = decision.reserved_tokens,
                "Dispatching task"
            );

            let request = InvokeRequest {
                model: decision.model.clone(),
                task_type: task.task_type.clone(),
                payload: task.payload.clone(),
                timeout: routing.executor.timeout(),
            };

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = routing.executor.execute(client, &request) => Some(result),
            };

            match outcome {
                None => {
                    held.release().await;
                    if wake_sweeper {
                        self.capacity_freed.notify_one();
                    }
                    self.recorder
                        .record(UsageEvent::failure(
                            task.id,
                            &decision.provider,
                            task.task_type.clone(),
                            1,
                            started.elapsed().as_millis() as u64,
                            OrchestratorError::Cancelled.code(),
                        ))
                        .await;
                    tracing::info!(
                        provider = %decision.provider,
                        "Task cancelled in flight, reservations released"
                    );
                    return RouteOutcome::Failed(OrchestratorError::Cancelled);
                }
                Some(Ok(execution)) => {
                    held.commit().await;
                    self.recorder
                        .record(UsageEvent::success(
                            task.id,
                            &decision.provider,
                            task.task_type.clone(),
                            execution.reply.tokens_consumed,
                            execution.attempts,
                            execution.latency_ms,
                        ))
                        .await;

                    if !passed_over.is_empty() {
                        tracing::warn!(
                            provider = %decision.provider,
                            fallback_from = ?passed_over,
                            "Task served by fallback provider"
                        );
                    }

                    return RouteOutcome::Dispatched(DispatchResult {
                        task_id: task.id,
                        provider: decision.provider,
                        model: decision.model,
                        tokens_consumed: execution.reply.tokens_consumed,
                        content: execution.reply.content,
                        attempts: execution.attempts,
                        latency_ms: execution.latency_ms,
                        fallback_from: passed_over,
                    });
                }
                Some(Err(failure)) => {
                    held.release().await;
                    if wake_sweeper {
                        self.capacity_freed.notify_one();
                    }
                    self.recorder
                        .record(UsageEvent::failure(
                            task.id,
                            &decision.provider,
                            task.task_type.clone(),
                            failure.attempts,
                            failure.latency_ms,
                            failure.error.kind.to_string(),
                        ))
                        .await;

                    match failure.class {
                        FailureClass::Transient => {
                            tracing::warn!(
                                provider = %decision.provider,
                                attempts = failure.attempts,
                                error = %failure.error,
                                "Provider failed, trying next in chain"
                            );
                            passed_over.push(decision.provider);
                        }
                        FailureClass::Permanent => {
                            tracing::error!(
                                provider = %decision.provider,
                                error = %failure.error,
                                "Permanent provider error, not falling back"
                            );
                            return RouteOutcome::Failed(OrchestratorError::PermanentProviderError {
                                provider: decision.provider,
                                error: failure.error,
                            });
                        }
                    }
                }
            }
        }

        RouteOutcome::Exhausted
    }

    /// Reserve `tokens` in every window of `spec`, or nothing at all.
    async fn reserve(&self, spec: &ProviderSpec, tokens: u64) -> Option<HeldReservations<L>> {
        let mut held = HeldReservations::new(Arc::clone(&self.ledger));

        for kind in WindowKind::ALL {
            let limit = spec.budget.limit_for(kind);
            match self.ledger.reserve(&spec.name, kind, limit, tokens).await {
                Ok(reservation) => held.push(reservation),
                Err(LedgerError::QuotaExhausted { remaining, .. }) => {
                    tracing::debug!(
                        provider = %spec.name,
                        window = %kind,
                        requested = tokens,
                        remaining,
                        "Quota exhausted, trying next provider"
                    );
                    held.release().await;
                    return None;
                }
                Err(error) => {
                    tracing::error!(
                        provider = %spec.name,
                        window = %kind,
                        error = %error,
                        "Quota ledger unavailable, skipping provider"
                    );
                    held.release().await;
                    return None;
                }
            }
        }
        Some(held)
    }

    async fn defer(&self, task: RequestTask) -> SubmitOutcome {
        let task_id = task.id;
        let task_type = task.task_type.clone();

        match self.queue.enqueue(task) {
            Ok(queue_position) => {
                self.recorder
                    .record(UsageEvent::queued(task_id, task_type))
                    .await;
                tracing::warn!(
                    task_id = %task_id,
                    queue_position,
                    "All providers exhausted, task deferred"
                );
                self.events.publish(OrchestratorEvent::Deferred {
                    task_id,
                    queue_position,
                });
                SubmitOutcome::Deferred {
                    task_id,
                    queue_position,
                }
            }
            Err(error) => {
                tracing::error!(task_id = %task_id, error = %error, "Deferred queue full");
                self.reject(task_id, error)
            }
        }
    }

    fn reject(&self, task_id: Uuid, error: OrchestratorError) -> SubmitOutcome {
        self.events.publish(OrchestratorEvent::Rejected {
            task_id,
            code: error.code().to_string(),
            reason: error.to_string(),
        });
        SubmitOutcome::Rejected(error)
    }
}
