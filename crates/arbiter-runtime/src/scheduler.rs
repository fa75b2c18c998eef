//! Batch scheduler.
//!
//! Runs every plan through `primary judge -> secondary judge -> consensus`
//! on a bounded pool of spawned workers. A batch always drains: every
//! submitted plan ends up in the result, either scored or as an NA.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use arbiter_core::{BatchResult, ConsensusEngine, NaResult, Plan, PlanOutcome};

use crate::config::RuntimeConfig;
use crate::judges::Judge;
use crate::providers::{LlmProvider, ProviderRegistry};
use crate::resilience::{HealthRegistry, ResilienceManager, UsageTracker};
use crate::RuntimeError;

/// Completion counter shared with callers while a batch runs.
///
/// Counts are cumulative over the scheduler's lifetime and never decrease.
#[derive(Debug, Clone, Default)]
pub struct BatchProgress {
    completed: Arc<AtomicUsize>,
    submitted: Arc<AtomicUsize>,
}

impl BatchProgress {
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Plans submitted so far.
    pub fn total(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count() >= self.total()
    }

    fn submit(&self, n: usize) {
        self.submitted.fetch_add(n, Ordering::SeqCst);
    }

    fn advance(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Stops a running batch from launching more workers.
///
/// In-flight workers finish; unlaunched plans become cancelled NAs.
/// Cancellation is sticky for the scheduler that issued the handle.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            tracing::info!("Batch cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// State each worker needs, shared by `Arc`.
struct WorkerContext {
    manager: Arc<ResilienceManager>,
    engine: ConsensusEngine,
    primary: Judge,
    secondary: Judge,
}

impl WorkerContext {
    async fn run(&self, plan: Plan) -> PlanOutcome {
        let primary = self.primary.evaluate(&self.manager, &plan).await;
        let secondary = self.secondary.evaluate(&self.manager, &plan).await;

        let (primary, secondary) = match (primary, secondary) {
            (Err(a), Err(b)) => {
                tracing::warn!(plan_id = %plan.plan_id, "Both judges failed, plan is NA");
                return NaResult::providers_unavailable(
                    plan.plan_id,
                    format!("Both judges failed: {}; {}", a.summary(), b.summary()),
                )
                .into();
            }
            (primary, secondary) => {
                for failure in [primary.as_ref().err(), secondary.as_ref().err()]
                    .into_iter()
                    .flatten()
                {
                    tracing::debug!(
                        plan_id = %plan.plan_id,
                        error = %failure,
                        "Judge failed, continuing with one score set"
                    );
                }
                (primary.ok(), secondary.ok())
            }
        };

        match self
            .engine
            .reconcile(&plan.plan_id, &plan.rubric, primary, secondary)
        {
            Ok(result) => result.into(),
            Err(err) => {
                tracing::warn!(plan_id = %plan.plan_id, error = %err, "Consensus failed");
                NaResult::worker_failed(plan.plan_id, err).into()
            }
        }
    }
}

/// Scores batches of plans with two judges.
pub struct BatchScheduler {
    context: Arc<WorkerContext>,
    worker_pool_size: usize,
    minimum_provider_requirement: usize,
    progress: BatchProgress,
    cancellation: CancellationHandle,
}

impl BatchScheduler {
    pub fn builder() -> BatchSchedulerBuilder {
        BatchSchedulerBuilder::new()
    }

    /// Build providers, judges and engine from configuration.
    pub fn from_config(
        config: RuntimeConfig,
        registry: &ProviderRegistry,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let mut builder = Self::builder();
        for spec in [&config.judges.primary, &config.judges.secondary] {
            let provider = registry.create(&spec.provider_type, &spec.settings)?;
            builder = builder.provider(spec.id.clone(), provider);
        }

        builder
            .primary(Judge::primary(config.judges.primary.id.clone()))
            .secondary(Judge::secondary(config.judges.secondary.id.clone()))
            .engine(ConsensusEngine::with_thresholds(config.consensus))
            .config(config)
            .build()
    }

    pub fn progress(&self) -> BatchProgress {
        self.progress.clone()
    }

    pub fn cancellation(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    pub fn manager(&self) -> &Arc<ResilienceManager> {
        &self.context.manager
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        self.context.manager.health()
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        self.context.manager.usage()
    }

    /// Score every plan. Never fails; failures become NA outcomes.
    pub async fn submit_batch(&self, plans: Vec<Plan>) -> BatchResult {
        let total = plans.len();
        self.progress.submit(total);

        if total == 0 {
            return BatchResult::from_outcomes(0, Vec::new());
        }

        if let Some(reason) = self.probe_gate().await {
            tracing::warn!(
                plans = total,
                reason = %reason,
                "Skipping batch: providers unavailable"
            );
            let outcomes: Vec<PlanOutcome> = plans
                .into_iter()
                .map(|plan| {
                    self.progress.advance();
                    PlanOutcome::from(NaResult::providers_unavailable(plan.plan_id, reason.clone()))
                })
                .collect();
            return self.finish(total, outcomes);
        }

        let semaphore = Arc::new(Semaphore::new(self.worker_pool_size));
        let collector: Arc<Mutex<Vec<(usize, PlanOutcome)>>> =
            Arc::new(Mutex::new(Vec::with_capacity(total)));
        let mut workers = FuturesUnordered::new();

        for (index, plan) in plans.into_iter().enumerate() {
            let permit = if self.cancellation.is_cancelled() {
                None
            } else {
                semaphore.clone().acquire_owned().await.ok()
            };

            // Re-check: cancellation may arrive while waiting for a permit
            let permit = match permit {
                Some(permit) if !self.cancellation.is_cancelled() => permit,
                _ => {
                    collector
                        .lock()
                        .push((index, NaResult::cancelled(plan.plan_id).into()));
                    self.progress.advance();
                    continue;
                }
            };

            let context = Arc::clone(&self.context);
            let collector = Arc::clone(&collector);
            let progress = self.progress.clone();
            let plan_id = plan.plan_id.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let outcome = context.run(plan).await;
                collector.lock().push((index, outcome));
                progress.advance();
            });
            workers.push(async move { (index, plan_id, handle.await) });
        }

        while let Some((index, plan_id, joined)) = workers.next().await {
            if let Err(err) = joined {
                tracing::warn!(plan_id = %plan_id, error = %err, "Worker crashed");
                collector
                    .lock()
                    .push((index, NaResult::worker_failed(plan_id, err).into()));
                self.progress.advance();
            }
        }

        let mut collected = std::mem::take(&mut *collector.lock());
        collected.sort_by_key(|(index, _)| *index);
        let outcomes = collected.into_iter().map(|(_, outcome)| outcome).collect();
        self.finish(total, outcomes)
    }

    /// `Some(reason)` when too few judges' providers pass the probe.
    async fn probe_gate(&self) -> Option<String> {
        if self.minimum_provider_requirement == 0 {
            return None;
        }

        let availability = self.context.manager.check_availability().await;
        let judges = [&self.context.primary, &self.context.secondary];
        let available = judges
            .iter()
            .filter(|judge| availability.get(&judge.provider_id).copied().unwrap_or(false))
            .count();

        (available < self.minimum_provider_requirement).then(|| {
            format!(
                "{} of 2 judge providers available, {} required",
                available, self.minimum_provider_requirement
            )
        })
    }

    fn finish(&self, total: usize, outcomes: Vec<PlanOutcome>) -> BatchResult {
        let result = BatchResult::from_outcomes(total, outcomes);
        tracing::info!(
            total = result.total_plans,
            completed = result.completed,
            unavailable = result.unavailable,
            failed = result.failed,
            flagged = result.flagged_for_review().len(),
            "Batch finished"
        );
        result
    }
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("primary", &self.context.primary)
            .field("secondary", &self.context.secondary)
            .field("worker_pool_size", &self.worker_pool_size)
            .field("minimum_provider_requirement", &self.minimum_provider_requirement)
            .finish()
    }
}

/// Builder for [`BatchScheduler`].
pub struct BatchSchedulerBuilder {
    providers: BTreeMap<String, Arc<dyn LlmProvider>>,
    config: RuntimeConfig,
    primary: Option<Judge>,
    secondary: Option<Judge>,
    engine: Option<ConsensusEngine>,
    health: Option<Arc<HealthRegistry>>,
}

impl BatchSchedulerBuilder {
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
            config: RuntimeConfig::default(),
            primary: None,
            secondary: None,
            engine: None,
            health: None,
        }
    }

    /// Register a provider under an id.
    pub fn provider(mut self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(id.into(), provider);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn primary(mut self, judge: Judge) -> Self {
        self.primary = Some(judge);
        self
    }

    pub fn secondary(mut self, judge: Judge) -> Self {
        self.secondary = Some(judge);
        self
    }

    /// Defaults to an engine using the configured thresholds.
    pub fn engine(mut self, engine: ConsensusEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Share health state with another scheduler.
    pub fn health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<BatchScheduler, RuntimeError> {
        self.config.validate()?;

        let primary = self
            .primary
            .ok_or_else(|| RuntimeError::NotConfigured("no primary judge set".to_string()))?;
        let secondary = self
            .secondary
            .ok_or_else(|| RuntimeError::NotConfigured("no secondary judge set".to_string()))?;

        let mut manager = ResilienceManager::new(self.providers, &self.config);
        if let Some(health) = self.health {
            manager = manager.with_health(health);
        }

        let engine = self
            .engine
            .unwrap_or_else(|| ConsensusEngine::with_thresholds(self.config.consensus));

        Ok(BatchScheduler {
            context: Arc::new(WorkerContext {
                manager: Arc::new(manager),
                engine,
                primary,
                secondary,
            }),
            worker_pool_size: self.config.worker_pool_size,
            minimum_provider_requirement: self.config.minimum_provider_requirement,
            progress: BatchProgress::default(),
            cancellation: CancellationHandle::default(),
        })
    }
}

impl Default for BatchSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
