//! Generation engine: schedules workers, drains results, checkpoints.
//!
//! One orchestrating call drives the whole run: indices are mapped to
//! topics, prompts go out through the rate-limited provider with retries,
//! parsed samples stream into the writer, and counters are checkpointed at
//! a configurable cadence. A single cancel token reaches every blocking
//! operation, and the final sync + checkpoint happen even on failure.

use rand::Rng;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::generator::{CancelToken, RateLimiter, TopicSampler, WorkerPool};
use crate::models::{
    GenerationConfig, KothasetError, Progress, ProgressCallback, ProviderError, ProviderErrorKind,
    Result, RunResult, Sample, SampleMetadata,
};
use crate::output::Writer;
use crate::provider::{GenerationRequest, Message, Provider};
use crate::schema::{PromptOptions, Schema};

/// Fallback base delay when `retry_delay` is unset.
const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(100);

/// Backoff ceiling before jitter.
const MAX_RETRY_DELAY_SECS: f64 = 30.0;

/// Orchestrates a dataset generation run.
pub struct Generator {
    config: GenerationConfig,
    provider: Arc<dyn Provider>,
    schema: Arc<dyn Schema>,
    sampler: Option<Arc<TopicSampler>>,
    writer: Option<Arc<dyn Writer>>,
    checkpoints: CheckpointStore,

    completed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    tokens_used: Arc<AtomicU64>,

    on_progress: Option<Arc<ProgressCallback>>,
}

/// Everything a worker task needs, shared behind one Arc.
struct WorkerContext {
    config: GenerationConfig,
    provider: Arc<dyn Provider>,
    schema: Arc<dyn Schema>,
    sampler: Arc<TopicSampler>,
    limiter: RateLimiter,
    cancel: CancelToken,
}

impl Generator {
    /// Create a generator. A sampler and writer must be attached before
    /// [`run`](Self::run).
    pub fn new(
        config: GenerationConfig,
        provider: Arc<dyn Provider>,
        schema: Arc<dyn Schema>,
    ) -> Self {
        let checkpoints = CheckpointStore::new(config.cache_dir.clone());
        Self {
            config,
            provider,
            schema,
            sampler: None,
            writer: None,
            checkpoints,
            completed: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            tokens_used: Arc::new(AtomicU64::new(0)),
            on_progress: None,
        }
    }

    /// Attach the topic sampler.
    pub fn set_sampler(&mut self, sampler: TopicSampler) {
        self.sampler = Some(Arc::new(sampler));
    }

    /// Attach the output writer.
    pub fn set_writer(&mut self, writer: Arc<dyn Writer>) {
        self.writer = Some(writer);
    }

    /// Attach a progress callback invoked as results land.
    pub fn set_progress_callback(&mut self, callback: impl Fn(Progress) + Send + Sync + 'static) {
        self.on_progress = Some(Arc::new(callback));
    }

    /// Execute the run.
    ///
    /// Pre-flight failures (resume mismatches, missing collaborators, open
    /// errors) return `Err` before any provider call. A fatal write failure
    /// mid-run cancels outstanding work, drains, checkpoints, and is
    /// surfaced in [`RunResult::write_error`] next to the partial counters.
    pub async fn run(&self, cancel: &CancelToken) -> Result<RunResult> {
        let start = Instant::now();

        let resuming = self.config.resume_from.is_some();
        if let Some(resume_path) = &self.config.resume_from {
            let checkpoint = CheckpointStore::load(resume_path)?;
            self.validate_resume(&checkpoint)?;
            self.completed.store(checkpoint.completed, Ordering::SeqCst);
            self.failed.store(checkpoint.failed, Ordering::SeqCst);
            self.tokens_used
                .store(checkpoint.tokens_used, Ordering::SeqCst);
            info!(
                completed = checkpoint.completed,
                failed = checkpoint.failed,
                "resuming from checkpoint"
            );
        }

        let sampler = self.sampler.as_ref().cloned().ok_or_else(|| {
            KothasetError::Config(crate::models::ConfigError::Invalid(
                "sampler not set: topic input is mandatory".to_string(),
            ))
        })?;
        let writer = self.writer.as_ref().cloned().ok_or_else(|| {
            KothasetError::Config(crate::models::ConfigError::Invalid(
                "output writer not set".to_string(),
            ))
        })?;

        // A resumed run must never truncate what a previous run wrote.
        if resuming {
            writer.open_append(&self.config.output_path)?;
        } else {
            writer.open(&self.config.output_path)?;
        }

        let base = self.completed.load(Ordering::SeqCst);
        let remaining = self.config.num_samples.saturating_sub(base);

        info!(
            total = self.config.num_samples,
            remaining,
            workers = self.config.workers,
            schema = %self.config.schema,
            provider = %self.provider.name(),
            "starting generation"
        );

        let pool = WorkerPool::new(self.config.workers);
        let channel_capacity = (2 * self.config.workers).max(1);
        let (tx, rx) = mpsc::channel::<Result<(Sample, u32)>>(channel_capacity);

        let drainer = tokio::spawn(drain_results(
            rx,
            DrainContext {
                writer: Arc::clone(&writer),
                checkpoints: self.checkpoints.clone(),
                config: self.config.clone(),
                completed: Arc::clone(&self.completed),
                failed: Arc::clone(&self.failed),
                tokens_used: Arc::clone(&self.tokens_used),
                cancel: cancel.clone(),
                on_progress: self.on_progress.clone(),
                start,
            },
        ));

        let ctx = Arc::new(WorkerContext {
            config: self.config.clone(),
            provider: Arc::clone(&self.provider),
            schema: Arc::clone(&self.schema),
            sampler,
            limiter: RateLimiter::new(self.config.rate_limit_rpm),
            cancel: cancel.clone(),
        });

        let mut handles = Vec::with_capacity(remaining.min(channel_capacity));
        for i in 0..remaining {
            if cancel.is_cancelled() {
                break;
            }
            let Ok(permit) = pool.acquire(cancel).await else {
                break;
            };

            let index = base + i;
            let ctx = Arc::clone(&ctx);
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let outcome = generate_sample(&ctx, index).await;
                // The drainer keeps receiving until every sender is gone, so
                // a failed send can only mean the run is being torn down.
                let _ = tx.send(outcome).await;
                drop(permit);
            }));
        }
        drop(tx);

        for handle in handles {
            if let Err(join_err) = handle.await {
                warn!(error = %join_err, "worker task aborted");
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
        ctx.limiter.close();

        let first_write_error = drainer.await.unwrap_or_else(|join_err| {
            warn!(error = %join_err, "result drainer aborted");
            None
        });

        // Final durability point, on success and failure alike.
        let mut write_error = first_write_error;
        if let Err(e) = writer.sync() {
            if write_error.is_none() {
                write_error = Some(e);
            }
        }
        let final_checkpoint = self.save_checkpoint();
        if let Err(e) = writer.close() {
            if write_error.is_none() {
                write_error = Some(e);
            }
        }
        final_checkpoint?;

        let result = RunResult {
            total_samples: self.config.num_samples,
            success_count: self.completed.load(Ordering::SeqCst),
            failed_count: self.failed.load(Ordering::SeqCst),
            total_tokens: self.tokens_used.load(Ordering::SeqCst),
            duration: start.elapsed(),
            output_path: self.config.output_path.clone(),
            write_error,
        };

        info!(
            success = result.success_count,
            failed = result.failed_count,
            tokens = result.total_tokens,
            duration_secs = result.duration.as_secs_f64(),
            "generation finished"
        );

        Ok(result)
    }

    /// Enforce resume identity against a loaded checkpoint.
    fn validate_resume(&self, checkpoint: &Checkpoint) -> Result<()> {
        if checkpoint.completed > self.config.num_samples {
            return Err(KothasetError::ResumeCountMismatch {
                completed: checkpoint.completed,
                requested: self.config.num_samples,
            });
        }
        if checkpoint.config.schema != self.config.schema {
            return Err(KothasetError::ResumeSchemaMismatch {
                checkpoint: checkpoint.config.schema.clone(),
                config: self.config.schema.clone(),
            });
        }
        if checkpoint.config.output_path != self.config.output_path {
            return Err(KothasetError::ResumeOutputMismatch {
                checkpoint: checkpoint.config.output_path.display().to_string(),
                config: self.config.output_path.display().to_string(),
            });
        }
        if let Some(checkpoint_input) = &checkpoint.config.input {
            if !self.config.input.is_empty() && checkpoint_input != &self.config.input {
                return Err(KothasetError::ResumeInputMismatch {
                    checkpoint: checkpoint_input.clone(),
                    config: self.config.input.clone(),
                });
            }
        }
        if checkpoint.config.provider != self.config.provider
            || checkpoint.config.model != self.config.model
        {
            warn!(
                checkpoint_provider = %checkpoint.config.provider,
                checkpoint_model = %checkpoint.config.model,
                provider = %self.config.provider,
                model = %self.config.model,
                "resuming with a different provider or model"
            );
        }
        Ok(())
    }

    fn save_checkpoint(&self) -> Result<()> {
        let checkpoint = Checkpoint::new(
            &self.config,
            self.completed.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
            self.tokens_used.load(Ordering::SeqCst),
        );
        let path = self.checkpoints.path_for(&self.config.output_path);
        self.checkpoints.save(&checkpoint, &path)
    }
}

/// Generate one sample: topic → prompt → provider (with retries) → parse →
/// validate.
async fn generate_sample(ctx: &WorkerContext, index: usize) -> Result<(Sample, u32)> {
    let topic = ctx.sampler.sample(index).to_string();

    let opts = PromptOptions {
        topic: Some(topic.clone()),
        variables: ctx.config.variables.clone(),
        user_context: ctx.config.user_context.clone(),
        user_instruction: ctx.config.user_instruction.clone(),
        ..Default::default()
    };
    let prompt = ctx.schema.generate_prompt(&opts)?;

    let seed = if ctx.config.random_seed {
        Some(random_seed())
    } else {
        ctx.config.seed
    };

    let request = GenerationRequest {
        messages: vec![Message::user(prompt)],
        system_prompt: ctx.config.system_prompt.clone(),
        temperature: ctx.config.temperature,
        max_tokens: ctx.config.max_tokens,
        top_p: ctx.config.top_p,
        stop: None,
        seed,
    };

    let mut last_error: Option<ProviderError> = None;
    let mut response = None;
    for attempt in 0..=ctx.config.max_retries {
        if attempt > 0 {
            let delay = retry_delay(ctx.config.retry_delay(), attempt, last_error.as_ref());
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(KothasetError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if ctx.limiter.wait(&ctx.cancel).await.is_err() {
            return Err(KothasetError::Cancelled);
        }

        match ctx.provider.generate(&request).await {
            Ok(resp) => {
                response = Some(resp);
                break;
            }
            Err(err) => {
                if !err.retryable {
                    return Err(err.into());
                }
                debug!(index, attempt, error = %err, "retrying after provider error");
                last_error = Some(err);
            }
        }
    }

    let Some(resp) = response else {
        let err = last_error.unwrap_or_else(|| {
            ProviderError::new(ProviderErrorKind::Unknown, "retries exhausted")
        });
        return Err(err.into());
    };

    let mut sample = ctx.schema.parse_response(&resp.content)?;
    sample.id = Uuid::new_v4().to_string();
    sample.metadata = SampleMetadata {
        generated_at: Some(chrono::Utc::now()),
        provider: ctx.provider.name().to_string(),
        model: resp.model.clone(),
        temperature: ctx.config.temperature,
        seed,
        tokens_used: resp.usage.total_tokens,
        latency_ms: resp.latency.as_millis() as u64,
        topic: Some(topic),
    };

    ctx.schema.validate_sample(&sample)?;

    Ok((sample, resp.usage.total_tokens))
}

struct DrainContext {
    writer: Arc<dyn Writer>,
    checkpoints: CheckpointStore,
    config: GenerationConfig,
    completed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    tokens_used: Arc<AtomicU64>,
    cancel: CancelToken,
    on_progress: Option<Arc<ProgressCallback>>,
    start: Instant,
}

impl DrainContext {
    fn report_progress(&self) {
        if let Some(callback) = &self.on_progress {
            callback(Progress::compute(
                self.config.num_samples,
                self.completed.load(Ordering::SeqCst),
                self.failed.load(Ordering::SeqCst),
                self.tokens_used.load(Ordering::SeqCst),
                self.start.elapsed(),
            ));
        }
    }

    fn save_checkpoint(&self) -> Result<()> {
        let checkpoint = Checkpoint::new(
            &self.config,
            self.completed.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
            self.tokens_used.load(Ordering::SeqCst),
        );
        let path = self.checkpoints.path_for(&self.config.output_path);
        self.checkpoints.save(&checkpoint, &path)
    }
}

/// Single consumer of worker results.
///
/// Keeps draining after a write failure so workers never block on a full
/// channel; only the first write error is kept and it triggers run-wide
/// cancellation.
async fn drain_results(
    mut rx: mpsc::Receiver<Result<(Sample, u32)>>,
    ctx: DrainContext,
) -> Option<KothasetError> {
    let mut first_write_error = None;
    let mut since_checkpoint = 0usize;

    while let Some(outcome) = rx.recv().await {
        match outcome {
            Err(KothasetError::Cancelled) => {
                ctx.failed.fetch_add(1, Ordering::SeqCst);
                debug!("sample cancelled");
            }
            Err(err) => {
                ctx.failed.fetch_add(1, Ordering::SeqCst);
                warn!(error = %err, "sample generation failed");
            }
            Ok((sample, tokens)) => match ctx.writer.write(&sample) {
                Err(err) => {
                    ctx.failed.fetch_add(1, Ordering::SeqCst);
                    if first_write_error.is_none() {
                        error!(error = %err, "write failed, cancelling run");
                        first_write_error = Some(err);
                        ctx.cancel.cancel();
                    }
                }
                Ok(()) => {
                    ctx.completed.fetch_add(1, Ordering::SeqCst);
                    ctx.tokens_used.fetch_add(u64::from(tokens), Ordering::SeqCst);

                    since_checkpoint += 1;
                    if ctx.config.checkpoint_every > 0
                        && since_checkpoint >= ctx.config.checkpoint_every
                    {
                        since_checkpoint = 0;
                        let durable = ctx.writer.sync().and_then(|_| ctx.save_checkpoint());
                        if let Err(err) = durable {
                            warn!(error = %err, "periodic checkpoint failed");
                        }
                    }
                }
            },
        }

        ctx.report_progress();
    }

    first_write_error
}

/// Compute the delay before retry `attempt` (1-based).
///
/// A provider-supplied retry-after wins outright. Otherwise exponential
/// backoff from the configured base (100ms fallback), capped at 30s, with
/// uniform jitter in [0.8, 1.2].
fn retry_delay(base: Duration, attempt: u32, last_error: Option<&ProviderError>) -> Duration {
    if let Some(secs) = last_error.and_then(ProviderError::retry_after) {
        if secs > 0 {
            return Duration::from_secs(secs);
        }
    }

    let base = if base.is_zero() { DEFAULT_RETRY_BASE } else { base };
    let exponent = attempt.saturating_sub(1).min(30);
    let scaled = base.as_secs_f64() * 2f64.powi(exponent as i32);
    let capped = scaled.min(MAX_RETRY_DELAY_SECS);

    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    Duration::from_secs_f64(capped * jitter)
}

/// Draw a 64-bit seed from OS randomness, falling back to wall-clock nanos.
fn random_seed() -> i64 {
    use rand::RngCore;

    let mut bytes = [0u8; 8];
    if rand::rngs::OsRng.try_fill_bytes(&mut bytes).is_ok() {
        i64::from_be_bytes(bytes)
    } else {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_honors_retry_after() {
        let err = ProviderError::rate_limited("slow down", Some(9));
        let delay = retry_delay(Duration::from_millis(100), 1, Some(&err));
        assert_eq!(delay, Duration::from_secs(9));
    }

    #[test]
    fn retry_delay_grows_monotonically_up_to_cap() {
        // With jitter in [0.8, 1.2], successive attempts never shrink by
        // more than the jitter band; compare the jitter-free envelope.
        let base = Duration::from_millis(100);
        let mut previous = 0.0f64;
        for attempt in 1..=12 {
            let envelope = (base.as_secs_f64() * 2f64.powi(attempt - 1)).min(30.0);
            assert!(envelope >= previous);
            previous = envelope;

            let observed = retry_delay(base, attempt as u32, None).as_secs_f64();
            assert!(observed >= envelope * 0.8 - 1e-9);
            assert!(observed <= envelope * 1.2 + 1e-9);
        }
    }

    #[test]
    fn retry_delay_defaults_base_to_100ms() {
        let delay = retry_delay(Duration::ZERO, 1, None);
        assert!(delay >= Duration::from_millis(80));
        assert!(delay <= Duration::from_millis(120));
    }

    #[test]
    fn random_seeds_vary() {
        let a = random_seed();
        let b = random_seed();
        // Two draws from a 64-bit space colliding means the generator is
        // broken, not unlucky.
        assert_ne!(a, b);
    }
}
