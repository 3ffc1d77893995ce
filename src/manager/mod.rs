//! Context Manager — the public facade. Owns the Active Context, accounts
//! tokens (including in-flight estimates), runs the threshold policy that
//! triggers compression, and emits lifecycle events.

pub mod events;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::compression::{self, engine, ProgressEvent};
use crate::context::{ActiveContext, Checkpoint, Message, Snapshot};
use crate::error::Result;
use crate::provider::Provider;
use crate::summarization::{Goal, Mode};
use crate::validation::{self, MessageTokens};

pub use events::{Event, EventBus, Handler};

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub warn_low: f64,
    pub compression_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn_low: 0.70,
            compression_threshold: 0.85,
        }
    }
}

/// `usage = (tokens + inflight) / effectiveLimit`. Tracks whether each
/// threshold has already fired, so transitions are edge-triggered.
struct ThresholdState {
    warn_low_fired: bool,
    compression_fired: bool,
}

pub struct ContextManager {
    context: Mutex<ActiveContext>,
    provider: Arc<dyn Provider>,
    model: String,
    effective_limit: usize,
    thresholds: Thresholds,
    threshold_state: Mutex<ThresholdState>,
    inflight_tokens: AtomicUsize,
    summarization_in_progress: AtomicBool,
    events: EventBus,
    mode: Mutex<Mode>,
    goal: Mutex<Option<Goal>>,
}

impl ContextManager {
    pub fn new(
        system_prompt: Message,
        hard_limit: usize,
        effective_limit: usize,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            context: Mutex::new(ActiveContext::new(system_prompt, hard_limit)),
            provider,
            model: model.into(),
            effective_limit,
            thresholds,
            threshold_state: Mutex::new(ThresholdState {
                warn_low_fired: false,
                compression_fired: false,
            }),
            inflight_tokens: AtomicUsize::new(0),
            summarization_in_progress: AtomicBool::new(false),
            events: EventBus::new(),
            mode: Mutex::new(Mode::Assistant),
            goal: Mutex::new(None),
        }
    }

    pub fn on(&self, name: &str, handler: Handler) -> usize {
        self.events.on(name, handler)
    }

    pub fn off(&self, id: usize) {
        self.events.off(id)
    }

    pub fn is_summarization_in_progress(&self) -> bool {
        self.summarization_in_progress.load(Ordering::SeqCst)
    }

    pub fn report_inflight_tokens(&self, n: usize) {
        self.inflight_tokens.fetch_add(n, Ordering::SeqCst);
    }

    pub fn clear_inflight_tokens(&self) {
        self.inflight_tokens.store(0, Ordering::SeqCst);
    }

    pub async fn get_context(&self) -> ActiveContext {
        self.context.lock().await.clone()
    }

    pub async fn get_system_prompt(&self) -> Message {
        self.context.lock().await.system_prompt().clone()
    }

    pub async fn set_mode(&self, mode: Mode) {
        *self.mode.lock().await = mode;
    }

    pub async fn set_goal(&self, goal: Option<Goal>) {
        *self.goal.lock().await = goal;
    }

    pub async fn clear(&self) {
        self.context.lock().await.clear();
        self.clear_inflight_tokens();
        let mut state = self.threshold_state.lock().await;
        state.warn_low_fired = false;
        state.compression_fired = false;
    }

    pub async fn create_snapshot(&self) -> Snapshot {
        self.context.lock().await.create_snapshot()
    }

    pub async fn restore(&self, snapshot: Snapshot) {
        self.context.lock().await.restore(snapshot);
    }

    /// `usage = (tokens + inflight) / effectiveLimit`.
    pub async fn get_usage(&self) -> f64 {
        let tokens = self.context.lock().await.token_count();
        let inflight = self.inflight_tokens.load(Ordering::SeqCst);
        (tokens + inflight) as f64 / self.effective_limit as f64
    }

    /// Append `message`, then run the threshold policy. May trigger a
    /// compression run (only one at a time; see
    /// [`ContextManager::is_summarization_in_progress`]).
    pub async fn add_message(&self, message: Message) -> Result<()> {
        {
            let mut context = self.context.lock().await;
            context.add_message(message)?;
        }
        self.check_thresholds().await;
        Ok(())
    }

    async fn check_thresholds(&self) {
        let usage = self.get_usage().await;
        let mut state = self.threshold_state.lock().await;

        let crossed_warn_low = usage >= self.thresholds.warn_low;
        if crossed_warn_low && !state.warn_low_fired {
            self.events.emit(Event::ContextWarningLow { usage });
        }
        state.warn_low_fired = crossed_warn_low;

        let crossed_compression = usage >= self.thresholds.compression_threshold;
        if crossed_compression && !state.compression_fired {
            self.events.emit(Event::MemoryWarning { usage });
            drop(state);
            self.try_compress().await;
        } else {
            state.compression_fired = crossed_compression;
        }
    }

    /// Invoke the Compression Engine with the recommended strategy. A
    /// no-op (with `auto-summary-failed`) if a compression is already
    /// in-flight.
    pub async fn try_compress(&self) -> Option<Checkpoint> {
        if self
            .summarization_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.events.emit(Event::AutoSummaryFailed {
                error: "a compression is already in progress".to_string(),
            });
            return None;
        }

        self.events.emit(Event::Summarizing);

        let current_tokens = self.context.lock().await.token_count();
        let strategy = engine::recommend_strategy(current_tokens, self.effective_limit);
        let params = strategy.params();
        let mode = *self.mode.lock().await;
        let goal = self.goal.lock().await.clone();

        let callback = |_: ProgressEvent| {};
        let outcome = {
            let mut context = self.context.lock().await;
            compression::run(
                &mut context,
                self.provider.clone(),
                params,
                mode,
                goal.as_ref(),
                &self.model,
                self.effective_limit,
                &callback,
            )
            .await
        };

        self.summarization_in_progress.store(false, Ordering::SeqCst);

        let event = events::Event::from_pipeline_outcome(&outcome);
        let checkpoint = outcome.checkpoint.clone();
        if let Some(checkpoint) = checkpoint.clone() {
            self.events.emit(Event::Compressed { checkpoint });
        }
        self.events.emit(event);

        let mut state = self.threshold_state.lock().await;
        state.compression_fired = self.get_usage().await >= self.thresholds.compression_threshold;

        checkpoint
    }

    pub async fn validate(&self) -> validation::ValidationResult {
        let context = self.context.lock().await;
        let tokens: Vec<MessageTokens> = context.message_tokens();
        validation::validate(&tokens, self.effective_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use crate::provider::{MockProvider, ScriptedTurn};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc as StdArc;

    fn manager_with_limit(effective_limit: usize, thresholds: Thresholds) -> ContextManager {
        let provider: Arc<dyn Provider> = Arc::new(MockProvider::new(
            "mock",
            vec![ScriptedTurn::Text("a summary of everything so far".to_string())],
        ));
        ContextManager::new(
            Message::new(Role::System, "system prompt", 10),
            1_000_000,
            effective_limit,
            provider,
            "mock-model",
            thresholds,
        )
    }

    #[tokio::test]
    async fn add_message_updates_usage() {
        let manager = manager_with_limit(1000, Thresholds::default());
        manager
            .add_message(Message::new(Role::User, "hello", 100))
            .await
            .unwrap();
        let usage = manager.get_usage().await;
        assert!((usage - 0.11).abs() < 0.01);
    }

    #[tokio::test]
    async fn warn_low_fires_once_when_crossed() {
        let manager = manager_with_limit(1000, Thresholds::default());
        let count = StdArc::new(AtomicUsize::new(0));
        let c = count.clone();
        manager.on(
            "context-warning-low",
            Box::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        manager
            .add_message(Message::new(Role::User, "x", 750))
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        manager
            .add_message(Message::new(Role::Assistant, "y", 10))
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1, "edge-triggered, should not refire");
    }

    #[tokio::test]
    async fn crossing_compression_threshold_triggers_compression() {
        let manager = manager_with_limit(1000, Thresholds::default());
        for i in 0..10 {
            manager
                .add_message(Message::new(Role::Assistant, format!("m{i}"), 90))
                .await
                .unwrap();
        }
        // 900/1000 = 0.9 >= 0.85 compression_threshold, should have compressed.
        assert!(manager.get_context().await.checkpoints().len() <= 1);
    }

    #[tokio::test]
    async fn compressed_event_precedes_auto_summary_created() {
        let manager = manager_with_limit(1000, Thresholds::default());
        let order = StdArc::new(std::sync::Mutex::new(Vec::new()));

        let o1 = order.clone();
        manager.on(
            "compressed",
            Box::new(move |_| o1.lock().unwrap().push("compressed")),
        );
        let o2 = order.clone();
        manager.on(
            "auto-summary-created",
            Box::new(move |_| o2.lock().unwrap().push("auto-summary-created")),
        );

        for i in 0..10 {
            manager
                .add_message(Message::new(Role::Assistant, format!("m{i}"), 90))
                .await
                .unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["compressed", "auto-summary-created"]);
    }

    #[tokio::test]
    async fn in_flight_tokens_count_toward_usage_until_cleared() {
        let manager = manager_with_limit(1000, Thresholds::default());
        manager.report_inflight_tokens(500);
        assert!((manager.get_usage().await - 0.5).abs() < 0.001);
        manager.clear_inflight_tokens();
        assert!((manager.get_usage().await - 0.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn snapshot_restores_prior_state() {
        let manager = manager_with_limit(1000, Thresholds::default());
        manager
            .add_message(Message::new(Role::User, "hi", 10))
            .await
            .unwrap();
        let snapshot = manager.create_snapshot().await;
        manager
            .add_message(Message::new(Role::Assistant, "more", 10))
            .await
            .unwrap();
        assert_eq!(manager.get_context().await.recent().len(), 2);
        manager.restore(snapshot).await;
        assert_eq!(manager.get_context().await.recent().len(), 1);
    }
}
