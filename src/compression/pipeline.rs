//! Compression Pipeline — six explicit stages that fold older assistant
//! messages into a checkpoint and atomically swap them into the Active
//! Context.

use std::sync::Arc;

use crate::context::{ActiveContext, Checkpoint, Message, Role};
use crate::provider::Provider;
use crate::summarization::{self, Goal, Mode, SummarizationRequest};
use crate::validation::{self, MessageTokens};

use super::engine::StrategyParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Identification,
    Preparation,
    Summarization,
    CheckpointCreation,
    ContextUpdate,
    Validation,
}

pub struct ProgressEvent<'a> {
    pub stage: Stage,
    pub percent: u8,
    pub message: &'a str,
}

pub type ProgressCallback<'a> = dyn Fn(ProgressEvent) + Send + Sync + 'a;

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub success: bool,
    pub reason: Option<String>,
    pub error: Option<String>,
    pub checkpoint: Option<Checkpoint>,
}

impl PipelineOutcome {
    fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            error: None,
            checkpoint: None,
        }
    }

    fn failure_with_error(reason: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            error: Some(error.into()),
            checkpoint: None,
        }
    }
}

fn report(callback: &ProgressCallback, stage: Stage, percent: u8, message: &str) {
    callback(ProgressEvent { stage, percent, message });
}

/// Run the pipeline against `context`, compressing the older assistant
/// messages it identifies in stage 1. On success, `context` reflects the
/// compression; on failure, `context` is left exactly as it was found.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    context: &mut ActiveContext,
    provider: Arc<dyn Provider>,
    params: StrategyParams,
    mode: Mode,
    goal: Option<&Goal>,
    model: &str,
    effective_limit: usize,
    callback: &ProgressCallback<'_>,
) -> PipelineOutcome {
    // Stage 1: Identification (0→15%).
    report(callback, Stage::Identification, 0, "selecting compression targets");
    let recent = context.recent();
    let eligible_end = recent.len().saturating_sub(params.keep_recent);
    let targets: Vec<Message> = recent[..eligible_end]
        .iter()
        .filter(|m| m.role == Role::Assistant || (params.compress_user && m.role == Role::User))
        .cloned()
        .collect();

    if targets.len() < params.min_to_compress.max(2) {
        return PipelineOutcome::failure("No messages to compress");
    }
    report(callback, Stage::Identification, 15, "targets identified");

    // Stage 2: Preparation (15→25%).
    report(callback, Stage::Preparation, 15, "preparing summarization request");
    let original_tokens: usize = targets.iter().map(|m| m.token_count).sum();
    let level = if original_tokens > 3000 {
        1
    } else if original_tokens > 2000 {
        2
    } else {
        3
    };
    report(callback, Stage::Preparation, 25, "prepared");

    // Stage 3: Summarization (25→70%).
    report(callback, Stage::Summarization, 25, "summarizing");
    let result = summarization::summarize(
        provider,
        SummarizationRequest {
            messages: &targets,
            level,
            mode,
            goal,
            model: model.to_string(),
            max_summary_tokens: params.max_summary_tokens,
        },
    )
    .await;
    if !result.success {
        return PipelineOutcome::failure_with_error(
            "Summarization failed",
            result.error.unwrap_or_else(|| "unknown error".to_string()),
        );
    }
    report(callback, Stage::Summarization, 70, "summary produced");

    // Stage 4: Checkpoint creation (70→80%).
    report(callback, Stage::CheckpointCreation, 70, "creating checkpoint");
    let checkpoint = Checkpoint {
        id: uuid::Uuid::new_v4(),
        created_at: chrono::Utc::now(),
        summary: result.summary,
        level,
        sequence: 0, // assigned by ActiveContext::apply_compression
        token_count: result.token_count,
        original_message_ids: targets.iter().map(|m| m.id).collect(),
        model: result.model,
    };
    report(callback, Stage::CheckpointCreation, 80, "checkpoint created");

    // Stage 5: Context update (80→90%), atomic.
    report(callback, Stage::ContextUpdate, 80, "updating active context");
    let freed_tokens = original_tokens as i64 - checkpoint.token_count as i64;
    if freed_tokens <= 0 {
        return PipelineOutcome::failure("Compression did not reduce token count");
    }
    let target_ids: Vec<uuid::Uuid> = checkpoint.original_message_ids.clone();
    if let Err(err) = context.apply_compression(&target_ids, checkpoint) {
        return PipelineOutcome::failure_with_error("Compression failed to apply", err.to_string());
    }
    report(callback, Stage::ContextUpdate, 90, "active context updated");

    // Stage 6: Validation (90→100%).
    report(callback, Stage::Validation, 90, "validating result");
    let tokens: Vec<MessageTokens> = context.message_tokens();
    let validation_result = validation::validate(&tokens, effective_limit);
    if !validation_result.valid {
        return PipelineOutcome::failure("Compression failed validation");
    }
    report(callback, Stage::Validation, 100, "validated");

    let applied_checkpoint = context
        .checkpoints()
        .last()
        .cloned()
        .expect("checkpoint was just applied");

    PipelineOutcome {
        success: true,
        reason: None,
        error: None,
        checkpoint: Some(applied_checkpoint),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::engine::Strategy;
    use crate::context::Message;
    use crate::provider::{MockProvider, ScriptedTurn};
    use std::cell::RefCell;

    fn ctx_with_messages(n: usize) -> ActiveContext {
        let mut ctx = ActiveContext::new(Message::new(Role::System, "system prompt", 10), 100_000);
        for i in 0..n {
            ctx.add_message(Message::new(Role::Assistant, format!("message {i}"), 600))
                .unwrap();
        }
        ctx
    }

    #[tokio::test]
    async fn successful_run_reduces_recent_and_adds_checkpoint() {
        let mut ctx = ctx_with_messages(10);
        let provider: Arc<dyn Provider> = Arc::new(MockProvider::new(
            "mock",
            vec![ScriptedTurn::Text("a reasonably sized summary of everything that happened".to_string())],
        ));
        let params = Strategy::Standard.params();
        let events = RefCell::new(Vec::new());
        let callback = |e: ProgressEvent| events.borrow_mut().push((e.stage, e.percent));

        let outcome = run(&mut ctx, provider, params, Mode::Developer, None, "mock-model", 100_000, &callback).await;

        assert!(outcome.success, "{:?}", outcome.error);
        assert!(outcome.checkpoint.is_some());
        assert_eq!(ctx.recent().len(), params.keep_recent);
        assert_eq!(ctx.checkpoints().len(), 1);
        let percents: Vec<u8> = events.borrow().iter().map(|(_, p)| *p).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*percents.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn too_few_targets_fails_without_mutating_context() {
        let mut ctx = ctx_with_messages(3); // fewer than keep_recent(5) + min_to_compress
        let provider: Arc<dyn Provider> = Arc::new(MockProvider::new("mock", vec![ScriptedTurn::Text("s".repeat(50))]));
        let params = Strategy::Standard.params();
        let before = ctx.recent().len();
        let callback = |_: ProgressEvent| {};

        let outcome = run(&mut ctx, provider, params, Mode::Assistant, None, "mock-model", 100_000, &callback).await;

        assert!(!outcome.success);
        assert_eq!(outcome.reason.as_deref(), Some("No messages to compress"));
        assert_eq!(ctx.recent().len(), before);
        assert!(ctx.checkpoints().is_empty());
    }

    #[tokio::test]
    async fn summarization_failure_leaves_context_unchanged() {
        let mut ctx = ctx_with_messages(10);
        let provider: Arc<dyn Provider> = Arc::new(MockProvider::new("mock", vec![ScriptedTurn::Error("down".to_string())]));
        let params = Strategy::Standard.params();
        let before = ctx.recent().len();
        let callback = |_: ProgressEvent| {};

        let outcome = run(&mut ctx, provider, params, Mode::Developer, None, "mock-model", 100_000, &callback).await;

        assert!(!outcome.success);
        assert_eq!(outcome.reason.as_deref(), Some("Summarization failed"));
        assert_eq!(ctx.recent().len(), before);
    }
}
