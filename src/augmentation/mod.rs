//! Augmentation pipeline (C11, spec §4.9) — every externally visible
//! operation is dispatched through an ordered list of augmentations that can
//! observe, transform, short-circuit, or replace the built-in behavior.

pub mod audit_aug;
pub mod cache_aug;
pub mod metrics_aug;

use std::sync::Mutex;

use async_trait::async_trait;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::{BrainyError, Result};
use crate::types::{Noun, Statistics, Verb};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Update,
    Delete,
    Search,
    Relate,
    Unrelate,
    Get,
    List,
    Clear,
    Backup,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    Before,
    After,
    Around,
    Replace,
}

/// Which operations an augmentation applies to — a closed set or all of
/// them (spec §4.9: "closed enumeration or 'all'").
#[derive(Debug, Clone)]
pub enum OperationSet {
    All,
    Only(Vec<Operation>),
}

impl OperationSet {
    fn contains(&self, op: Operation) -> bool {
        match self {
            OperationSet::All => true,
            OperationSet::Only(ops) => ops.contains(&op),
        }
    }
}

/// What's passed to every hook. `params` is a JSON value rather than a
/// typed struct per operation so the pipeline stays generic over all
/// eleven operations; `db.rs` builds it from the typed call it received.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation: Operation,
    pub params: serde_json::Value,
    pub session_id: Option<String>,
}

/// The result shape common to all eleven operations. `after`/`around`
/// augmentations see and may transform this; `before` augmentations only
/// see the context.
#[derive(Debug, Clone)]
pub enum OperationOutcome {
    Noun(Option<Noun>),
    Nouns(Vec<Noun>),
    Verb(Option<Verb>),
    Verbs(Vec<Verb>),
    SearchHits(Vec<(Uuid, f32)>),
    Statistics(Statistics),
    Bool(bool),
    Unit,
    Cancelled,
}

/// Wraps the rest of the chain (inner `around` augmentations, then the
/// built-in implementation) so an `around` augmentation may call it zero or
/// one times. Consuming `self` by value makes "called more than once" a
/// compile error rather than a runtime contract.
pub struct Next {
    inner: BoxFuture<'static, Result<OperationOutcome>>,
}

impl Next {
    pub(crate) fn new(inner: BoxFuture<'static, Result<OperationOutcome>>) -> Self {
        Self { inner }
    }

    pub async fn call(self) -> Result<OperationOutcome> {
        self.inner.await
    }
}

#[async_trait]
pub trait Augmentation: Send + Sync {
    fn name(&self) -> &'static str;
    fn priority(&self) -> i32;
    fn timing(&self) -> Timing;
    fn operations(&self) -> OperationSet;

    /// Runs when `timing() == Before`. Cannot alter the eventual result.
    async fn run_before(&self, _ctx: &OperationContext) -> Result<()> {
        Ok(())
    }

    /// Runs when `timing() == After`. May transform `outcome` in place.
    async fn run_after(&self, _ctx: &OperationContext, _outcome: &mut OperationOutcome) -> Result<()> {
        Ok(())
    }

    /// Runs when `timing() == Around`. Default just forwards to `next`,
    /// which also means cancellation from `next` propagates untouched —
    /// satisfying "must not retry unless explicitly declared idempotent"
    /// for any augmentation that doesn't override this.
    async fn run_around(&self, _ctx: &OperationContext, next: Next) -> Result<OperationOutcome> {
        next.call().await
    }

    /// Runs when `timing() == Replace`, bypassing the built-in
    /// implementation entirely. `around` augmentations still wrap this.
    async fn run_replace(&self, _ctx: &OperationContext) -> Result<OperationOutcome> {
        Err(BrainyError::Internal(anyhow::anyhow!(
            "augmentation '{}' declares Replace timing but does not implement run_replace",
            self.name()
        )))
    }
}

/// `QUEUED → RUNNING → (SUCCESS | ERROR | CANCELLED)` (spec §4.9). This
/// implementation never actually suspends a call before running it, so
/// every dispatch skips `Queued` and goes straight to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Queued,
    Running,
    Success,
    Error,
    Cancelled,
}

pub struct Pipeline {
    augmentations: Mutex<Vec<std::sync::Arc<dyn Augmentation>>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { augmentations: Mutex::new(Vec::new()) }
    }

    /// Inserts, then re-sorts by descending priority. `Vec::sort_by` is
    /// stable, so augmentations registered earlier at equal priority keep
    /// running first (spec: "ties broken by insertion order").
    pub fn register(&self, augmentation: std::sync::Arc<dyn Augmentation>) {
        let mut augmentations = self.augmentations.lock().unwrap();
        augmentations.push(augmentation);
        augmentations.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    fn applicable(&self, op: Operation) -> Vec<std::sync::Arc<dyn Augmentation>> {
        self.augmentations
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.operations().contains(op))
            .cloned()
            .collect()
    }

    /// Dispatches one call through the pipeline. `builtin` is the actual
    /// operation implementation, run last unless a `Replace` augmentation
    /// is registered for this operation.
    pub async fn dispatch<F>(&self, ctx: OperationContext, builtin: F) -> Result<OperationOutcome>
    where
        F: FnOnce() -> BoxFuture<'static, Result<OperationOutcome>> + Send + 'static,
    {
        let applicable = self.applicable(ctx.operation);

        for aug in applicable.iter().filter(|a| a.timing() == Timing::Before) {
            aug.run_before(&ctx).await?;
        }

        let replacer = applicable.iter().find(|a| a.timing() == Timing::Replace).cloned();
        let mut chain: BoxFuture<'static, Result<OperationOutcome>> = match replacer {
            Some(replacer) => {
                let ctx = ctx.clone();
                Box::pin(async move { replacer.run_replace(&ctx).await })
            }
            None => builtin(),
        };

        for aug in applicable.iter().filter(|a| a.timing() == Timing::Around).rev() {
            let aug = aug.clone();
            let ctx = ctx.clone();
            let next = Next::new(chain);
            chain = Box::pin(async move { aug.run_around(&ctx, next).await });
        }

        let result = chain.await;

        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(BrainyError::Cancelled) => OperationOutcome::Cancelled,
            Err(e) => return Err(e),
        };

        for aug in applicable.iter().filter(|a| a.timing() == Timing::After) {
            aug.run_after(&ctx, &mut outcome).await?;
        }

        Ok(outcome)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
