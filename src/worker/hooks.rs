use crate::store::{Document, KeyValue};

use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type ProcessFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

type ProcessFn = Arc<dyn Fn(Document) -> ProcessFuture + Send + Sync>;
type UnitHookFn = Arc<dyn Fn(Option<KeyValue>, Option<KeyValue>) -> HookFuture + Send + Sync>;
type WorkerHookFn = Arc<dyn Fn() -> HookFuture + Send + Sync>;

/// The user-supplied side of a scan: one mandatory `process` callback plus
/// optional lifecycle hooks, all async.
///
/// Unit-scoped hooks receive the immutable bounds of the unit they fire
/// for. `cleanup` must revert whatever partial side effects an earlier,
/// failed `process` pass may have left in the unit's range; the framework
/// does not know what `process` did. `process` itself must be idempotent or
/// tolerate duplicates, since a crashed unit is reprocessed from the start.
#[derive(Clone)]
pub struct ScanHooks {
    process: ProcessFn,
    start_processing: Option<WorkerHookFn>,
    start_unit: Option<UnitHookFn>,
    finish_unit: Option<UnitHookFn>,
    cleanup: Option<UnitHookFn>,
    fired: Option<UnitHookFn>,
    finish_processing: Option<WorkerHookFn>,
}

impl ScanHooks {
    pub fn new<F, Fut>(process: F) -> Self
    where
        F: Fn(Document) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            process: Arc::new(move |doc| Box::pin(process(doc)) as ProcessFuture),
            start_processing: None,
            start_unit: None,
            finish_unit: None,
            cleanup: None,
            fired: None,
            finish_processing: None,
        }
    }

    /// Called once before the worker processes its first unit.
    pub fn on_start_processing<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.start_processing = Some(Arc::new(move || Box::pin(hook()) as HookFuture));
        self
    }

    /// Called before the first document of each unit.
    pub fn on_start_unit<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Option<KeyValue>, Option<KeyValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.start_unit = Some(Arc::new(move |lb, ub| Box::pin(hook(lb, ub)) as HookFuture));
        self
    }

    /// Called after the last document of a unit, before it is marked
    /// complete.
    pub fn on_finish_unit<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Option<KeyValue>, Option<KeyValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.finish_unit = Some(Arc::new(move |lb, ub| Box::pin(hook(lb, ub)) as HookFuture));
        self
    }

    /// Called for a unit claimed in cleanup state. Responsible for turning
    /// the unit's range back into the state it had before the failed pass.
    pub fn on_cleanup<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Option<KeyValue>, Option<KeyValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cleanup = Some(Arc::new(move |lb, ub| Box::pin(hook(lb, ub)) as HookFuture));
        self
    }

    /// Called when a heartbeat discovers the unit was taken over. The
    /// worker terminates after this hook returns, without touching the
    /// unit again.
    pub fn on_fired<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Option<KeyValue>, Option<KeyValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.fired = Some(Arc::new(move |lb, ub| Box::pin(hook(lb, ub)) as HookFuture));
        self
    }

    /// Called when the worker finds no more units to claim.
    pub fn on_finish_processing<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.finish_processing = Some(Arc::new(move || Box::pin(hook()) as HookFuture));
        self
    }

    pub(crate) async fn run_process(&self, doc: Document) -> Result<()> {
        (self.process)(doc).await
    }

    pub(crate) async fn run_start_processing(&self) {
        if let Some(hook) = &self.start_processing {
            hook().await;
        }
    }

    pub(crate) async fn run_start_unit(&self, lb: &Option<KeyValue>, ub: &Option<KeyValue>) {
        if let Some(hook) = &self.start_unit {
            hook(lb.clone(), ub.clone()).await;
        }
    }

    pub(crate) async fn run_finish_unit(&self, lb: &Option<KeyValue>, ub: &Option<KeyValue>) {
        if let Some(hook) = &self.finish_unit {
            hook(lb.clone(), ub.clone()).await;
        }
    }

    pub(crate) async fn run_cleanup(&self, lb: &Option<KeyValue>, ub: &Option<KeyValue>) {
        if let Some(hook) = &self.cleanup {
            hook(lb.clone(), ub.clone()).await;
        }
    }

    pub(crate) async fn run_fired(&self, lb: &Option<KeyValue>, ub: &Option<KeyValue>) {
        if let Some(hook) = &self.fired {
            hook(lb.clone(), ub.clone()).await;
        }
    }

    pub(crate) async fn run_finish_processing(&self) {
        if let Some(hook) = &self.finish_processing {
            hook().await;
        }
    }
}
