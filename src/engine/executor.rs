//! The executor abstraction (component E, §4.F): a `submit`/`wait` barrier
//! the engine fans level-local resolver calls out through, kept behind a
//! trait object so the engine never hard-codes a runtime. Grounded on how
//! the teacher isolates `apollo_compiler` specifics behind accessor traits
//! (`FederationSchema`, `Referencers`) rather than letting them leak
//! everywhere — here the engine only ever sees `Arc<dyn Executor>`.
//!
//! A generic `submit<T>` method would make the trait object-unsafe, so
//! submissions are typed through a closed `TaskOutput` enum instead: every
//! resolver call the engine ever issues produces one of these three shapes,
//! or an `EngineError` if the resolver itself failed.

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use std::pin::Pin;

use crate::error::EngineError;
use crate::value::Value;

/// The result shape of one submitted resolver call.
#[derive(Debug, Clone)]
pub enum TaskOutput {
    /// A root-level field batch: one value per requested field.
    RootFields(Vec<Value>),
    /// A non-root field batch: one row per ident, one value per requested
    /// field within each row.
    Fields(Vec<Vec<Value>>),
    /// A link batch: one target-ident value per incoming ident (or a
    /// single broadcast value when the link has no `requires`).
    Link(Vec<Value>),
}

pub type Task = Pin<Box<dyn std::future::Future<Output = Result<TaskOutput, EngineError>> + Send>>;

/// Runs submitted work and provides an all-complete barrier over it.
/// Submission order is preserved in the returned `Vec`; completion order is
/// unconstrained (§5). No cancellation: a failing task doesn't stop the
/// others in the same batch from being awaited out.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn wait_all(&self, tasks: Vec<Task>) -> Vec<Result<TaskOutput, EngineError>>;
}

/// Runs every submitted task on the calling task, one after another. No
/// real concurrency — suitable for tests and single-threaded embeddings
/// where the resolver bodies are already cheap/synchronous-in-spirit.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

#[async_trait]
impl Executor for InlineExecutor {
    async fn wait_all(&self, tasks: Vec<Task>) -> Vec<Result<TaskOutput, EngineError>> {
        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            out.push(task.await);
        }
        out
    }
}

/// Spawns each submitted task onto the ambient Tokio runtime and awaits
/// them all with `futures::future::join_all`, the way the wider example
/// pack's service crates fan requests out.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioExecutor;

#[async_trait]
impl Executor for TokioExecutor {
    async fn wait_all(&self, tasks: Vec<Task>) -> Vec<Result<TaskOutput, EngineError>> {
        let handles: Vec<_> = tasks.into_iter().map(tokio::spawn).collect();
        join_all(handles)
            .await
            .into_iter()
            .map(|res| match res {
                Ok(inner) => inner,
                Err(join_err) => Err(EngineError::Resolver(Box::new(join_err))),
            })
            .collect()
    }
}

/// Boxes an async block into a `Task` for submission to an `Executor`.
pub fn task(
    fut: impl std::future::Future<Output = Result<TaskOutput, EngineError>> + Send + 'static,
) -> Task {
    Box::pin(fut) as BoxFuture<'static, Result<TaskOutput, EngineError>>
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_executor_preserves_submission_order() {
        let executor = InlineExecutor;
        let tasks = vec![
            task(async { Ok(TaskOutput::RootFields(vec![Value::Int(1)])) }),
            task(async { Ok(TaskOutput::RootFields(vec![Value::Int(2)])) }),
        ];
        let results = executor.wait_all(tasks).await;
        assert!(matches!(&results[0], Ok(TaskOutput::RootFields(v)) if v == &[Value::Int(1)]));
        assert!(matches!(&results[1], Ok(TaskOutput::RootFields(v)) if v == &[Value::Int(2)]));
    }

    #[tokio::test]
    async fn tokio_executor_runs_all_submitted_tasks() {
        let executor = TokioExecutor;
        let tasks = vec![
            task(async { Ok(TaskOutput::Link(vec![Value::Int(1)])) }),
            task(async { Ok(TaskOutput::Link(vec![Value::Int(2)])) }),
        ];
        let results = executor.wait_all(tasks).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn a_failing_task_does_not_stop_the_others_in_the_batch() {
        let executor = InlineExecutor;
        let tasks = vec![
            task(async { Err(EngineError::IndexFinalized) }),
            task(async { Ok(TaskOutput::Link(vec![Value::Int(2)])) }),
        ];
        let results = executor.wait_all(tasks).await;
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }
}
