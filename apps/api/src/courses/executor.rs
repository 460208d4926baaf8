//! Bounded Concurrency Executor — runs independent fallible tasks with at
//! most `limit` bodies in flight, isolating every failure, and returns only
//! once all of them have settled.
//!
//! Generic on purpose: nothing in here knows about lessons. The pipeline
//! hands it one enrichment future per lesson.

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::Semaphore;

/// Runs `tasks` with at most `limit` executing concurrently.
///
/// The semaphore is the admission gate: a task body starts only once a
/// permit is free, and releasing the permit on completion admits the next
/// queued task. Every task settles exactly once — its slot in the returned
/// vec (input order) holds either its value or its error, and a failing or
/// panicking task never cancels its siblings.
pub async fn run_all<F, T>(tasks: Vec<F>, limit: usize) -> Vec<Result<T>>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));

    let handles: Vec<_> = tasks
        .into_iter()
        .map(|task| {
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                // Held for the whole task body; dropped on completion.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("executor semaphore closed");
                task.await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle.await {
            Ok(result) => result,
            Err(join_error) => Err(anyhow!("task panicked: {join_error}")),
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_all_tasks_settle_and_keep_input_order() {
        let tasks: Vec<_> = (0..10u32)
            .map(|i| async move { Ok::<_, anyhow::Error>(i) })
            .collect();

        let results = run_all(tasks, 3).await;

        assert_eq!(results.len(), 10);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(*result.as_ref().unwrap(), i as u32);
        }
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_never_exceeded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let in_flight = Arc::clone(&in_flight);
                let high_water = Arc::clone(&high_water);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    high_water.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(())
                }
            })
            .collect();

        let results = run_all(tasks, 4).await;

        assert_eq!(results.len(), 20);
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(
            high_water.load(Ordering::SeqCst) <= 4,
            "saw {} tasks in flight with limit 4",
            high_water.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_siblings() {
        let completed = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let completed = Arc::clone(&completed);
                async move {
                    if i == 3 {
                        anyhow::bail!("lesson 3 refused to enrich");
                    }
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .collect();

        let results = run_all(tasks, 2).await;

        assert_eq!(completed.load(Ordering::SeqCst), 9);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
        assert!(results[3].is_err());
        assert!(results[2].is_ok() && results[4].is_ok());
    }

    #[tokio::test]
    async fn test_panic_is_captured_as_that_tasks_error() {
        let tasks: Vec<_> = (0..3)
            .map(|i| async move {
                if i == 1 {
                    panic!("boom");
                }
                Ok::<_, anyhow::Error>(i)
            })
            .collect();

        let results = run_all(tasks, 2).await;

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_empty_task_list_returns_immediately() {
        let tasks: Vec<_> = (0..0u32)
            .map(|i| async move { Ok::<_, anyhow::Error>(i) })
            .collect();
        let results = run_all(tasks, 5).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_is_clamped_to_one() {
        let tasks: Vec<_> = (0..3u32)
            .map(|i| async move { Ok::<_, anyhow::Error>(i) })
            .collect();
        let results = run_all(tasks, 0).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_ok()));
    }
}
