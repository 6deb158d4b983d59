//! Bounded fan-out of independent request units.
//!
//! [`BoundedScheduler::run`] executes every unit exactly once, never more
//! than `limit` at a time, and returns one [`UnitOutcome`] per unit aligned
//! with submission order. A unit that errors (or panics) becomes an
//! [`Outcome::Failure`]; its siblings keep running. Nothing is retried here.
//!
//! The permit pool is owned by the scheduler, so every batch submitted
//! through the same scheduler (or a clone of it) shares one global cap.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn, Instrument};

use crate::domain::{PropsmithError, PropsmithResult, UnitError, UnitResult};

/// The atomic piece of work submitted to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestUnit<P> {
    /// Stable identity used for ordering, merging and failure reporting.
    pub key: String,
    pub payload: P,
}

impl<P> RequestUnit<P> {
    pub fn new(key: impl Into<String>, payload: P) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}

/// Success value or captured failure of one unit.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Success(T),
    Failure(UnitError),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    pub fn into_result(self) -> UnitResult<T> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(err) => Err(err),
        }
    }
}

impl<T> From<UnitResult<T>> for Outcome<T> {
    fn from(result: UnitResult<T>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err),
        }
    }
}

/// An [`Outcome`] tagged with the originating unit's key and position.
#[derive(Debug, Clone)]
pub struct UnitOutcome<T> {
    /// Submission position of the unit.
    pub index: usize,
    pub key: String,
    pub outcome: Outcome<T>,
}

/// Runs request units under a global concurrency cap.
#[derive(Debug, Clone)]
pub struct BoundedScheduler {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl BoundedScheduler {
    /// Create a scheduler admitting at most `limit` units at once.
    ///
    /// `limit` must be at least 1.
    pub fn new(limit: usize) -> PropsmithResult<Self> {
        if limit == 0 {
            return Err(PropsmithError::InvalidConfig(
                "max concurrent requests must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Execute `call` once per unit and wait for all of them.
    ///
    /// The returned vector has one entry per input unit, in input order,
    /// whatever order the units completed in.
    pub async fn run<P, T, F, Fut>(&self, units: Vec<RequestUnit<P>>, call: F) -> Vec<UnitOutcome<T>>
    where
        P: Send + 'static,
        T: Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = UnitResult<T>> + Send + 'static,
    {
        self.run_observed(units, call, |_, _| {}).await
    }

    /// [`run`](Self::run), calling `on_settled(key, outcome)` as each unit
    /// settles, in completion order.
    #[instrument(skip_all, fields(units = units.len(), limit = self.limit))]
    pub async fn run_observed<P, T, F, Fut, O>(
        &self,
        units: Vec<RequestUnit<P>>,
        call: F,
        mut on_settled: O,
    ) -> Vec<UnitOutcome<T>>
    where
        P: Send + 'static,
        T: Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = UnitResult<T>> + Send + 'static,
        O: FnMut(&str, &Outcome<T>),
    {
        let call = Arc::new(call);
        let keys: Vec<String> = units.iter().map(|u| u.key.clone()).collect();
        let mut join_set = JoinSet::new();

        for (index, unit) in units.into_iter().enumerate() {
            let permits = Arc::clone(&self.permits);
            let call = Arc::clone(&call);

            join_set.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        debug!(key = %unit.key, "unit admitted");
                        // Held until the call settles, released on every path.
                        match AssertUnwindSafe(call(unit.payload)).catch_unwind().await {
                            Ok(result) => Outcome::from(result),
                            Err(panic) => Outcome::Failure(UnitError::Aborted(panic_message(&*panic))),
                        }
                    }
                    Err(e) => Outcome::Failure(UnitError::Aborted(format!(
                        "concurrency permit unavailable: {e}"
                    ))),
                };
                (index, outcome)
            }
            .in_current_span());
        }

        let mut slots: Vec<Option<Outcome<T>>> = (0..keys.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    on_settled(&keys[index], &outcome);
                    slots[index] = Some(outcome);
                }
                Err(e) => warn!(error = %e, "unit task join error"),
            }
        }

        keys.into_iter()
            .zip(slots)
            .enumerate()
            .map(|(index, (key, slot))| UnitOutcome {
                index,
                key,
                outcome: slot.unwrap_or_else(|| {
                    Outcome::Failure(UnitError::Aborted("unit task did not complete".to_string()))
                }),
            })
            .collect()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("unit panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("unit panicked: {s}")
    } else {
        "unit panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn units(n: usize) -> Vec<RequestUnit<usize>> {
        (0..n).map(|i| RequestUnit::new(format!("unit-{i}"), i)).collect()
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let err = BoundedScheduler::new(0).unwrap_err();
        assert!(matches!(err, PropsmithError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_returns_empty() {
        let scheduler = BoundedScheduler::new(3).unwrap();
        let out = scheduler
            .run(Vec::<RequestUnit<usize>>::new(), |i| async move { Ok::<_, UnitError>(i) })
            .await;
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_submission_order_not_completion_order() {
        let scheduler = BoundedScheduler::new(8).unwrap();
        // Later units finish first.
        let out = scheduler
            .run(units(6), |i| async move {
                tokio::time::sleep(Duration::from_millis(100 - (i as u64) * 10)).await;
                Ok::<_, UnitError>(i * 10)
            })
            .await;

        let keys: Vec<&str> = out.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["unit-0", "unit-1", "unit-2", "unit-3", "unit-4", "unit-5"]);
        let values: Vec<usize> = out.iter().map(|o| *o.outcome.success().unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50]);
        assert!(out.iter().enumerate().all(|(i, o)| o.index == i));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let scheduler = BoundedScheduler::new(3).unwrap();

        let (f, p) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let out = scheduler
            .run(units(12), move |i| {
                let in_flight = Arc::clone(&f);
                let peak = Arc::clone(&p);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10 + (i % 4) as u64)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, UnitError>(i)
                }
            })
            .await;

        assert_eq!(out.len(), 12);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = BoundedScheduler::new(2).unwrap();

        let c = Arc::clone(&calls);
        let out = scheduler
            .run(units(5), move |i| {
                let calls = Arc::clone(&c);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if i == 1 {
                        Err(UnitError::malformed("not json"))
                    } else {
                        Ok(i)
                    }
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5, "each unit invoked exactly once");
        assert_eq!(out.iter().filter(|o| o.outcome.is_success()).count(), 4);
        assert!(matches!(
            out[1].outcome,
            Outcome::Failure(UnitError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_panicking_unit_is_captured_in_its_slot() {
        let scheduler = BoundedScheduler::new(4).unwrap();
        let out = scheduler
            .run(units(3), |i| async move {
                if i == 2 {
                    panic!("boom");
                }
                Ok::<_, UnitError>(i)
            })
            .await;

        assert!(out[0].outcome.is_success());
        assert!(out[1].outcome.is_success());
        match &out[2].outcome {
            Outcome::Failure(UnitError::Aborted(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected aborted failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_one_and_limit_n_yield_identical_outcomes() {
        let work = |i: usize| async move {
            tokio::time::sleep(Duration::from_millis(((i * 7) % 5) as u64)).await;
            if i % 3 == 0 {
                Err(UnitError::malformed(format!("unit {i}")))
            } else {
                Ok(i * i)
            }
        };

        let sequential = BoundedScheduler::new(1).unwrap().run(units(10), work).await;
        let parallel = BoundedScheduler::new(10).unwrap().run(units(10), work).await;

        let flatten = |outs: Vec<UnitOutcome<usize>>| -> Vec<(String, Result<usize, String>)> {
            outs.into_iter()
                .map(|o| (o.key, o.outcome.into_result().map_err(|e| e.to_string())))
                .collect()
        };
        assert_eq!(flatten(sequential), flatten(parallel));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_observed_reports_each_unit_once_as_it_settles() {
        let scheduler = BoundedScheduler::new(4).unwrap();
        let mut settled: Vec<(String, bool)> = Vec::new();
        let out = scheduler
            .run_observed(
                units(4),
                |i| async move {
                    tokio::time::sleep(Duration::from_millis(40 - (i as u64) * 10)).await;
                    if i == 2 {
                        Err(UnitError::malformed("bad"))
                    } else {
                        Ok(i)
                    }
                },
                |key, outcome| settled.push((key.to_string(), outcome.is_success())),
            )
            .await;

        assert_eq!(out.len(), 4);
        assert_eq!(
            settled,
            vec![
                ("unit-3".to_string(), true),
                ("unit-2".to_string(), false),
                ("unit-1".to_string(), true),
                ("unit-0".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_cloned_scheduler_shares_permits() {
        let scheduler = BoundedScheduler::new(1).unwrap();
        let clone = scheduler.clone();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let make = |in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>| {
            move |i: usize| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, UnitError>(i)
                }
            }
        };

        let (a, b) = tokio::join!(
            scheduler.run(units(4), make(Arc::clone(&in_flight), Arc::clone(&peak))),
            clone.run(units(4), make(Arc::clone(&in_flight), Arc::clone(&peak))),
        );
        assert_eq!(a.len() + b.len(), 8);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
