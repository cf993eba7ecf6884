use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// A single remote call that failed inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    pub path: String,
    pub message: String,
}

/// How a batch ended, derived from its counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Partial,
    Failure,
    /// Nothing was attempted.
    Nothing,
}

impl Outcome {
    pub fn from_counts(success_count: usize, fail_count: usize) -> Self {
        match (success_count, fail_count) {
            (0, 0) => Outcome::Nothing,
            (_, 0) => Outcome::Success,
            (0, _) => Outcome::Failure,
            _ => Outcome::Partial,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub success_count: usize,
    pub fail_count: usize,
    pub errors: Vec<OperationError>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.success_count + self.fail_count
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_counts(self.success_count, self.fail_count)
    }

    pub fn succeeded(&mut self, count: usize) {
        self.success_count += count;
    }

    pub fn failed(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.fail_count += 1;
        self.errors.push(OperationError {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.success_count += other.success_count;
        self.fail_count += other.fail_count;
        self.errors.extend(other.errors);
    }
}

/// Something a batch runs one remote call for.
pub trait BatchItem {
    /// Path reported when the call fails.
    fn label(&self) -> String;
}

impl BatchItem for String {
    fn label(&self) -> String {
        self.clone()
    }
}

/// Runs `op` for every item, `batch_size` at a time.
///
/// The calls of one batch run concurrently and all of them settle before the
/// next batch starts. A failing (or, with `deadline`, timed out) call is
/// recorded in the report and does not stop the rest. Returns the report and
/// the outputs of the calls that succeeded, in item order.
pub async fn run_in_batches<T, R, F, Fut>(
    items: Vec<T>,
    batch_size: usize,
    deadline: Option<Duration>,
    op: F,
) -> (BatchReport, Vec<R>)
where
    T: BatchItem,
    F: Fn(T) -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
{
    let batch_size = batch_size.max(1);
    let total = items.len();
    let mut report = BatchReport::default();
    let mut outputs = Vec::with_capacity(total);
    let mut items = items.into_iter().peekable();
    let mut batch_no = 0;

    while items.peek().is_some() {
        batch_no += 1;
        let batch: Vec<T> = items.by_ref().take(batch_size).collect();
        let calls = batch.into_iter().map(|item| {
            let label = item.label();
            let call = op(item);
            async move {
                let result = match deadline {
                    Some(limit) => match tokio::time::timeout(limit, call).await {
                        Ok(result) => result,
                        Err(_) => Err(anyhow::anyhow!("timed out after {}s", limit.as_secs())),
                    },
                    None => call.await,
                };
                (label, result)
            }
        });
        for (label, result) in join_all(calls).await {
            match result {
                Ok(output) => {
                    report.succeeded(1);
                    outputs.push(output);
                }
                Err(e) => {
                    warn!(path = %label, error = %e, "batch call failed");
                    report.failed(label, format!("{:#}", e));
                }
            }
        }
        debug!(
            batch = batch_no,
            done = report.total(),
            total,
            failed = report.fail_count,
            "batch settled"
        );
    }
    (report, outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn outcome_from_counts() {
        assert_eq!(Outcome::from_counts(0, 0), Outcome::Nothing);
        assert_eq!(Outcome::from_counts(3, 0), Outcome::Success);
        assert_eq!(Outcome::from_counts(0, 2), Outcome::Failure);
        assert_eq!(Outcome::from_counts(1, 1), Outcome::Partial);
    }

    #[tokio::test]
    async fn batches_settle_in_order_and_failures_continue() {
        let started = RefCell::new(Vec::new());
        let items: Vec<String> = (0..5).map(|i| format!("f{i}")).collect();
        let (report, outputs) = run_in_batches(items, 2, None, |item| {
            started.borrow_mut().push(item.clone());
            async move {
                if item == "f3" {
                    anyhow::bail!("nope");
                }
                Ok(item.len())
            }
        })
        .await;
        assert_eq!(report.success_count, 4);
        assert_eq!(report.fail_count, 1);
        assert_eq!(report.errors[0].path, "f3");
        assert_eq!(report.outcome(), Outcome::Partial);
        assert_eq!(outputs.len(), 4);
        assert_eq!(started.borrow().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn next_batch_waits_for_the_slowest_call() {
        let events = RefCell::new(Vec::new());
        let in_flight = Cell::new(0usize);
        let max_in_flight = Cell::new(0usize);
        let items: Vec<String> = (0..5).map(|i| format!("f{i}")).collect();
        let (report, _) = run_in_batches(items, 2, None, |item| {
            let (events, in_flight, max_in_flight) = (&events, &in_flight, &max_in_flight);
            async move {
                events.borrow_mut().push(format!("start {item}"));
                in_flight.set(in_flight.get() + 1);
                max_in_flight.set(max_in_flight.get().max(in_flight.get()));
                // f0 is the slow one of the first batch.
                let secs = if item == "f0" { 10 } else { 1 };
                tokio::time::sleep(Duration::from_secs(secs)).await;
                in_flight.set(in_flight.get() - 1);
                events.borrow_mut().push(format!("end {item}"));
                Ok(())
            }
        })
        .await;

        assert_eq!(report.success_count, 5);
        assert_eq!(max_in_flight.get(), 2);
        let events = events.into_inner();
        let at = |e: &str| events.iter().position(|x| x == e).unwrap();
        for later in ["f2", "f3"] {
            assert!(at(&format!("start {later}")) > at("end f0"));
            assert!(at(&format!("start {later}")) > at("end f1"));
        }
        assert!(at("start f4") > at("end f2"));
        assert!(at("start f4") > at("end f3"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_counts_as_failure() {
        let items = vec!["slow".to_string(), "fast".to_string()];
        let (report, _) = run_in_batches(items, 10, Some(Duration::from_secs(30)), |item| async move {
            if item == "slow" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(())
        })
        .await;
        assert_eq!(report.success_count, 1);
        assert_eq!(report.fail_count, 1);
        assert_eq!(report.errors[0].message, "timed out after 30s");
    }
}
