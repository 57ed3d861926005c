//! Pure group executor: fan out item plans, then merge.
//!
//! Item plans are independent, so they run concurrently on `may` coroutines, at
//! most `max_parallel` at a time. Workers pull `(index, plan)` jobs from a
//! pre-filled `crossbeam-channel` queue and hand their results back through their
//! join handles; the merge runs on the caller once every worker has finished.
//!
//! Failure is fail-fast: the first failing worker raises an abort flag so no new
//! plan is started, and the error of the lowest failing item index is returned.
//! There are no partial results and no retries.

use crate::error::{DslError, QueryError};
use crate::group::spec::{ExecutionOptions, QueryGroupSpec};
use crate::projection::TupleRow;
use crate::query::execution::fetch_plan;
use crate::query::plan::{dedup_rows, SelectPlan};
use crate::store::QueryStore;
use crate::value::Value;
use crossbeam_channel::unbounded;
use std::any::Any;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

type ItemResult = (usize, Result<Vec<Vec<Value>>, QueryError>);

/// Execute every plan of `spec` against `store` and merge the rows.
///
/// Rows are concatenated in item-registration order, stably sorted by the group
/// ordering (if any), then deduplicated by full cell equality keeping the first
/// occurrence (if distinct).
///
/// # Errors
///
/// The first `QueryError` by item index, or `QueryError::WorkerPanicked`.
pub fn execute_group<S>(
    spec: &QueryGroupSpec,
    store: &Arc<S>,
    options: &ExecutionOptions,
) -> Result<Vec<TupleRow>, DslError>
where
    S: QueryStore + ?Sized + 'static,
{
    #[cfg(feature = "tracing")]
    let _span = crate::metrics::tracing_helpers::group_span(&spec.entity, spec.len()).entered();

    let results = if spec.len() <= 1 || options.max_parallel <= 1 {
        run_inline(&spec.plans, store.as_ref())?
    } else {
        run_parallel(&spec.plans, store, options)?
    };

    let (rows, removed) = merge(spec, results)?;

    #[cfg(feature = "metrics")]
    crate::metrics::METRICS.record_group(spec.len(), removed);

    log::debug!(
        "group over {} merged {} items into {} rows ({} duplicates removed)",
        spec.entity,
        spec.len(),
        rows.len(),
        removed
    );
    Ok(rows
        .into_iter()
        .map(|cells| TupleRow::new(cells, Arc::clone(&spec.shape)))
        .collect())
}

fn run_inline<S>(plans: &[SelectPlan], store: &S) -> Result<Vec<Vec<Vec<Value>>>, QueryError>
where
    S: QueryStore + ?Sized,
{
    plans.iter().map(|plan| fetch_plan(store, plan)).collect()
}

fn run_parallel<S>(
    plans: &[SelectPlan],
    store: &Arc<S>,
    options: &ExecutionOptions,
) -> Result<Vec<Vec<Vec<Value>>>, QueryError>
where
    S: QueryStore + ?Sized + 'static,
{
    let (job_tx, job_rx) = unbounded::<(usize, SelectPlan)>();
    for job in plans.iter().cloned().enumerate() {
        // The receiver is alive; sending cannot fail.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let abort = Arc::new(AtomicBool::new(false));
    let workers = options.max_parallel.min(plans.len());
    log::debug!("running {} item plans on {workers} coroutines", plans.len());

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let jobs = job_rx.clone();
        let store = Arc::clone(store);
        let worker_abort = Arc::clone(&abort);
        let builder = may::coroutine::Builder::new()
            .name(format!("querygroup-item-{worker}"))
            .stack_size(options.stack_size);
        let spawned = may::go!(builder, move || {
            let mut done: Vec<ItemResult> = Vec::new();
            while !worker_abort.load(AtomicOrdering::SeqCst) {
                let Ok((index, plan)) = jobs.try_recv() else {
                    break;
                };
                #[cfg(feature = "tracing")]
                let _span = crate::metrics::tracing_helpers::group_item_span(index).entered();
                let result = fetch_plan(store.as_ref(), &plan);
                if result.is_err() {
                    worker_abort.store(true, AtomicOrdering::SeqCst);
                }
                done.push((index, result));
            }
            done
        });
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                abort.store(true, AtomicOrdering::SeqCst);
                // Let already-spawned workers finish before reporting.
                for handle in handles {
                    let _ = handle.join();
                }
                return Err(QueryError::Execution(format!(
                    "failed to spawn group worker: {e}"
                )));
            }
        }
    }

    let mut slots: Vec<Option<Result<Vec<Vec<Value>>, QueryError>>> =
        (0..plans.len()).map(|_| None).collect();
    let mut panic = None;
    for handle in handles {
        match handle.join() {
            Ok(done) => {
                for (index, result) in done {
                    slots[index] = Some(result);
                }
            }
            Err(payload) => panic = Some(panic_message(payload.as_ref())),
        }
    }

    // Lowest failing index wins; a panic is reported only if no item failed before it.
    let mut rows = Vec::with_capacity(plans.len());
    for (index, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(Ok(item_rows)) => rows.push(item_rows),
            Some(Err(e)) => return Err(e),
            None => {
                return Err(match panic.take() {
                    Some(message) => QueryError::WorkerPanicked(message),
                    None => QueryError::Execution(format!("item {index} was not executed")),
                })
            }
        }
    }
    if let Some(message) = panic {
        return Err(QueryError::WorkerPanicked(message));
    }
    Ok(rows)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Concatenate, sort and deduplicate item rows. Returns the rows and the number of
/// duplicates removed.
fn merge(
    spec: &QueryGroupSpec,
    results: Vec<Vec<Vec<Value>>>,
) -> Result<(Vec<Vec<Value>>, usize), QueryError> {
    let mut keyed: Vec<(Vec<Value>, Vec<Value>)> = Vec::new();
    for (plan, rows) in spec.plans.iter().zip(results) {
        let positions = spec
            .order
            .iter()
            .map(|key| {
                plan.column_position(&key.path).ok_or_else(|| {
                    QueryError::Execution(format!("sort column {} missing from item plan", key.path))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for mut row in rows {
            let sort_key = positions.iter().map(|&p| row[p].clone()).collect();
            row.truncate(spec.width);
            keyed.push((sort_key, row));
        }
    }

    if !spec.order.is_empty() {
        keyed.sort_by(|(a, _), (b, _)| {
            spec.order
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    let ord = a[i].sort_cmp(&b[i]);
                    if key.ascending {
                        ord
                    } else {
                        ord.reverse()
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

    let mut rows: Vec<Vec<Value>> = keyed.into_iter().map(|(_, row)| row).collect();
    let removed = if spec.distinct { dedup_rows(&mut rows) } else { 0 };
    Ok((rows, removed))
}
