// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Background task scheduling for the coordinator.

use std::sync::Arc;

use futures::StreamExt;
use rolling_bloom_store::BitmapStore;
use tick::{Delay, PeriodicTimer};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::coordinator::Inner;

/// Spawns the coordinator's tasks: the insert workers, the sync timer, and
/// the rotation timer. Every handle is returned so shutdown can join them.
pub(crate) fn spawn_tasks<S>(
    inner: &Arc<Inner<S>>,
    add_rx: mpsc::Receiver<String>,
    shutdown_rx: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>>
where
    S: BitmapStore + 'static,
{
    let mut tasks = Vec::with_capacity(inner.config.insert_workers + 2);

    let add_rx = Arc::new(Mutex::new(add_rx));
    for _ in 0..inner.config.insert_workers {
        tasks.push(tokio::spawn(insert_worker(
            Arc::clone(inner),
            Arc::clone(&add_rx),
        )));
    }

    tasks.push(tokio::spawn(sync_loop(
        Arc::clone(inner),
        shutdown_rx.clone(),
    )));
    tasks.push(tokio::spawn(rotation_loop(
        Arc::clone(inner),
        shutdown_rx.clone(),
    )));

    tasks
}

/// Drains the add queue into the current filter.
///
/// Exits once the queue is closed and the backlog is drained, which is the
/// shutdown path; no separate cancellation is needed.
async fn insert_worker<S>(inner: Arc<Inner<S>>, add_rx: Arc<Mutex<mpsc::Receiver<String>>>)
where
    S: BitmapStore + 'static,
{
    loop {
        // One worker waits on the queue at a time; the lock is released
        // between items so the workers take turns.
        let next = add_rx.lock().await.recv().await;

        match next {
            Some(s) => inner.ingest(&s).await,
            None => break,
        }
    }
}

/// Runs an incremental sync every `sync_interval`.
async fn sync_loop<S>(inner: Arc<Inner<S>>, mut shutdown: watch::Receiver<bool>)
where
    S: BitmapStore + 'static,
{
    let mut timer = PeriodicTimer::new(&inner.clock, inner.config.sync_interval);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            Some(()) = timer.next() => inner.sync_once().await,
        }
    }
}

/// Rotates the ring at every interval boundary.
///
/// The remaining time to the next boundary is recomputed after every
/// rotation instead of using a periodic timer: a rotation spends the settle
/// delay inside its flush, and re-deriving the boundary from the clock keeps
/// rotations aligned regardless of how long the previous one took.
async fn rotation_loop<S>(inner: Arc<Inner<S>>, mut shutdown: watch::Receiver<bool>)
where
    S: BitmapStore + 'static,
{
    loop {
        let wait = inner.next_boundary_delay();

        tokio::select! {
            _ = shutdown.changed() => break,
            () = Delay::new(&inner.clock, wait) => inner.rotate_once().await,
        }
    }
}
