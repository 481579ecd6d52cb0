//! Batch coalescing for expensive scoring functions.
//!
//! Many independent callers (concurrent rollouts, mostly) each want a small
//! set of boards scored at once. Scoring functions backed by a model are far
//! cheaper per board when called with one large batch, so
//! [`BatchingEvaluator`] queues concurrent submissions and flushes them as a
//! single call against the inner scorer.
//!
//! # Flush policy
//!
//! A flush happens when the queued board count reaches
//! [`BatchPolicy::max_batch_size`], or when [`BatchPolicy::max_wait`] has
//! elapsed since the first pending request, whichever comes first. The
//! max-wait timer bounds batching latency; it is not a call timeout.
//!
//! # Concurrency
//!
//! The queue and its timer live in one mutex-guarded struct. A single worker
//! thread performs every flush: it drains the whole queue under the lock,
//! releases the lock, makes one inner call with the concatenation in request
//! order, and distributes each caller's slice. A board is never evaluated
//! twice and never dropped, and a scorer failure rejects every caller of
//! that flush with the same error.

use std::{
    sync::{Arc, Condvar, Mutex, mpsc},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use plummet_engine::Board;

use crate::{BoardEvaluator, EvaluationError};

/// When to flush the pending queue.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    /// Flush as soon as this many boards are queued.
    pub max_batch_size: usize,
    /// Flush once this much time has passed since the first pending request.
    pub max_wait: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_batch_size: 512,
            max_wait: Duration::from_millis(10),
        }
    }
}

struct PendingRequest {
    boards: Vec<Board>,
    reply: mpsc::Sender<Result<Vec<f32>, EvaluationError>>,
}

#[derive(Default)]
struct Queue {
    pending: Vec<PendingRequest>,
    queued_boards: usize,
    first_enqueued_at: Option<Instant>,
    shutdown: bool,
}

struct Shared<E> {
    queue: Mutex<Queue>,
    wake: Condvar,
    policy: BatchPolicy,
    inner: E,
}

/// Coalesces concurrent [`BoardEvaluator`] calls into few large inner calls.
///
/// `BatchingEvaluator` itself implements [`BoardEvaluator`] (submit, then
/// block on the ticket), so callers do not need to know whether their scores
/// come from a direct call or a coalesced batch.
pub struct BatchingEvaluator<E>
where
    E: BoardEvaluator + 'static,
{
    shared: Arc<Shared<E>>,
    worker: Option<JoinHandle<()>>,
}

impl<E> BatchingEvaluator<E>
where
    E: BoardEvaluator + 'static,
{
    /// Wraps `inner`, spawning the flush worker.
    #[must_use]
    pub fn new(inner: E, policy: BatchPolicy) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            wake: Condvar::new(),
            policy,
            inner,
        });
        let worker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || worker_loop(&shared))
        };
        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Queues `boards` for evaluation and returns a ticket that resolves
    /// with this submission's scores, in the submitted order.
    ///
    /// An empty submission resolves immediately without occupying the queue.
    #[must_use]
    pub fn submit(&self, boards: Vec<Board>) -> EvalTicket {
        let (reply, receiver) = mpsc::channel();
        if boards.is_empty() {
            let _ = reply.send(Ok(Vec::new()));
            return EvalTicket { receiver };
        }

        let mut queue = self.shared.queue.lock().expect("queue mutex poisoned");
        queue.queued_boards += boards.len();
        if queue.first_enqueued_at.is_none() {
            queue.first_enqueued_at = Some(Instant::now());
        }
        queue.pending.push(PendingRequest { boards, reply });
        drop(queue);
        self.shared.wake.notify_one();

        EvalTicket { receiver }
    }
}

impl<E> BoardEvaluator for BatchingEvaluator<E>
where
    E: BoardEvaluator + 'static,
{
    fn evaluate(&self, boards: &[Board]) -> Result<Vec<f32>, EvaluationError> {
        self.submit(boards.to_vec()).wait()
    }
}

impl<E> Drop for BatchingEvaluator<E>
where
    E: BoardEvaluator + 'static,
{
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock().expect("queue mutex poisoned");
            queue.shutdown = true;
        }
        self.shared.wake.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Pending result of one [`BatchingEvaluator::submit`] call.
pub struct EvalTicket {
    receiver: mpsc::Receiver<Result<Vec<f32>, EvaluationError>>,
}

impl EvalTicket {
    /// Blocks until the submission's flush completes.
    pub fn wait(self) -> Result<Vec<f32>, EvaluationError> {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(EvaluationError::new("evaluator shut down before replying")))
    }
}

fn worker_loop<E>(shared: &Shared<E>)
where
    E: BoardEvaluator,
{
    let mut queue = shared.queue.lock().expect("queue mutex poisoned");
    loop {
        if queue.pending.is_empty() {
            if queue.shutdown {
                return;
            }
            queue = shared.wake.wait(queue).expect("queue mutex poisoned");
            continue;
        }

        let first = queue
            .first_enqueued_at
            .expect("pending requests imply an enqueue time");
        let deadline = first + shared.policy.max_wait;
        let now = Instant::now();

        if queue.queued_boards >= shared.policy.max_batch_size || now >= deadline || queue.shutdown
        {
            let batch = std::mem::take(&mut queue.pending);
            queue.queued_boards = 0;
            queue.first_enqueued_at = None;
            drop(queue);
            flush(&shared.inner, batch);
            queue = shared.queue.lock().expect("queue mutex poisoned");
        } else {
            let (guard, _) = shared
                .wake
                .wait_timeout(queue, deadline - now)
                .expect("queue mutex poisoned");
            queue = guard;
        }
    }
}

/// Evaluates one drained batch and distributes each caller's score slice.
fn flush<E>(inner: &E, batch: Vec<PendingRequest>)
where
    E: BoardEvaluator,
{
    let all: Vec<Board> = batch
        .iter()
        .flat_map(|req| req.boards.iter().cloned())
        .collect();

    let result = inner.evaluate(&all).and_then(|scores| {
        if scores.len() == all.len() {
            Ok(scores)
        } else {
            Err(EvaluationError::new(format!(
                "scorer returned {} scores for {} boards",
                scores.len(),
                all.len()
            )))
        }
    });

    match result {
        Ok(scores) => {
            let mut offset = 0;
            for req in batch {
                let n = req.boards.len();
                let _ = req.reply.send(Ok(scores[offset..offset + n].to_vec()));
                offset += n;
            }
        }
        Err(err) => {
            for req in batch {
                let _ = req.reply.send(Err(err.clone()));
            }
        }
    }
}
