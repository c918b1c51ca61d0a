//! One-shot delayed tasks run on a single timer thread.

use crossbeam_channel::{unbounded, RecvTimeoutError, Receiver, Sender};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Scheduled {
    due: Instant,
    seq: u64,
    task: Task,
}

// Min-heap on (due, seq) so equal deadlines run in submission order.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Scheduled {}

pub struct RetryScheduler {
    tx: Mutex<Option<(Sender<Scheduled>, u64)>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RetryScheduler {
    pub fn start() -> io::Result<Self> {
        let (tx, rx) = unbounded();
        let worker = thread::Builder::new()
            .name("combo-retry".to_string())
            .spawn(move || run(rx))?;

        Ok(Self {
            tx: Mutex::new(Some((tx, 0))),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Runs `task` on the timer thread once `delay` has elapsed.
    ///
    /// Returns `false` if the scheduler has been shut down.
    pub fn schedule<T>(&self, delay: Duration, task: T) -> bool
    where
        T: FnOnce() + Send + 'static,
    {
        let mut guard = self.tx.lock();
        let Some((tx, next_seq)) = guard.as_mut() else {
            return false;
        };

        let job = Scheduled {
            due: Instant::now() + delay,
            seq: *next_seq,
            task: Box::new(task),
        };
        *next_seq += 1;
        tx.send(job).is_ok()
    }

    /// Stops the timer thread. Tasks that have not fired yet are dropped.
    pub fn shutdown(&self) {
        self.tx.lock().take();

        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        // A task running on the timer thread may drop the last engine handle.
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            log::error!("[retry] timer thread panicked");
        }
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(rx: Receiver<Scheduled>) {
    let mut queue: BinaryHeap<Scheduled> = BinaryHeap::new();

    loop {
        let received = match queue.peek() {
            Some(next) => rx.recv_deadline(next.due),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(job) => queue.push(job),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if !queue.is_empty() {
                    log::debug!("[retry] dropping {} pending task(s)", queue.len());
                }
                return;
            }
        }

        let now = Instant::now();
        while queue.peek().is_some_and(|next| next.due <= now) {
            if let Some(job) = queue.pop() {
                (job.task)();
            }
        }
    }
}
