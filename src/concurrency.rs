//! The Jobs table: tracked background fire-and-forget work (§5's
//! "Background fire-and-forget jobs"). `didSave`'s memo-cache flush and
//! `coq/saveVo`'s compiled-object write run on their own thread rather than
//! inline, so a slow filesystem can't stall the worker's ability to keep
//! draining the message queue. Jobs never touch the Document Manager,
//! Workspace Registry, or Request Table — only the immutable snapshot they
//! were handed when spawned.

use std::thread;

use crossbeam_channel::{bounded, select, Receiver, Select, Sender};

/// A handle for some background computation. Used, indirectly, to wait for
/// the computation to finish.
///
/// Every `ConcurrentJob` must eventually be stored in a `Jobs` table: that
/// table is what lets tests wait for quiescence instead of polling, and what
/// makes the full set of in-flight background work visible in one place.
///
/// `JobToken` is the worker-side counterpart; dropping it signals that the
/// job has finished.
#[must_use]
pub struct ConcurrentJob {
    chan: Receiver<Never>,
}

pub struct JobToken {
    _chan: Sender<Never>,
}

#[derive(Default)]
pub struct Jobs {
    jobs: Vec<ConcurrentJob>,
}

impl Jobs {
    pub fn add(&mut self, job: ConcurrentJob) {
        self.gc();
        self.jobs.push(job);
    }

    /// Spawns `work` on its own thread and registers the resulting job.
    /// `work` receives a `JobToken` whose drop marks the job complete.
    pub fn spawn(&mut self, work: impl FnOnce(JobToken) + Send + 'static) {
        let (job, token) = ConcurrentJob::new();
        thread::spawn(move || work(token));
        self.add(job);
    }

    /// Blocks the current thread until all pending jobs are finished. Used
    /// by tests that need to observe the effect of a background job (e.g. a
    /// saved `.vo` file) before asserting on it.
    pub fn wait_for_all(&mut self) {
        while !self.jobs.is_empty() {
            let done: usize = {
                let mut select = Select::new();
                for job in &self.jobs {
                    select.recv(&job.chan);
                }

                let oper = select.select();
                let oper_index = oper.index();
                let chan = &self.jobs[oper_index].chan;
                assert!(oper.recv(chan).is_err());
                oper_index
            };
            drop(self.jobs.swap_remove(done));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.iter().all(|job| job.is_completed())
    }

    fn gc(&mut self) {
        self.jobs.retain(|job| !job.is_completed())
    }
}

impl ConcurrentJob {
    pub fn new() -> (ConcurrentJob, JobToken) {
        let (tx, rx) = bounded(0);
        let job = ConcurrentJob { chan: rx };
        let token = JobToken { _chan: tx };
        (job, token)
    }

    fn is_completed(&self) -> bool {
        is_closed(&self.chan)
    }
}

impl Drop for ConcurrentJob {
    fn drop(&mut self) {
        if self.is_completed() || thread::panicking() {
            return;
        }
        panic!("orphaned concurrent job");
    }
}

// Messages are never actually sent through these channels; only closing is
// observed, so an uninhabited enum documents that no payload ever flows.
enum Never {}

/// Non-blocking.
fn is_closed(chan: &Receiver<Never>) -> bool {
    select! {
        recv(chan) -> msg => match msg {
            Err(_) => true,
            Ok(never) => match never {}
        },
        default => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn spawn_runs_work_and_wait_for_all_blocks_until_it_finishes() {
        let ran = Arc::new(AtomicBool::new(false));
        let mut jobs = Jobs::default();
        let ran2 = Arc::clone(&ran);
        jobs.spawn(move |_token| {
            thread::sleep(Duration::from_millis(10));
            ran2.store(true, Ordering::SeqCst);
        });

        jobs.wait_for_all();
        assert!(ran.load(Ordering::SeqCst));
        assert!(jobs.is_empty());
    }

    #[test]
    fn gc_drops_completed_jobs_on_add() {
        let mut jobs = Jobs::default();
        jobs.spawn(|_token| {});
        jobs.wait_for_all();
        assert!(jobs.is_empty());
    }
}
