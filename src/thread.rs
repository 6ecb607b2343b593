// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Thread groups for background work.

use std::fmt;
use std::io;
use std::mem::drop;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use log::{error, info};

////////////////////////////////////////////////////////////////////////
// THREAD GROUPS                                                      //
////////////////////////////////////////////////////////////////////////

/// A group of threads managed together.
///
/// A `ThreadGroup` manages the creation and operation of a number of
/// supervised threads (see [`ThreadGroup::start_supervised`]), which
/// are restarted if they panic.
///
/// A `ThreadGroup` may be shut down through [`ThreadGroup::shut_down`].
/// New threads cannot be started in a `ThreadGroup` once shutdown is
/// initiated, and supervised threads that crash will not be restarted
/// once shutdown has begun. [`ThreadGroup::await_shutdown`] can be used
/// to wait for shutdown to complete. This condition requires all
/// threads to have exited. Long-running tasks should therefore hold an
/// [`Arc`] reference to their `ThreadGroup` and wait through
/// [`ThreadGroup::sleep`], which returns early once shutdown begins.
pub struct ThreadGroup {
    records: Mutex<GroupRecords>,

    /// Allows threads to wait for group shutdown events. This is used
    /// with the `records` mutex. All waiting threads are notified when
    /// (1) shutdown is initiated and (2) shutdown is complete.
    shutdown_wakeup: Condvar,
}

/// The internal records of a [`ThreadGroup`].
#[derive(Default)]
struct GroupRecords {
    thread_count: usize,
    shutting_down: bool,
}

impl ThreadGroup {
    /// Creates a new thread group.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(GroupRecords::default()),
            shutdown_wakeup: Condvar::new(),
        })
    }

    /// Starts a supervised thread in the `ThreadGroup`. The thread will
    /// execute `task`. If `task` panics and the `ThreadGroup` is not
    /// shutting down, a new thread will be started to execute `task`
    /// again. A short delay between successive restarts is enforced to
    /// prevent a crash loop from using excessive CPU time. If `task`
    /// returns normally, the thread simply exits.
    pub fn start_supervised<F>(self: &Arc<Self>, name: Option<String>, task: F) -> Result<(), Error>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut records = self.records.lock().unwrap();
        if records.shutting_down {
            Err(Error::ShuttingDown)
        } else {
            start_supervised(self.clone(), &mut records, name, Arc::new(task)).map_err(Into::into)
        }
    }

    /// Sleeps for `duration`, or until the `ThreadGroup` begins
    /// shutting down, whichever comes first. Returns `true` if the full
    /// duration elapsed and `false` if shutdown cut it short (or had
    /// already begun).
    pub fn sleep(&self, duration: Duration) -> bool {
        let records = self.records.lock().unwrap();
        let (records, _) = self
            .shutdown_wakeup
            .wait_timeout_while(records, duration, |r| !r.shutting_down)
            .unwrap();
        !records.shutting_down
    }

    /// Shuts down the `ThreadGroup`. Threads sleeping in
    /// [`ThreadGroup::sleep`] are woken up.
    pub fn shut_down(&self) {
        let mut records = self.records.lock().unwrap();
        records.shutting_down = true;
        self.shutdown_wakeup.notify_all();
    }

    /// Waits for the `ThreadGroup` to shut down. This is defined as (1)
    /// shutdown having been initiated ([`ThreadGroup::shut_down`]) and
    /// (2) the thread count having dropped to zero. Note that if this
    /// is called from a thread within the group, a deadlock will occur
    /// (since the thread count will never become zero).
    pub fn await_shutdown(&self) {
        let records = self.records.lock().unwrap();
        let _guard = self
            .shutdown_wakeup
            .wait_while(records, |r| !r.shutting_down || r.thread_count > 0)
            .unwrap();
    }

    /// Returns whether the `ThreadGroup` is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.records.lock().unwrap().shutting_down
    }

    /// Returns the number of threads currently running in the group.
    pub fn thread_count(&self) -> usize {
        self.records.lock().unwrap().thread_count
    }
}

/// How long to wait between successive starts of a supervised thread.
/// If a thread panics within `THREAD_RESPAWN_DELAY` of its last start,
/// it will sleep long enough before spawning a new copy of itself to
/// maintain this delay.
const THREAD_RESPAWN_DELAY: Duration = Duration::from_secs(1);

/// A handle to be owned by a supervised thread. When dropped (when the
/// thread exits or panics), it will perform necessary clean-up actions
/// (see [`end_thread`]). It will also, when the thread panicked,
/// execute a respawn.
struct SupervisedHandle<F>
where
    F: Fn() + Send + Sync + 'static,
{
    group: Arc<ThreadGroup>,
    parent: ThreadId,
    task: Arc<F>,
    last_start: Instant,
}

/// The implementation of supervised thread creation.
fn start_supervised<F>(
    group: Arc<ThreadGroup>,
    records: &mut MutexGuard<GroupRecords>,
    name: Option<String>,
    task: Arc<F>,
) -> io::Result<()>
where
    F: Fn() + Send + Sync + 'static,
{
    records.thread_count += 1;
    let handle = SupervisedHandle {
        group,
        parent: thread::current().id(),
        task,
        last_start: Instant::now(),
    };
    let result = thread::Builder::new()
        .name(name.unwrap_or_else(|| "anonymous".to_owned()))
        .spawn(move || {
            (handle.task)();
            drop(handle);
        });
    if result.is_err() {
        records.thread_count -= 1;
    }
    result.and(Ok(()))
}

impl<F> Drop for SupervisedHandle<F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let current_thread = thread::current();
        let thread_name = current_thread.name().unwrap_or("anonymous");

        // If we are being dropped in the parent thread, then the new
        // thread failed to start (on the OS level). In this case,
        // start_supervised handles any necessary clean-up. This is
        // important, since otherwise we would be locking the records
        // mutex twice from the same thread!
        if current_thread.id() == self.parent {
            return;
        }

        let panicked = thread::panicking();
        if panicked {
            error!("Supervised thread {} panicked", thread_name);
        }

        let mut records = self.group.records.lock().unwrap();
        if panicked && !records.shutting_down {
            let since_last_start = Instant::now().duration_since(self.last_start);
            if since_last_start < THREAD_RESPAWN_DELAY {
                // The delay may be interrupted by a notification on
                // the group's wakeup condition variable, which means
                // shutdown is occurring and there is no point in
                // waiting further. The records mutex is released for
                // the duration of the delay.
                let wait_for = THREAD_RESPAWN_DELAY - since_last_start;
                info!(
                    "Respawn of thread {} throttled: delayed by {} ms",
                    thread_name,
                    wait_for.as_millis()
                );
                records = self
                    .group
                    .shutdown_wakeup
                    .wait_timeout(records, wait_for)
                    .unwrap()
                    .0;
            }

            if !records.shutting_down {
                let result = start_supervised(
                    self.group.clone(),
                    &mut records,
                    Some(thread_name.to_owned()),
                    self.task.clone(),
                );
                if let Err(e) = result {
                    error!("Respawn of thread {} failed: {}", thread_name, e);
                }
            }
        }
        end_thread(&mut records, &self.group.shutdown_wakeup);
    }
}

/// Performs clean-up actions when a thread exits.
fn end_thread(records: &mut MutexGuard<GroupRecords>, shutdown_wakeup: &Condvar) {
    records.thread_count -= 1;
    if records.shutting_down && records.thread_count == 0 {
        shutdown_wakeup.notify_all();
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error type for [`ThreadGroup`] operations.
#[derive(Debug)]
pub enum Error {
    /// An OS-level error occurred during the creation of a thread.
    Io(io::Error),

    /// The [`ThreadGroup`] is shutting down.
    ShuttingDown,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => err.fmt(f),
            Self::ShuttingDown => f.write_str("thread group is shutting down"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn await_shutdown_works() {
        let exited = Arc::new(Mutex::new(0));
        let group = ThreadGroup::new();
        for _ in 0..2 {
            let exited_cloned = exited.clone();
            let group_cloned = group.clone();
            group
                .start_supervised(None, move || {
                    while group_cloned.sleep(Duration::from_secs(3600)) {}
                    *exited_cloned.lock().unwrap() += 1;
                })
                .unwrap();
        }
        group.shut_down();
        group.await_shutdown();
        assert_eq!(*exited.lock().unwrap(), 2);
        assert_eq!(group.thread_count(), 0);
    }

    #[test]
    fn shut_down_interrupts_sleep() {
        let group = ThreadGroup::new();
        let group_cloned = group.clone();
        let start = Instant::now();
        group
            .start_supervised(None, move || {
                group_cloned.sleep(Duration::from_secs(3600));
            })
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        group.shut_down();
        group.await_shutdown();
        assert!(Instant::now().duration_since(start) < Duration::from_secs(60));
    }

    #[test]
    fn sleep_runs_to_completion_without_shutdown() {
        let group = ThreadGroup::new();
        const SLEEP_DURATION: Duration = Duration::from_millis(50);
        let start = Instant::now();
        assert!(group.sleep(SLEEP_DURATION));
        assert!(Instant::now().duration_since(start) >= SLEEP_DURATION);
        group.shut_down();
        assert!(!group.sleep(SLEEP_DURATION));
    }

    #[test]
    fn supervised_threads_respawn_after_panic() {
        let times_executed = Arc::new(Mutex::new(0));
        let times_executed_cloned = times_executed.clone();
        let wakeup = Arc::new(Condvar::new());
        let wakeup_cloned = wakeup.clone();
        let group = ThreadGroup::new();
        group
            .start_supervised(None, move || {
                let mut times_executed = times_executed_cloned.lock().unwrap();
                *times_executed += 1;
                wakeup_cloned.notify_all();
                let first_run = *times_executed == 1;
                drop(times_executed);
                if first_run {
                    panic!("first run fails");
                }
            })
            .unwrap();
        let times_executed = times_executed.lock().unwrap();
        let times_executed = wakeup.wait_while(times_executed, |n| *n < 2).unwrap();
        assert_eq!(*times_executed, 2);
        drop(times_executed);
        group.shut_down();
        group.await_shutdown();
    }

    #[test]
    fn supervised_threads_do_not_respawn_after_returning() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_cloned = runs.clone();
        let group = ThreadGroup::new();
        group
            .start_supervised(None, move || {
                runs_cloned.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        group.shut_down();
        group.await_shutdown();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn thread_group_rejects_new_threads_after_shutdown() {
        let group = ThreadGroup::new();
        group.shut_down();
        assert!(matches!(
            group.start_supervised(None, || ()),
            Err(Error::ShuttingDown)
        ));
    }
}
