//! Reusable execution context
//! Core Principle: One persistent apartment thread, one callback in flight

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};

use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::error::{GroupPolicyError, Result};

use super::apartment::{panic_message, ApartmentGuard, ApartmentState};
use super::critical_section::CriticalPolicySection;
use super::location::PolicySection;

type Job = Box<dyn FnOnce(&Runtime) + Send>;

/// Long-lived worker that runs caller callbacks inside its apartment.
///
/// Submitting while a callback is outstanding fails with `PreviousTaskPending` instead of queuing.
pub struct GroupPolicyContext {
    sender: Option<mpsc::UnboundedSender<Job>>,
    busy: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    apartment: ApartmentState,
}

impl GroupPolicyContext {
    /// Create new context and wait until its worker is running
    pub fn new(apartment: ApartmentState) -> Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<()>>(1);

        let worker = thread::Builder::new()
            .name("gpo-context".to_string())
            .spawn(move || {
                let setup = ApartmentGuard::enter(apartment).and_then(|guard| {
                    let runtime = Builder::new_current_thread().enable_all().build()?;
                    Ok((guard, runtime))
                });

                let (_guard, runtime) = match setup {
                    Ok(parts) => {
                        let _ = ready_tx.send(Ok(()));
                        parts
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                while let Some(job) = receiver.blocking_recv() {
                    job(&runtime);
                }
                debug!("group policy context worker stopped");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = worker.join();
                return Err(err);
            }
            Err(_) => {
                let _ = worker.join();
                let reason = "context worker did not start".to_string();
                return Err(GroupPolicyError::WorkerFailed(reason));
            }
        }

        info!(?apartment, "group policy context started");
        Ok(GroupPolicyContext {
            sender: Some(sender),
            busy: Arc::new(AtomicBool::new(false)),
            worker: Some(worker),
            apartment,
        })
    }

    pub fn apartment(&self) -> ApartmentState {
        self.apartment
    }

    /// A callback is still running on the worker.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<()> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| GroupPolicyError::PreviousTaskPending)
    }

    fn submit(&self, job: Job) -> Result<()> {
        let sent = self.sender.as_ref().map(|s| s.send(job).is_ok()).unwrap_or(false);
        if sent {
            Ok(())
        } else {
            self.busy.store(false, Ordering::SeqCst);
            Err(GroupPolicyError::WorkerFailed("context worker is stopped".to_string()))
        }
    }

    /// Run `work` on the worker, optionally inside a critical policy section, and block for its
    /// result.
    pub fn execute<T, F>(&self, section: Option<PolicySection>, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.begin()?;
        let (tx, rx) = std_mpsc::sync_channel::<Result<T>>(1);
        let busy = self.busy.clone();

        self.submit(Box::new(move |_runtime| {
            let result = run_guarded(section, work);
            busy.store(false, Ordering::SeqCst);
            let _ = tx.send(result);
        }))?;

        rx.recv().unwrap_or_else(|_| Err(dropped_result()))
    }

    /// Async form of [`execute`](Self::execute). The future runs to completion on the worker's own
    /// runtime.
    ///
    /// When `cancel` fires first the caller gets `Cancelled`; the callback still finishes on the
    /// worker.
    pub async fn execute_async<T, F, Fut>(
        &self,
        section: Option<PolicySection>,
        work: F,
        cancel: Option<oneshot::Receiver<()>>,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        self.begin()?;
        let (tx, rx) = oneshot::channel::<Result<T>>();
        let busy = self.busy.clone();

        self.submit(Box::new(move |runtime| {
            let result = run_guarded(section, || runtime.block_on(work()));
            busy.store(false, Ordering::SeqCst);
            let _ = tx.send(result);
        }))?;

        let delivered = match cancel {
            Some(cancel) => {
                tokio::select! {
                    result = rx => result,
                    Ok(()) = cancel => {
                        debug!("context result suppressed by cancellation");
                        return Err(GroupPolicyError::Cancelled);
                    }
                }
            }
            None => rx.await,
        };

        delivered.unwrap_or_else(|_| Err(dropped_result()))
    }
}

fn dropped_result() -> GroupPolicyError {
    GroupPolicyError::WorkerFailed("context dropped the result".to_string())
}

/// Enter the section, run, and leave it again before the caller hears back.
fn run_guarded<T, F>(section: Option<PolicySection>, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let _section = match section {
        Some(section) => Some(CriticalPolicySection::enter(section)?),
        None => None,
    };
    panic::catch_unwind(AssertUnwindSafe(work))
        .unwrap_or_else(|payload| Err(GroupPolicyError::WorkerFailed(panic_message(payload))))
}

impl Drop for GroupPolicyContext {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("group policy context worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpo::apartment::{current_apartment, is_sta_thread};
    use std::time::Duration;

    #[test]
    fn callbacks_run_inside_the_apartment() {
        let context = GroupPolicyContext::new(ApartmentState::Sta).unwrap();
        assert!(context.execute(None, || Ok(is_sta_thread())).unwrap());

        let mta = GroupPolicyContext::new(ApartmentState::Mta).unwrap();
        let apartment = mta.execute(None, || Ok(current_apartment())).unwrap();
        assert_eq!(apartment, Some(ApartmentState::Mta));
    }

    #[test]
    fn errors_and_panics_reach_the_caller() {
        let context = GroupPolicyContext::new(ApartmentState::Sta).unwrap();
        assert!(matches!(
            context.execute::<(), _>(None, || Err(GroupPolicyError::NotAdministrator)),
            Err(GroupPolicyError::NotAdministrator)
        ));
        assert!(matches!(
            context.execute::<(), _>(Some(PolicySection::Machine), || panic!("callback failed")),
            Err(GroupPolicyError::WorkerFailed(_))
        ));
        // Still usable after a panic.
        assert_eq!(context.execute(None, || Ok(5)).unwrap(), 5);
        assert!(!context.is_busy());
    }

    #[tokio::test]
    async fn second_submission_fails_while_first_is_running() {
        let context = GroupPolicyContext::new(ApartmentState::Sta).unwrap();
        let (started_tx, started_rx) = std_mpsc::channel::<()>();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();

        let first = context.execute_async(
            None,
            move || async move {
                let _ = started_tx.send(());
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
                Ok::<_, GroupPolicyError>(1)
            },
            None,
        );
        tokio::pin!(first);

        // Drive the first submission far enough to enqueue it.
        tokio::select! {
            biased;
            _ = &mut first => panic!("first callback finished early"),
            _ = tokio::task::yield_now() => {}
        }
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(context.is_busy());
        assert!(matches!(
            context.execute(None, || Ok(2)),
            Err(GroupPolicyError::PreviousTaskPending)
        ));

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(context.execute(None, || Ok(3)).unwrap(), 3);
    }

    #[tokio::test]
    async fn cancellation_suppresses_delivery_but_work_completes() {
        let context = GroupPolicyContext::new(ApartmentState::Sta).unwrap();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (done_tx, done_rx) = std_mpsc::channel::<()>();

        cancel_tx.send(()).unwrap();
        let result = context
            .execute_async(
                None,
                move || async move {
                    std::thread::sleep(Duration::from_millis(20));
                    let _ = done_tx.send(());
                    Ok::<_, GroupPolicyError>(())
                },
                Some(cancel_rx),
            )
            .await;

        assert!(matches!(result, Err(GroupPolicyError::Cancelled)));
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[tokio::test]
    async fn dropped_cancel_sender_does_not_cancel() {
        let context = GroupPolicyContext::new(ApartmentState::Sta).unwrap();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        drop(cancel_tx);

        let work = || async { Ok::<_, GroupPolicyError>("done") };
        let value = context
            .execute_async(Some(PolicySection::User), work, Some(cancel_rx))
            .await
            .unwrap();
        assert_eq!(value, "done");
    }
}
