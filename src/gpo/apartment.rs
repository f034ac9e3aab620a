//! Apartment isolation
//! Core Principle: Spawn a worker, run the work, join, hand back the result

use std::cell::Cell;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, error};

use crate::error::{GroupPolicyError, Result};

/// COM threading model of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApartmentState {
    Sta,
    Mta,
}

thread_local! {
    static CURRENT_APARTMENT: Cell<Option<ApartmentState>> = Cell::new(None);
}

/// Apartment of the calling thread, if one was entered through [`ApartmentGuard`].
pub fn current_apartment() -> Option<ApartmentState> {
    CURRENT_APARTMENT.with(Cell::get)
}

pub fn is_sta_thread() -> bool {
    current_apartment() == Some(ApartmentState::Sta)
}

/// Holds the calling thread inside an apartment until dropped.
pub struct ApartmentGuard {
    previous: Option<ApartmentState>,
    #[cfg(windows)]
    com_initialized: bool,
    // Apartment membership is per-thread.
    _not_send: PhantomData<*const ()>,
}

impl ApartmentGuard {
    pub fn enter(state: ApartmentState) -> Result<Self> {
        #[cfg(windows)]
        let com_initialized = {
            let hr = super::native::co_initialize(state);
            if hr < 0 {
                return Err(GroupPolicyError::native("Cannot initialize the COM apartment.", hr));
            }
            true
        };

        let previous = CURRENT_APARTMENT.with(|cell| cell.replace(Some(state)));

        Ok(ApartmentGuard {
            previous,
            #[cfg(windows)]
            com_initialized,
            _not_send: PhantomData,
        })
    }
}

impl Drop for ApartmentGuard {
    fn drop(&mut self) {
        CURRENT_APARTMENT.with(|cell| cell.set(self.previous));

        #[cfg(windows)]
        if self.com_initialized {
            super::native::co_uninitialize();
        }
    }
}

/// Render a panic payload for [`GroupPolicyError::WorkerFailed`].
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Run `work` on a brand-new STA thread and block until it finishes.
///
/// Errors and panics raised on the worker come back to the caller as `Err`.
pub fn run_on_sta_thread<T, F>(name: &str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel::<Result<T>>(1);

    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let result = match ApartmentGuard::enter(ApartmentState::Sta) {
                Ok(_guard) => panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
                    Err(GroupPolicyError::WorkerFailed(panic_message(payload)))
                }),
                Err(err) => Err(err),
            };
            let _ = tx.send(result);
        })?;

    let received = rx.recv();

    if handle.join().is_err() {
        error!(thread = name, "STA worker did not exit cleanly");
    }

    match received {
        Ok(result) => {
            debug!(thread = name, ok = result.is_ok(), "STA worker finished");
            result
        }
        Err(_) => Err(GroupPolicyError::WorkerFailed(format!("{name} exited without a result"))),
    }
}
