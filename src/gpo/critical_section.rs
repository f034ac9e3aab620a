//! Critical policy section
//! Core Principle: Held for a scope, released on every exit path

use std::cell::Cell;
use std::marker::PhantomData;

use tracing::trace;

use crate::error::Result;

use super::location::PolicySection;

/// Exclusive hold on the machine or user policy section.
///
/// On Windows this is the systemwide section that blocks policy refresh. Elsewhere it is a
/// process-wide reentrant lock per section.
///
/// The native section is not reentrant across threads. A thread that already holds a section
/// should not wait for it again from a worker it spawned; check
/// [`is_held_on_current_thread`](Self::is_held_on_current_thread) first and skip the inner
/// bracket.
pub struct CriticalPolicySection {
    section: PolicySection,
    // Released on the entering thread, which keeps the per-thread hold count honest.
    _not_send: PhantomData<*const ()>,
    #[cfg(windows)]
    handle: isize,
    #[cfg(not(windows))]
    _guard: parking_lot::ReentrantMutexGuard<'static, ()>,
}

thread_local! {
    static HELD: Cell<[u32; 2]> = const { Cell::new([0, 0]) };
}

fn slot(section: PolicySection) -> usize {
    match section {
        PolicySection::Machine => 0,
        PolicySection::User => 1,
    }
}

fn adjust_held(section: PolicySection, entered: bool) {
    HELD.with(|held| {
        let mut counts = held.get();
        let count = &mut counts[slot(section)];
        *count = if entered { *count + 1 } else { count.saturating_sub(1) };
        held.set(counts);
    });
}

#[cfg(not(windows))]
static MACHINE_SECTION: parking_lot::ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());
#[cfg(not(windows))]
static USER_SECTION: parking_lot::ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());

impl CriticalPolicySection {
    #[cfg(windows)]
    pub fn enter(section: PolicySection) -> Result<Self> {
        let handle = super::native::enter_critical_policy_section(section.is_machine())?;
        adjust_held(section, true);
        trace!(%section, "entered critical policy section");
        Ok(CriticalPolicySection {
            section,
            _not_send: PhantomData,
            handle,
        })
    }

    #[cfg(not(windows))]
    pub fn enter(section: PolicySection) -> Result<Self> {
        let lock = match section {
            PolicySection::Machine => &MACHINE_SECTION,
            PolicySection::User => &USER_SECTION,
        };
        let guard = lock.lock();
        adjust_held(section, true);
        trace!(%section, "entered critical policy section");
        Ok(CriticalPolicySection {
            section,
            _not_send: PhantomData,
            _guard: guard,
        })
    }

    /// Enter only when asked to.
    pub fn enter_if(enabled: bool, section: PolicySection) -> Result<Option<Self>> {
        if enabled {
            Self::enter(section).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn section(&self) -> PolicySection {
        self.section
    }

    /// Whether this thread is inside `section` right now.
    pub fn is_held_on_current_thread(section: PolicySection) -> bool {
        HELD.with(|held| held.get()[slot(section)] > 0)
    }
}

impl Drop for CriticalPolicySection {
    fn drop(&mut self) {
        #[cfg(windows)]
        super::native::leave_critical_policy_section(self.handle);
        adjust_held(self.section, false);
        trace!(section = %self.section, "left critical policy section");
    }
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn section_is_exclusive_across_threads() {
        let held = CriticalPolicySection::enter(PolicySection::Machine).unwrap();
        let entered = Arc::new(AtomicBool::new(false));

        let flag = entered.clone();
        let waiter = std::thread::spawn(move || {
            let _section = CriticalPolicySection::enter(PolicySection::Machine).unwrap();
            flag.store(true, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!entered.load(Ordering::SeqCst));
        drop(held);
        waiter.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[test]
    fn same_thread_may_reenter() {
        let _outer = CriticalPolicySection::enter(PolicySection::User).unwrap();
        let inner = CriticalPolicySection::enter_if(true, PolicySection::User).unwrap();
        assert_eq!(inner.map(|s| s.section()), Some(PolicySection::User));
        assert!(CriticalPolicySection::enter_if(false, PolicySection::User).unwrap().is_none());
    }

    #[test]
    fn hold_is_tracked_per_thread_and_section() {
        assert!(!CriticalPolicySection::is_held_on_current_thread(PolicySection::Machine));
        let outer = CriticalPolicySection::enter(PolicySection::Machine).unwrap();
        let inner = CriticalPolicySection::enter(PolicySection::Machine).unwrap();
        assert!(CriticalPolicySection::is_held_on_current_thread(PolicySection::Machine));
        assert!(!CriticalPolicySection::is_held_on_current_thread(PolicySection::User));
        let elsewhere = std::thread::spawn(|| {
            CriticalPolicySection::is_held_on_current_thread(PolicySection::Machine)
        });
        assert!(!elsewhere.join().unwrap());

        drop(inner);
        assert!(CriticalPolicySection::is_held_on_current_thread(PolicySection::Machine));
        drop(outer);
        assert!(!CriticalPolicySection::is_held_on_current_thread(PolicySection::Machine));
    }
}
