// Uniqueness - At most one live instance of a process-wide object
//
// The entry point owns the one GraphicsContext and hands out references;
// this check only catches mistakes. Debug builds count live instances,
// release builds compile the check away.

use super::Error;
use std::sync::atomic::{AtomicUsize, Ordering};

pub trait UniquenessCheck {
    type Token;

    fn acquire(name: &'static str) -> Result<Self::Token, Error>;
}

/// Release builds: no bookkeeping.
pub struct Unchecked;

impl UniquenessCheck for Unchecked {
    type Token = ();

    fn acquire(_name: &'static str) -> Result<(), Error> {
        Ok(())
    }
}

/// Debug builds: a live-instance counter.
pub struct Counted;

static LIVE_CONTEXTS: AtomicUsize = AtomicUsize::new(0);

impl Counted {
    pub fn acquire_in(counter: &'static AtomicUsize, name: &'static str) -> Result<CountedToken, Error> {
        if counter
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::error!("{} has already been created once!!", name);
            return Err(Error::AlreadyCreated(name));
        }
        Ok(CountedToken { counter })
    }
}

impl UniquenessCheck for Counted {
    type Token = CountedToken;

    fn acquire(name: &'static str) -> Result<CountedToken, Error> {
        Self::acquire_in(&LIVE_CONTEXTS, name)
    }
}

/// Frees the slot when dropped.
#[derive(Debug)]
pub struct CountedToken {
    counter: &'static AtomicUsize,
}

impl Drop for CountedToken {
    fn drop(&mut self) {
        self.counter.store(0, Ordering::Release);
    }
}

#[cfg(debug_assertions)]
pub type ActiveCheck = Counted;

#[cfg(not(debug_assertions))]
pub type ActiveCheck = Unchecked;
