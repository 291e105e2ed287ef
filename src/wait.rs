use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::HarvestError;

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), HarvestError> {
        if self.is_cancelled() {
            Err(HarvestError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn sleep(&self, duration: Duration) -> Result<(), HarvestError> {
        const SLICE: Duration = Duration::from_millis(100);
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(SLICE));
        }
    }
}

pub fn poll_until<T, F>(
    bound: Duration,
    interval: Duration,
    cancel: &CancelToken,
    mut attempt: F,
) -> Result<Option<T>, HarvestError>
where
    F: FnMut() -> Result<Option<T>, HarvestError>,
{
    let deadline = Instant::now() + bound;
    loop {
        cancel.check()?;
        if let Some(value) = attempt()? {
            return Ok(Some(value));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        cancel.sleep((deadline - now).min(interval))?;
    }
}
