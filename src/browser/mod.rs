pub mod chromium;

use std::ops::{Deref, DerefMut};
use std::path::Path;

use tracing::warn;

use crate::error::HarvestError;
use crate::locator::{ElementHandle, Locator};

pub trait BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<(), HarvestError>;

    fn refresh(&mut self) -> Result<(), HarvestError>;

    fn find_candidates(
        &mut self,
        locator: &Locator,
        scope: Option<ElementHandle>,
    ) -> Result<Vec<ElementHandle>, HarvestError>;

    fn is_visible(&mut self, element: ElementHandle) -> Result<bool, HarvestError>;

    fn is_enabled(&mut self, element: ElementHandle) -> Result<bool, HarvestError>;

    fn click(&mut self, element: ElementHandle) -> Result<(), HarvestError>;

    fn read_attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, HarvestError>;

    fn text(&mut self, element: ElementHandle) -> Result<String, HarvestError>;

    fn interactive_elements(
        &mut self,
        scope: Option<ElementHandle>,
    ) -> Result<Vec<ElementHandle>, HarvestError>;

    fn close(&mut self) -> Result<(), HarvestError>;
}

pub trait BrowserLauncher {
    type Session: BrowserSession;

    fn launch(&self, download_dir: &Path) -> Result<Self::Session, HarvestError>;

    fn open_sessions(&self) -> usize;
}

pub struct SessionGuard<S: BrowserSession> {
    session: Option<S>,
}

impl<S: BrowserSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn release(mut self) -> Result<(), HarvestError> {
        match self.session.take() {
            Some(mut session) => session.close(),
            None => Ok(()),
        }
    }
}

impl<S: BrowserSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        // Only `release` and `drop` take the session and both consume the guard.
        self.session.as_ref().expect("session held until release")
    }
}

impl<S: BrowserSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session.as_mut().expect("session held until release")
    }
}

impl<S: BrowserSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.close() {
                warn!(error = %err, "failed to close browser session");
            }
        }
    }
}
