use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::tokens::ColorScheme;

/// The platform's color-scheme preference and its change notifications
#[derive(Debug, Clone)]
pub struct SystemPreference {
    tx: Arc<watch::Sender<ColorScheme>>,
}

impl SystemPreference {
    pub fn new(initial: ColorScheme) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Read `LMS_COLOR_SCHEME` (light|dark); light when unset
    pub fn from_env() -> Self {
        let scheme = match std::env::var("LMS_COLOR_SCHEME").as_deref() {
            Ok("dark") => ColorScheme::Dark,
            _ => ColorScheme::Light,
        };
        Self::new(scheme)
    }

    pub fn current(&self) -> ColorScheme {
        *self.tx.borrow()
    }

    /// Platform notification: the preference flipped
    pub fn set(&self, scheme: ColorScheme) {
        self.tx.send_if_modified(|current| {
            if *current == scheme {
                return false;
            }
            *current = scheme;
            true
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ColorScheme> {
        self.tx.subscribe()
    }

    /// Live listeners; used to check nothing leaks across remounts
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SystemPreference {
    fn default() -> Self {
        Self::new(ColorScheme::Light)
    }
}

/// Keeps a preference listener alive; dropping it releases the listener
#[derive(Debug)]
pub struct PreferenceSubscription {
    task: JoinHandle<()>,
}

impl PreferenceSubscription {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }
}

impl Drop for PreferenceSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
