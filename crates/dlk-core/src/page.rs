//! The page a communicator lives in.
//!
//! [`PageHost`] is the narrow slice of a browser tab the engine needs:
//! where the tab is, a way to navigate, and the events that can carry a
//! wallet response into it.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, Notify};
use url::Url;

use crate::errors::DeeplinkError;

const EVENT_CAPACITY: usize = 32;

/// Events delivered to a page.
#[derive(Clone, Debug, PartialEq)]
pub enum PageEvent {
    /// The location changed without a reload (fragment or history update)
    LocationChanged(String),
    /// A window message
    Message { origin: String, data: Value },
}

/// A browser tab as seen by the communicator.
pub trait PageHost: Send + Sync {
    /// Serialized origin, e.g. `https://dapp.example`.
    fn origin(&self) -> String;

    /// Full current location.
    fn location(&self) -> String;

    /// Navigate to `url`. For deep links this hands control to the wallet.
    fn navigate(&self, url: &str) -> Result<(), DeeplinkError>;

    /// Replace the visible location without navigating or firing events.
    fn replace_location(&self, url: &str) -> Result<(), DeeplinkError>;

    /// Close the tab. May be refused by the host.
    fn close(&self) -> Result<(), DeeplinkError>;

    fn subscribe(&self) -> broadcast::Receiver<PageEvent>;
}

/// Origin of `location`, or an empty string when it has none.
pub fn origin_of(location: &str) -> String {
    Url::parse(location)
        .map(|url| url.origin().ascii_serialization())
        .unwrap_or_default()
}

// ============================================================================
// Simulated Tab
// ============================================================================

/// In-process tab for tests and headless drivers.
pub struct SimulatedTab {
    location: Mutex<String>,
    navigations: Mutex<Vec<String>>,
    navigated: Notify,
    events: broadcast::Sender<PageEvent>,
    closed: AtomicBool,
    refuse_close: AtomicBool,
    fail_navigation: AtomicBool,
}

impl SimulatedTab {
    /// Open a tab at `location`.
    pub fn new(location: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            location: Mutex::new(location.into()),
            navigations: Mutex::new(Vec::new()),
            navigated: Notify::new(),
            events,
            closed: AtomicBool::new(false),
            refuse_close: AtomicBool::new(false),
            fail_navigation: AtomicBool::new(false),
        }
    }

    /// Make `close()` fail, like a tab the script did not open.
    pub fn with_refused_close(self) -> Self {
        self.refuse_close.store(true, Ordering::Relaxed);
        self
    }

    /// Make every `navigate()` fail.
    pub fn set_fail_navigation(&self, fail: bool) {
        self.fail_navigation.store(fail, Ordering::Relaxed);
    }

    /// The wallet redirected back into this tab.
    pub fn deliver_redirect(&self, url: impl Into<String>) {
        let url = url.into();
        *self.location.lock() = url.clone();
        let _ = self.events.send(PageEvent::LocationChanged(url));
    }

    /// Post a window message into this tab.
    pub fn post_message(&self, origin: impl Into<String>, data: Value) {
        let _ = self.events.send(PageEvent::Message {
            origin: origin.into(),
            data,
        });
    }

    /// Every URL this tab navigated to, oldest first.
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().clone()
    }

    pub fn last_navigation(&self) -> Option<String> {
        self.navigations.lock().last().cloned()
    }

    /// Wait until this tab has navigated at least `count` times and return
    /// the `count`-th URL.
    pub async fn wait_for_navigation(&self, count: usize) -> String {
        let index = count.saturating_sub(1);
        loop {
            let notified = self.navigated.notified();
            if let Some(url) = self.navigations.lock().get(index) {
                return url.clone();
            }
            notified.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl PageHost for SimulatedTab {
    fn origin(&self) -> String {
        origin_of(&self.location.lock())
    }

    fn location(&self) -> String {
        self.location.lock().clone()
    }

    fn navigate(&self, url: &str) -> Result<(), DeeplinkError> {
        if self.fail_navigation.load(Ordering::Relaxed) {
            return Err(DeeplinkError::Navigation(format!("blocked: {url}")));
        }
        self.navigations.lock().push(url.to_string());
        self.navigated.notify_waiters();
        Ok(())
    }

    fn replace_location(&self, url: &str) -> Result<(), DeeplinkError> {
        *self.location.lock() = url.to_string();
        Ok(())
    }

    fn close(&self) -> Result<(), DeeplinkError> {
        if self.refuse_close.load(Ordering::Relaxed) {
            return Err(DeeplinkError::Navigation(
                "scripts may not close windows they did not open".to_string(),
            ));
        }
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("https://dapp.example/app?x=1#frag"),
            "https://dapp.example"
        );
        assert_eq!(origin_of("http://localhost:3000/"), "http://localhost:3000");
        assert_eq!(origin_of("garbage"), "");
    }

    #[tokio::test]
    async fn test_redirect_fires_location_event() {
        let tab = SimulatedTab::new("https://dapp.example/app");
        let mut events = tab.subscribe();

        tab.deliver_redirect("https://dapp.example/app#phantom_response?x=1");
        assert_eq!(
            events.recv().await.unwrap(),
            PageEvent::LocationChanged("https://dapp.example/app#phantom_response?x=1".to_string())
        );
        assert_eq!(tab.location(), "https://dapp.example/app#phantom_response?x=1");
    }

    #[tokio::test]
    async fn test_navigation_is_recorded() {
        let tab = SimulatedTab::new("https://dapp.example/");
        tab.navigate("https://wallet.example/connect").unwrap();
        assert_eq!(tab.wait_for_navigation(1).await, "https://wallet.example/connect");

        tab.set_fail_navigation(true);
        assert!(matches!(
            tab.navigate("https://wallet.example/x"),
            Err(DeeplinkError::Navigation(_))
        ));
        assert_eq!(tab.navigations().len(), 1);
    }

    #[test]
    fn test_refused_close() {
        let tab = SimulatedTab::new("https://dapp.example/").with_refused_close();
        assert!(tab.close().is_err());
        assert!(!tab.is_closed());
    }
}
