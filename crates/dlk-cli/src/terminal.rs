//! The terminal as a page.
//!
//! Navigating prints the deep link for the user to open on the wallet
//! device. Each redirect URL pasted back on stdin becomes a location change.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use dlk_core::page::origin_of;
use dlk_core::{DeeplinkError, PageEvent, PageHost};

const EVENT_CAPACITY: usize = 16;

pub struct TerminalPage {
    location: Mutex<String>,
    out: Mutex<Box<dyn Write + Send>>,
    events: broadcast::Sender<PageEvent>,
}

impl TerminalPage {
    /// Page at `location` that prints deep links to stderr.
    pub fn new(location: impl Into<String>) -> Self {
        Self::with_writer(location, Box::new(std::io::stderr()))
    }

    pub fn with_writer(location: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            location: Mutex::new(location.into()),
            out: Mutex::new(out),
            events,
        }
    }

    /// Treat `line` as the URL the wallet redirected to.
    pub fn deliver(&self, line: &str) -> Result<(), DeeplinkError> {
        let line = line.trim();
        let url = url::Url::parse(line)
            .map_err(|e| DeeplinkError::Navigation(format!("not a URL: {e}")))?;
        let location = url.to_string();
        *self.location.lock() = location.clone();
        let _ = self.events.send(PageEvent::LocationChanged(location));
        Ok(())
    }

    /// Feed stdin lines into the page until stdin closes.
    pub fn spawn_stdin_reader(self: &Arc<Self>) -> JoinHandle<()> {
        let page = Arc::clone(self);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        if let Err(e) = page.deliver(&line) {
                            page.print(&format!("Ignoring input: {e}"));
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "failed to read stdin");
                        break;
                    }
                }
            }
            debug!("stdin closed");
        })
    }

    fn print(&self, text: &str) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            warn!(error = %e, "failed to write to terminal");
        }
    }
}

impl PageHost for TerminalPage {
    fn origin(&self) -> String {
        origin_of(&self.location.lock())
    }

    fn location(&self) -> String {
        self.location.lock().clone()
    }

    fn navigate(&self, url: &str) -> Result<(), DeeplinkError> {
        let mut out = self.out.lock();
        writeln!(out, "\nOpen this link with your wallet:\n\n  {url}\n")
            .and_then(|()| writeln!(out, "Then paste the URL the wallet redirects to and press Enter:"))
            .and_then(|()| out.flush())
            .map_err(|e| DeeplinkError::Navigation(e.to_string()))
    }

    fn replace_location(&self, url: &str) -> Result<(), DeeplinkError> {
        *self.location.lock() = url.to_string();
        Ok(())
    }

    fn close(&self) -> Result<(), DeeplinkError> {
        // Nothing to close; the process exits when the command finishes
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }
}
