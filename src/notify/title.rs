use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::terminal::SetTitle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::TitleSurface;

/// Alternates between the alert text and the title seen before the alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleToggle {
    alert: String,
    original: String,
    showing_alert: bool,
}

impl TitleToggle {
    /// Starts out showing the alert
    pub fn new(alert: impl Into<String>, original: impl Into<String>) -> Self {
        Self {
            alert: alert.into(),
            original: original.into(),
            showing_alert: true,
        }
    }

    pub fn current(&self) -> &str {
        if self.showing_alert {
            &self.alert
        } else {
            &self.original
        }
    }

    pub fn flip(&mut self) -> &str {
        self.showing_alert = !self.showing_alert;
        self.current()
    }
}

/// Flashes the terminal window title via escape sequences.
///
/// Nothing is written until the first flash, so an idle instance never
/// touches stdout.
pub struct TerminalTitle {
    original: String,
    flasher: Option<JoinHandle<()>>,
}

impl TerminalTitle {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            flasher: None,
        }
    }

    /// Put the idle title up; only for hosts that own the terminal
    pub fn show_idle(&self) {
        if let Err(e) = set_title(&self.original) {
            tracing::debug!("Could not set terminal title: {}", e);
        }
    }
}

fn set_title(title: &str) -> io::Result<()> {
    crossterm::execute!(io::stdout(), SetTitle(title))
}

impl TitleSurface for TerminalTitle {
    fn start_flashing(&mut self, alert: &str, period: Duration) -> Result<()> {
        self.stop();

        let mut toggle = TitleToggle::new(alert, self.original.clone());
        set_title(toggle.current()).context("Failed to set terminal title")?;

        self.flasher = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if let Err(e) = set_title(toggle.flip()) {
                    tracing::warn!("Title flasher stopped: {}", e);
                    break;
                }
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(handle) = self.flasher.take() {
            handle.abort();
            let _ = set_title(&self.original);
        }
    }
}

impl Drop for TerminalTitle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_alternates() {
        let mut toggle = TitleToggle::new("ALERT", "slot-sentry");
        assert_eq!(toggle.current(), "ALERT");
        assert_eq!(toggle.flip(), "slot-sentry");
        assert_eq!(toggle.flip(), "ALERT");
        assert_eq!(toggle.flip(), "slot-sentry");
    }
}
