use std::time::Duration;

use crate::notify::{Banner, BannerKind};

/// Countdown values at or below this are drawn with emphasis
pub const LOW_COUNTDOWN_SECS: u64 = 10;

/// What the status banner should describe
#[derive(Debug, Clone, PartialEq)]
pub enum StatusView {
    Bootstrapping {
        attempt: u32,
        max_attempts: u32,
    },
    Waiting {
        cycle: u64,
        total: usize,
        sold_out: usize,
        last_error: Option<String>,
    },
    Degraded {
        attempts: u32,
    },
}

/// Non-alerting status display: time since the last check and time to the
/// next one, each advanced by its own once-a-second ticker.
#[derive(Debug, Clone)]
pub struct StatusRenderer {
    interval_secs: u64,
    elapsed_secs: u64,
    countdown_secs: Option<u64>,
}

impl StatusRenderer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_secs: interval.as_secs(),
            elapsed_secs: 0,
            countdown_secs: None,
        }
    }

    /// Fresh counters after a completed check
    pub fn reset(&mut self) {
        self.elapsed_secs = 0;
        self.countdown_secs = Some(self.interval_secs);
    }

    pub fn tick_elapsed(&mut self) {
        self.elapsed_secs += 1;
    }

    pub fn tick_countdown(&mut self) {
        if let Some(secs) = self.countdown_secs.as_mut() {
            *secs = secs.saturating_sub(1);
        }
    }

    /// Hide the countdown; no further check is coming
    pub fn freeze(&mut self) {
        self.countdown_secs = None;
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn countdown_secs(&self) -> Option<u64> {
        self.countdown_secs
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self.countdown_secs, Some(secs) if secs <= LOW_COUNTDOWN_SECS)
    }

    pub fn banner(&self, view: &StatusView) -> Banner {
        match view {
            StatusView::Bootstrapping {
                attempt,
                max_attempts,
            } => Banner::status(
                "Waiting for the session list to load",
                format!("Attempt {}/{}", attempt, max_attempts),
            ),
            StatusView::Waiting {
                cycle,
                total,
                sold_out,
                last_error,
            } => {
                let headline = match last_error {
                    Some(err) => format!("Last check failed: {}", err),
                    None => format!("No bookable sessions ({}/{} sold out)", sold_out, total),
                };
                let mut status_line = format!(
                    "Check #{} · last check {} ago",
                    cycle,
                    format_elapsed(self.elapsed_secs)
                );
                if let Some(secs) = self.countdown_secs {
                    status_line.push_str(&format!(" · next check in {}", format_elapsed(secs)));
                }

                let mut banner = Banner::status(headline, status_line);
                banner.emphasis = self.is_urgent();
                banner
            }
            StatusView::Degraded { attempts } => Banner {
                kind: BannerKind::Degraded,
                headline: format!("No session data after {} attempts", attempts),
                lines: Vec::new(),
                status_line: "Automatic checks suspended. Force a refresh to try again."
                    .to_string(),
                emphasis: false,
            },
        }
    }
}

/// `42s` below a minute, `3m 05s` from there on
pub fn format_elapsed(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}
