use crossterm::event::KeyEvent;

use crate::controller::{FetchDone, TimerFired};

/// Actions that can be dispatched through the application
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// Left click at a terminal cell
    Click { column: u16, row: u16 },
    /// One of the controller's timers went off
    Timer(TimerFired),
    /// A snapshot fetch started by the controller finished
    Fetched(FetchDone),
    /// Cancel timers and restart checking (not while alerting)
    ForceRefresh,
    /// Restart the monitor from scratch, leaving an alert if one is latched
    Reload,
    /// Copy the first available purchase link to the clipboard
    CopyPurchaseLink,
    /// Request to quit the application
    Quit,
}
