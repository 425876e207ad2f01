//! Desktop toast notifications.
//!
//! Uses `notify-send` on Linux and `osascript` on macOS. The helper process
//! is spawned and left to the runtime to reap, so an alert never waits on
//! the desktop environment.

use anyhow::{Context, Result};
use tokio::process::Command;

use super::DesktopNotifier;

/// Toast bodies longer than this are cut; most daemons truncate anyway
const MAX_BODY_CHARS: usize = 256;

pub struct SystemNotifier;

impl DesktopNotifier for SystemNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        let body = truncate(body, MAX_BODY_CHARS);
        if cfg!(target_os = "macos") {
            send_macos_notification(title, &body)
        } else {
            send_linux_notification(title, &body)
        }
    }
}

fn send_linux_notification(title: &str, body: &str) -> Result<()> {
    Command::new("notify-send")
        .arg("--urgency=critical")
        .arg("--app-name=slot-sentry")
        .arg(title)
        .arg(body)
        .spawn()
        .context("Failed to run notify-send")?;
    Ok(())
}

fn send_macos_notification(title: &str, body: &str) -> Result<()> {
    let script = format!(
        r#"display notification "{}" with title "{}" sound name "Glass""#,
        escape_applescript_string(body),
        escape_applescript_string(title)
    );

    Command::new("osascript")
        .arg("-e")
        .arg(&script)
        .spawn()
        .context("Failed to run osascript")?;
    Ok(())
}

fn escape_applescript_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
