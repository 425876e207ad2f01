use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use super::VisualSurface;
use crate::exam::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    /// Routine progress between checks
    Status,
    /// One or more sessions are bookable
    Alert,
    /// The monitor has stopped checking and needs the operator
    Degraded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BannerLine {
    pub description: String,
    /// Shown only for last-spots sessions
    pub note: Option<String>,
    pub link: Option<String>,
}

/// Content of the top-anchored overlay
#[derive(Debug, Clone, PartialEq)]
pub struct Banner {
    pub kind: BannerKind,
    pub headline: String,
    pub lines: Vec<BannerLine>,
    pub status_line: String,
    /// Draw with the warning accent (countdown about to expire)
    pub emphasis: bool,
}

impl Banner {
    pub fn status(headline: impl Into<String>, status_line: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Status,
            headline: headline.into(),
            lines: Vec::new(),
            status_line: status_line.into(),
            emphasis: false,
        }
    }

    pub fn alert(available: &[SessionRecord]) -> Self {
        let count = available.len();
        let lines = available
            .iter()
            .map(|session| BannerLine {
                description: session.description.clone(),
                note: session.has_last_spots().then(|| session.note.clone()),
                link: session.purchase_url.clone(),
            })
            .collect();

        Self {
            kind: BannerKind::Alert,
            headline: format!(
                "{} exam session{} available!",
                count,
                if count == 1 { "" } else { "s" }
            ),
            lines,
            status_line: "Automatic re-checking has stopped.".to_string(),
            emphasis: true,
        }
    }
}

/// In-memory overlay the terminal UI draws from.
///
/// Rendering replaces the previous banner, so there is never more than one
/// instance on screen.
#[derive(Debug, Default)]
pub struct Overlay {
    layers: Vec<Banner>,
}

impl Overlay {
    pub fn current(&self) -> Option<&Banner> {
        self.layers.last()
    }

    pub fn instance_count(&self) -> usize {
        self.layers.len()
    }
}

impl VisualSurface for Overlay {
    fn render(&mut self, banner: Banner) -> Result<()> {
        self.remove();
        self.layers.push(banner);
        Ok(())
    }

    fn remove(&mut self) {
        self.layers.clear();
    }
}

/// Overlay shared between the controller (writer) and the UI (reader)
pub type SharedOverlay = Rc<RefCell<Overlay>>;

impl VisualSurface for SharedOverlay {
    fn render(&mut self, banner: Banner) -> Result<()> {
        self.borrow_mut().render(banner)
    }

    fn remove(&mut self) {
        self.borrow_mut().remove();
    }
}

/// Surface for headless runs: logs whenever the banner meaningfully changes
#[derive(Debug, Default)]
pub struct LogSurface {
    last: Option<(BannerKind, String)>,
}

impl VisualSurface for LogSurface {
    fn render(&mut self, banner: Banner) -> Result<()> {
        let key = (banner.kind, banner.headline.clone());
        if self.last.as_ref() == Some(&key) {
            return Ok(());
        }

        match banner.kind {
            BannerKind::Alert => {
                tracing::warn!("{}", banner.headline);
                for line in &banner.lines {
                    let note = line.note.as_deref().map(|n| format!(" [{}]", n));
                    let link = line.link.as_deref().map(|l| format!(" -> {}", l));
                    let (note, link) = (note.unwrap_or_default(), link.unwrap_or_default());
                    tracing::warn!("  {}{}{}", line.description, note, link);
                }
            }
            BannerKind::Degraded => tracing::warn!("{} ({})", banner.headline, banner.status_line),
            BannerKind::Status => tracing::info!("{}", banner.headline),
        }
        tracing::info!("{}", banner.status_line);

        self.last = Some(key);
        Ok(())
    }

    fn remove(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rerender_never_stacks_banners() {
        let mut overlay = Overlay::default();
        overlay.render(Banner::status("first", "")).unwrap();
        overlay.render(Banner::status("second", "")).unwrap();

        assert_eq!(overlay.instance_count(), 1);
        assert_eq!(overlay.current().unwrap().headline, "second");

        overlay.remove();
        assert!(overlay.current().is_none());
    }

    #[test]
    fn test_shared_overlay_writes_through() {
        let shared: SharedOverlay = Rc::new(RefCell::new(Overlay::default()));
        let mut writer = shared.clone();
        writer.render(Banner::status("checking", "")).unwrap();
        writer.render(Banner::status("checking", "")).unwrap();

        assert_eq!(shared.borrow().instance_count(), 1);
    }

    #[test]
    fn test_alert_banner_lists_sessions() {
        let sessions = vec![
            SessionRecord::new(
                "Lun 10 ore 10:00".into(),
                "ultimi 2 posti".into(),
                Some("https://x/1".into()),
            ),
            SessionRecord::new("Lun 10 ore 15:00".into(), "".into(), None),
        ];
        let banner = Banner::alert(&sessions);

        assert_eq!(banner.kind, BannerKind::Alert);
        assert_eq!(banner.headline, "2 exam sessions available!");
        assert_eq!(banner.lines[0].note.as_deref(), Some("ultimi 2 posti"));
        assert_eq!(banner.lines[0].link.as_deref(), Some("https://x/1"));
        assert!(banner.lines[1].note.is_none());
        assert!(banner.lines[1].link.is_none());
        assert!(banner.status_line.contains("stopped"));
    }
}
