mod banner;
mod desktop;
mod title;
mod tone;

pub use banner::{Banner, BannerKind, LogSurface, Overlay, SharedOverlay};
pub use desktop::SystemNotifier;
pub use title::TerminalTitle;
pub use tone::{play_alert_sequence, AlertSequence, RodioToneSynth, Tone};

use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

use crate::config::AlertConfig;
use crate::error::{Channel, MonitorError};
use crate::exam::SessionRecord;

/// Where banners and status lines are drawn
pub trait VisualSurface {
    /// Replace whatever is currently shown with `banner`
    fn render(&mut self, banner: Banner) -> Result<()>;
    fn remove(&mut self);
}

/// Produces a single audible tone; may refuse (no device, blocked output)
pub trait ToneSynth {
    fn play(&self, tone: Tone) -> Result<()>;
}

/// The display title of the hosting window
pub trait TitleSurface {
    /// Toggle between `alert` and the original title every `period` until stopped
    fn start_flashing(&mut self, alert: &str, period: Duration) -> Result<()>;
    fn stop(&mut self);
}

pub trait DesktopNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Which alert channels are switched on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertChannels {
    pub visual: bool,
    pub sound: bool,
    pub title: bool,
    pub desktop: bool,
}

impl From<&AlertConfig> for AlertChannels {
    fn from(config: &AlertConfig) -> Self {
        Self {
            visual: config.visual,
            sound: config.sound,
            title: config.title_flash,
            desktop: config.desktop,
        }
    }
}

/// Outcome of one dispatch, per channel
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: Vec<Channel>,
    pub failed: Vec<MonitorError>,
}

impl DispatchReport {
    pub fn has_delivered(&self, channel: Channel) -> bool {
        self.delivered.contains(&channel)
    }

    pub fn has_failed(&self, channel: Channel) -> bool {
        self.failed
            .iter()
            .any(|e| matches!(e, MonitorError::Channel { channel: c, .. } if *c == channel))
    }

    fn record(&mut self, channel: Channel, outcome: Result<()>) {
        match outcome {
            Ok(()) => self.delivered.push(channel),
            Err(e) => {
                let failure = MonitorError::Channel {
                    channel,
                    reason: format!("{:#}", e),
                };
                error!("{}", failure);
                self.failed.push(failure);
            }
        }
    }
}

/// Fires every enabled alert channel once availability is detected.
///
/// Channels are independent: one failing is logged and the rest still run.
pub struct NotificationDispatcher {
    channels: AlertChannels,
    sequence: AlertSequence,
    flash_period: Duration,
    alert_title: String,
    tone: Box<dyn ToneSynth>,
    title: Box<dyn TitleSurface>,
    desktop: Box<dyn DesktopNotifier>,
}

impl NotificationDispatcher {
    pub fn new(
        config: &AlertConfig,
        tone: Box<dyn ToneSynth>,
        title: Box<dyn TitleSurface>,
        desktop: Box<dyn DesktopNotifier>,
    ) -> Self {
        Self {
            channels: AlertChannels::from(config),
            sequence: AlertSequence::from_config(config),
            flash_period: Duration::from_millis(config.title_flash_ms),
            alert_title: config.alert_title.clone(),
            tone,
            title,
            desktop,
        }
    }

    pub fn channels(&self) -> AlertChannels {
        self.channels
    }

    pub fn dispatch(
        &mut self,
        available: &[SessionRecord],
        surface: &mut dyn VisualSurface,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        if self.channels.visual {
            report.record(Channel::Visual, surface.render(Banner::alert(available)));
        }

        if self.channels.sound {
            report.record(
                Channel::Audio,
                play_alert_sequence(self.tone.as_ref(), &self.sequence),
            );
        }

        if self.channels.title {
            report.record(
                Channel::Title,
                self.title.start_flashing(&self.alert_title, self.flash_period),
            );
        }

        if self.channels.desktop {
            let headline = format!("{}: {} available", self.alert_title, available.len());
            let body = available
                .first()
                .map(|s| s.description.as_str())
                .unwrap_or("Slot available!");
            report.record(Channel::Desktop, self.desktop.notify(&headline, body));
        }

        info!(
            "Alert dispatched on {} channel(s), {} failed",
            report.delivered.len(),
            report.failed.len()
        );
        report
    }

    /// Undo the lasting effects of an alert before the monitor restarts
    pub fn stand_down(&mut self) {
        self.title.stop();
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    pub struct Calls {
        pub tones: Vec<Tone>,
        pub titles: Vec<String>,
        pub title_stops: usize,
        pub toasts: Vec<(String, String)>,
    }

    pub type SharedCalls = Rc<RefCell<Calls>>;

    pub struct FakeTone {
        pub calls: SharedCalls,
        pub fail: bool,
    }

    impl ToneSynth for FakeTone {
        fn play(&self, tone: Tone) -> Result<()> {
            if self.fail {
                return Err(anyhow!("audio blocked until user interaction"));
            }
            self.calls.borrow_mut().tones.push(tone);
            Ok(())
        }
    }

    pub struct FakeTitle {
        pub calls: SharedCalls,
    }

    impl TitleSurface for FakeTitle {
        fn start_flashing(&mut self, alert: &str, _period: Duration) -> Result<()> {
            self.calls.borrow_mut().titles.push(alert.to_string());
            Ok(())
        }

        fn stop(&mut self) {
            self.calls.borrow_mut().title_stops += 1;
        }
    }

    pub struct FakeDesktop {
        pub calls: SharedCalls,
    }

    impl DesktopNotifier for FakeDesktop {
        fn notify(&self, title: &str, body: &str) -> Result<()> {
            self.calls
                .borrow_mut()
                .toasts
                .push((title.to_string(), body.to_string()));
            Ok(())
        }
    }

    pub struct BrokenSurface;

    impl VisualSurface for BrokenSurface {
        fn render(&mut self, _banner: Banner) -> Result<()> {
            Err(anyhow!("surface detached"))
        }

        fn remove(&mut self) {}
    }

    pub fn dispatcher(
        config: &AlertConfig,
        calls: &SharedCalls,
        tone_fails: bool,
    ) -> NotificationDispatcher {
        NotificationDispatcher::new(
            config,
            Box::new(FakeTone {
                calls: calls.clone(),
                fail: tone_fails,
            }),
            Box::new(FakeTitle {
                calls: calls.clone(),
            }),
            Box::new(FakeDesktop {
                calls: calls.clone(),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;

    fn sessions() -> Vec<SessionRecord> {
        vec![SessionRecord::new(
            "Lunedì 10 ore 10:00".into(),
            "Esaurito".into(),
            Some("https://example.org/cart/1".into()),
        )]
    }

    #[test]
    fn test_all_channels_fire() {
        let calls = SharedCalls::default();
        let mut config = AlertConfig::default();
        config.desktop = true;
        let mut dispatcher = dispatcher(&config, &calls, false);
        let mut overlay = Overlay::default();

        let report = dispatcher.dispatch(&sessions(), &mut overlay);

        assert!(report.failed.is_empty());
        for channel in [Channel::Visual, Channel::Audio, Channel::Title, Channel::Desktop] {
            assert!(report.has_delivered(channel), "{channel}");
        }
        assert_eq!(overlay.current().unwrap().kind, BannerKind::Alert);
        assert_eq!(calls.borrow().tones.len(), 5);
        assert_eq!(calls.borrow().titles, [config.alert_title.clone()]);
        assert_eq!(calls.borrow().toasts[0].1, "Lunedì 10 ore 10:00");
    }

    #[test]
    fn test_tone_failure_spares_other_channels() {
        let calls = SharedCalls::default();
        let mut dispatcher = dispatcher(&AlertConfig::default(), &calls, true);
        let mut overlay = Overlay::default();

        let report = dispatcher.dispatch(&sessions(), &mut overlay);

        assert!(report.has_failed(Channel::Audio));
        assert!(report.has_delivered(Channel::Visual));
        assert!(report.has_delivered(Channel::Title));
        assert_eq!(overlay.instance_count(), 1);
        assert_eq!(calls.borrow().titles.len(), 1);
    }

    #[test]
    fn test_visual_failure_spares_other_channels() {
        let calls = SharedCalls::default();
        let mut dispatcher = dispatcher(&AlertConfig::default(), &calls, false);

        let report = dispatcher.dispatch(&sessions(), &mut BrokenSurface);

        assert!(report.has_failed(Channel::Visual));
        assert!(report.has_delivered(Channel::Audio));
        assert!(report.has_delivered(Channel::Title));
    }

    #[test]
    fn test_disabled_channels_stay_quiet() {
        let calls = SharedCalls::default();
        let config = AlertConfig {
            sound: false,
            title_flash: false,
            ..AlertConfig::default()
        };
        let mut dispatcher = dispatcher(&config, &calls, false);
        let mut overlay = Overlay::default();

        let report = dispatcher.dispatch(&sessions(), &mut overlay);

        assert_eq!(report.delivered, [Channel::Visual]);
        assert!(calls.borrow().tones.is_empty());
        assert!(calls.borrow().titles.is_empty());
        assert!(calls.borrow().toasts.is_empty());
    }

    #[test]
    fn test_stand_down_stops_title() {
        let calls = SharedCalls::default();
        let mut dispatcher = dispatcher(&AlertConfig::default(), &calls, false);
        dispatcher.stand_down();
        assert_eq!(calls.borrow().title_stops, 1);
    }
}
