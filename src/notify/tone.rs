use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use rodio::source::{SineWave, Source, Zero};
use rodio::{OutputStream, Sink};

use super::ToneSynth;
use crate::config::AlertConfig;

const SAMPLE_RATE: u32 = 44100;

/// One beep, positioned relative to the start of its sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency_hz: f32,
    pub duration: Duration,
    pub gain: f32,
    pub start_offset: Duration,
}

/// Ascending alarm: `count` tones, each `step_hz` above the previous one
#[derive(Debug, Clone, PartialEq)]
pub struct AlertSequence {
    pub count: u32,
    pub base_hz: f32,
    pub step_hz: f32,
    pub duration: Duration,
    pub gap: Duration,
    pub gain: f32,
}

impl AlertSequence {
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            count: config.tone_repeat,
            base_hz: config.tone_frequency_hz,
            step_hz: config.tone_step_hz,
            duration: Duration::from_millis(config.tone_duration_ms),
            gap: Duration::from_millis(config.tone_gap_ms),
            gain: config.tone_gain,
        }
    }

    pub fn tones(&self) -> Vec<Tone> {
        (0..self.count)
            .map(|i| Tone {
                frequency_hz: self.base_hz + self.step_hz * i as f32,
                duration: self.duration,
                gain: self.gain,
                start_offset: (self.duration + self.gap) * i,
            })
            .collect()
    }
}

/// Hand every tone of the sequence to the synthesizer
pub fn play_alert_sequence(synth: &dyn ToneSynth, sequence: &AlertSequence) -> Result<()> {
    for tone in sequence.tones() {
        synth.play(tone)?;
    }
    Ok(())
}

/// Plays tones on the default output device.
///
/// The output stream is not `Send`, so it lives on a dedicated thread that
/// is started on first use and fed through a channel.
#[derive(Default)]
pub struct RodioToneSynth {
    tx: OnceCell<Sender<Tone>>,
}

impl RodioToneSynth {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ToneSynth for RodioToneSynth {
    fn play(&self, tone: Tone) -> Result<()> {
        let tx = self.tx.get_or_try_init(spawn_audio_thread)?;
        tx.send(tone)
            .map_err(|_| anyhow!("Audio thread has stopped"))
    }
}

fn spawn_audio_thread() -> Result<Sender<Tone>> {
    let (tx, rx) = mpsc::channel::<Tone>();
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), String>>(1);

    thread::Builder::new()
        .name("alert-tones".to_string())
        .spawn(move || {
            let (_stream, handle) = match OutputStream::try_default() {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("Failed to open audio output: {}", e)));
                    return;
                }
            };
            let sink = match Sink::try_new(&handle) {
                Ok(sink) => sink,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("Failed to create audio sink: {}", e)));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            // End of the audio already queued for the current sequence
            let mut queued = Duration::ZERO;
            while let Ok(tone) = rx.recv() {
                if tone.start_offset.is_zero() {
                    queued = Duration::ZERO;
                }
                let silence = tone.start_offset.saturating_sub(queued);
                if !silence.is_zero() {
                    sink.append(Zero::<f32>::new(1, SAMPLE_RATE).take_duration(silence));
                }
                sink.append(
                    SineWave::new(tone.frequency_hz)
                        .take_duration(tone.duration)
                        .amplify(tone.gain),
                );
                queued = queued.max(tone.start_offset) + tone.duration;
            }
            sink.sleep_until_end();
        })
        .context("Failed to spawn audio thread")?;

    ready_rx
        .recv()
        .context("Audio thread exited before reporting readiness")?
        .map_err(|e| anyhow!(e))?;

    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder(RefCell<Vec<Tone>>);

    impl ToneSynth for Recorder {
        fn play(&self, tone: Tone) -> Result<()> {
            self.0.borrow_mut().push(tone);
            Ok(())
        }
    }

    struct Broken;

    impl ToneSynth for Broken {
        fn play(&self, _tone: Tone) -> Result<()> {
            Err(anyhow!("blocked until user interaction"))
        }
    }

    fn sequence() -> AlertSequence {
        AlertSequence::from_config(&AlertConfig::default())
    }

    #[test]
    fn test_sequence_ascends_linearly() {
        let tones = sequence().tones();
        let freqs: Vec<f32> = tones.iter().map(|t| t.frequency_hz).collect();
        assert_eq!(freqs, [800.0, 900.0, 1000.0, 1100.0, 1200.0]);
        assert!(tones.iter().all(|t| t.duration == Duration::from_millis(200)));
    }

    #[test]
    fn test_tones_are_back_to_back_with_gap() {
        let tones = sequence().tones();
        for pair in tones.windows(2) {
            let end_of_first = pair[0].start_offset + pair[0].duration;
            assert_eq!(pair[1].start_offset - end_of_first, Duration::from_millis(50));
        }
        assert_eq!(tones[0].start_offset, Duration::ZERO);
    }

    #[test]
    fn test_play_alert_sequence_sends_every_tone() {
        let recorder = Recorder(RefCell::new(Vec::new()));
        play_alert_sequence(&recorder, &sequence()).unwrap();
        assert_eq!(recorder.0.borrow().len(), 5);
    }

    #[test]
    fn test_play_alert_sequence_reports_synth_failure() {
        let err = play_alert_sequence(&Broken, &sequence()).unwrap_err();
        assert!(err.to_string().contains("blocked"));
    }
}
