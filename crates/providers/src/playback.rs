//! PCM playback for synthesized narration.
//!
//! ElevenLabs streams `pcm_*` audio as little-endian 16-bit mono samples, cut
//! at arbitrary byte boundaries. [`PcmFrames`] reassembles them into whole
//! samples. With the `audio-device` feature, [`DevicePcmSink`] plays them on
//! the default output device through rodio; [`PacedPcmSink`] is the headless
//! fallback that only takes the time playback would.

use async_trait::async_trait;
use std::time::Duration;
use voxpilot_core::error::ProviderError;
use voxpilot_core::speech::AudioSink;

/// Sample rate encoded in an ElevenLabs `pcm_*` output format.
pub fn pcm_sample_rate(output_format: &str) -> Option<u32> {
    output_format.strip_prefix("pcm_")?.parse().ok()
}

/// Reassembles a byte stream into 16-bit little-endian samples.
#[derive(Debug, Default)]
pub struct PcmFrames {
    carry: Option<u8>,
}

impl PcmFrames {
    /// Whole samples in `chunk`, holding back a trailing odd byte for the
    /// next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<i16> {
        let mut bytes = chunk;
        let mut samples = Vec::with_capacity(chunk.len() / 2 + 1);

        if let Some(low) = self.carry.take() {
            match bytes.split_first() {
                Some((high, rest)) => {
                    samples.push(i16::from_le_bytes([low, *high]));
                    bytes = rest;
                }
                None => {
                    self.carry = Some(low);
                    return samples;
                }
            }
        }

        let mut pairs = bytes.chunks_exact(2);
        samples.extend(pairs.by_ref().map(|p| i16::from_le_bytes([p[0], p[1]])));
        self.carry = pairs.remainder().first().copied();
        samples
    }

    /// Drop any half sample left over from a cancelled utterance.
    pub fn reset(&mut self) {
        self.carry = None;
    }
}

/// An [`AudioSink`] that consumes 16-bit mono PCM at real-time speed
/// without producing sound. Used when no output device is available.
pub struct PacedPcmSink {
    sample_rate: u32,
}

impl PacedPcmSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
        }
    }

    fn duration_of(&self, bytes: usize) -> Duration {
        let samples = bytes / 2;
        Duration::from_secs_f64(samples as f64 / self.sample_rate as f64)
    }
}

#[async_trait]
impl AudioSink for PacedPcmSink {
    fn name(&self) -> &str {
        "headless, no audio output"
    }

    async fn write(&self, chunk: &[u8]) -> Result<(), ProviderError> {
        tokio::time::sleep(self.duration_of(chunk.len())).await;
        Ok(())
    }
}

/// Stops the sink if an utterance is abandoned before it finished.
pub(crate) struct PlaybackGuard<'a> {
    sink: &'a dyn AudioSink,
    armed: bool,
}

impl<'a> PlaybackGuard<'a> {
    pub(crate) fn new(sink: &'a dyn AudioSink) -> Self {
        Self { sink, armed: true }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PlaybackGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.sink.stop();
        }
    }
}

#[cfg(feature = "audio-device")]
pub use device::DevicePcmSink;

#[cfg(feature = "audio-device")]
mod device {
    use super::PcmFrames;
    use async_trait::async_trait;
    use std::sync::{Mutex, mpsc};
    use std::thread;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tracing::{debug, warn};
    use voxpilot_core::error::ProviderError;
    use voxpilot_core::speech::AudioSink;

    enum Command {
        Play(Vec<i16>),
        Drain(oneshot::Sender<()>),
        Stop,
    }

    /// Plays PCM on the default output device.
    ///
    /// The rodio output stream is not `Send`, so it lives on a dedicated
    /// thread that takes commands over a channel.
    pub struct DevicePcmSink {
        commands: mpsc::Sender<Command>,
        frames: Mutex<PcmFrames>,
    }

    impl DevicePcmSink {
        pub fn open(sample_rate: u32) -> Result<Self, ProviderError> {
            let (commands, rx) = mpsc::channel();
            let (ready_tx, ready_rx) = mpsc::sync_channel(1);

            thread::Builder::new()
                .name("voxpilot-audio".into())
                .spawn(move || player(sample_rate, rx, ready_tx))
                .map_err(|e| ProviderError::NotConfigured(format!("audio thread: {e}")))?;

            match ready_rx.recv() {
                Ok(Ok(())) => Ok(Self {
                    commands,
                    frames: Mutex::new(PcmFrames::default()),
                }),
                Ok(Err(e)) => Err(ProviderError::NotConfigured(format!("audio output: {e}"))),
                Err(_) => Err(ProviderError::NotConfigured("audio thread exited".into())),
            }
        }

        fn send(&self, command: Command) -> Result<(), ProviderError> {
            self.commands
                .send(command)
                .map_err(|_| ProviderError::StreamInterrupted("audio thread exited".into()))
        }
    }

    #[async_trait]
    impl AudioSink for DevicePcmSink {
        fn name(&self) -> &str {
            "default output device"
        }

        async fn write(&self, chunk: &[u8]) -> Result<(), ProviderError> {
            let samples = match self.frames.lock() {
                Ok(mut frames) => frames.push(chunk),
                Err(poisoned) => poisoned.into_inner().push(chunk),
            };
            if samples.is_empty() {
                return Ok(());
            }
            self.send(Command::Play(samples))
        }

        async fn finish(&self) -> Result<(), ProviderError> {
            let (tx, rx) = oneshot::channel();
            self.send(Command::Drain(tx))?;
            rx.await
                .map_err(|_| ProviderError::StreamInterrupted("playback stopped".into()))
        }

        fn stop(&self) {
            match self.frames.lock() {
                Ok(mut frames) => frames.reset(),
                Err(poisoned) => poisoned.into_inner().reset(),
            }
            let _ = self.commands.send(Command::Stop);
        }
    }

    fn player(
        sample_rate: u32,
        rx: mpsc::Receiver<Command>,
        ready: mpsc::SyncSender<Result<(), String>>,
    ) {
        let (_stream, handle) = match rodio::OutputStream::try_default() {
            Ok(pair) => pair,
            Err(e) => {
                let _ = ready.send(Err(e.to_string()));
                return;
            }
        };
        let mut sink = match rodio::Sink::try_new(&handle) {
            Ok(sink) => sink,
            Err(e) => {
                let _ = ready.send(Err(e.to_string()));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        debug!(sample_rate, "Audio output opened");

        let mut waiting: Vec<oneshot::Sender<()>> = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_millis(20)) {
                Ok(Command::Play(samples)) => {
                    sink.append(rodio::buffer::SamplesBuffer::new(1, sample_rate, samples));
                }
                Ok(Command::Drain(done)) => waiting.push(done),
                Ok(Command::Stop) => {
                    sink.stop();
                    waiting.clear();
                    sink = match rodio::Sink::try_new(&handle) {
                        Ok(sink) => sink,
                        Err(e) => {
                            warn!(error = %e, "Audio output lost");
                            return;
                        }
                    };
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => return,
            }

            if !waiting.is_empty() && sink.empty() {
                for done in waiting.drain(..) {
                    let _ = done.send(());
                }
            }
        }
    }
}
