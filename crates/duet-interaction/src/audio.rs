//! Audio sources for speech input.
//!
//! Every source produces 16 kHz mono PCM16 little-endian frames of 40 ms
//! (1280 bytes), the format the recognizer expects.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use duet_core::error::{DuetError, Result};
use tokio::sync::{mpsc, watch};

pub const SAMPLE_RATE: u32 = 16_000;
pub const FRAME_BYTES: usize = 1280;
pub const FRAME_INTERVAL: Duration = Duration::from_millis(40);

const CAPTURE_BUFFER: usize = 256;

/// A running capture: frames come out until the source is exhausted or
/// [`AudioCapture::stop`] is called.
pub struct AudioCapture {
    frames: mpsc::Receiver<Vec<u8>>,
    stop: watch::Sender<bool>,
}

/// The producing end of an [`AudioCapture`].
pub struct AudioFeed {
    frames: mpsc::Sender<Vec<u8>>,
    stop: watch::Receiver<bool>,
}

impl AudioCapture {
    /// Creates a connected capture/feed pair.
    pub fn pair() -> (Self, AudioFeed) {
        let (frame_tx, frame_rx) = mpsc::channel(CAPTURE_BUFFER);
        let (stop_tx, stop_rx) = watch::channel(false);
        (
            Self {
                frames: frame_rx,
                stop: stop_tx,
            },
            AudioFeed {
                frames: frame_tx,
                stop: stop_rx,
            },
        )
    }

    /// Next frame, or `None` once the source has finished.
    pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.frames.recv().await
    }

    /// Asks the source to stop producing.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

impl AudioFeed {
    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Sends a frame; returns `false` once the capture is gone.
    pub async fn send(&self, frame: Vec<u8>) -> bool {
        self.frames.send(frame).await.is_ok()
    }

    /// Resolves once the capture asked to stop (or was dropped).
    pub async fn stopped(&mut self) {
        while !*self.stop.borrow() {
            if self.stop.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Something that can produce speech audio.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Starts producing frames.
    async fn start(&self) -> Result<AudioCapture>;

    /// Short human-readable description.
    fn describe(&self) -> String;
}

/// Plays a WAV file as if it were spoken live.
#[derive(Debug, Clone)]
pub struct WavFileSource {
    path: PathBuf,
    paced: bool,
}

impl WavFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            paced: true,
        }
    }

    /// Emits frames as fast as the consumer takes them.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

#[async_trait]
impl AudioSource for WavFileSource {
    async fn start(&self) -> Result<AudioCapture> {
        let path = self.path.clone();
        let pcm = tokio::task::spawn_blocking(move || load_wav_pcm16(&path))
            .await
            .map_err(|e| DuetError::internal(format!("WAV loader failed: {e}")))??;

        tracing::info!(
            "[Audio] Streaming {} ({} ms)",
            self.path.display(),
            pcm.len() as u64 * 1000 / (SAMPLE_RATE as u64 * 2)
        );

        let (capture, mut feed) = AudioCapture::pair();
        let paced = self.paced;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FRAME_INTERVAL);
            for frame in pcm.chunks(FRAME_BYTES) {
                if paced {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = feed.stopped() => break,
                    }
                } else if feed.is_stopped() {
                    break;
                }
                if !feed.send(frame.to_vec()).await {
                    break;
                }
            }
        });

        Ok(capture)
    }

    fn describe(&self) -> String {
        format!("WAV file {}", self.path.display())
    }
}

/// Reads a WAV file and converts it to 16 kHz mono PCM16 bytes.
pub fn load_wav_pcm16(path: &std::path::Path) -> Result<Vec<u8>> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| DuetError::io(format!("Cannot open {}: {e}", path.display())))?;
    let spec = reader.spec();
    tracing::debug!("[Audio] WAV spec: {:?}", spec);

    let samples: std::result::Result<Vec<f32>, hound::Error> = match spec.sample_format {
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|sample| sample as f32 / i16::MAX as f32))
                .collect(),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / i32::MAX as f32))
                .collect(),
            bits => {
                return Err(DuetError::invalid_input(format!(
                    "Unsupported bit depth: {bits}"
                )));
            }
        },
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
    };
    let samples = samples.map_err(|e| DuetError::io(format!("Failed to decode WAV: {e}")))?;

    let mono = downmix(&samples, spec.channels as usize);
    let mut resampler = LinearResampler::new(spec.sample_rate, SAMPLE_RATE);
    Ok(to_pcm16_bytes(&resampler.process(&mono)))
}

/// Averages interleaved channels into one.
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

pub fn to_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|s| ((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes())
        .collect()
}

/// Streaming linear-interpolation resampler.
///
/// Keeps its position and the last input sample between calls so chunked
/// input resamples the same as one contiguous buffer.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    step: f64,
    position: f64,
    previous: Option<f32>,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: from_rate as f64 / to_rate.max(1) as f64,
            position: 0.0,
            previous: None,
        }
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if (self.step - 1.0).abs() < f64::EPSILON {
            return input.to_vec();
        }

        // Index -1 is the last sample of the previous chunk.
        let sample_at = |i: isize, previous: Option<f32>| -> f32 {
            if i < 0 {
                previous.unwrap_or(0.0)
            } else {
                input[i as usize]
            }
        };

        let offset: isize = if self.previous.is_some() { -1 } else { 0 };
        let mut output = Vec::with_capacity((input.len() as f64 / self.step) as usize + 1);
        loop {
            let index = self.position.floor() as isize + offset;
            if index + 1 >= input.len() as isize {
                break;
            }
            let frac = (self.position - self.position.floor()) as f32;
            let a = sample_at(index, self.previous);
            let b = sample_at(index + 1, self.previous);
            output.push(a + (b - a) * frac);
            self.position += self.step;
        }

        // Rebase so the next chunk's index -1 is our last sample.
        let consumed = (input.len() as isize - offset - 1).max(0) as f64;
        self.position -= consumed;
        if let Some(last) = input.last() {
            self.previous = Some(*last);
        }
        output
    }
}

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneSource;

#[cfg(feature = "microphone")]
mod microphone {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    /// Captures from the default input device.
    #[derive(Debug, Clone, Default)]
    pub struct MicrophoneSource {
        device_name: Option<String>,
    }

    impl MicrophoneSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_device(mut self, name: impl Into<String>) -> Self {
            self.device_name = Some(name.into());
            self
        }
    }

    #[async_trait]
    impl AudioSource for MicrophoneSource {
        async fn start(&self) -> Result<AudioCapture> {
            let (capture, feed) = AudioCapture::pair();
            let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();
            let device_name = self.device_name.clone();

            // cpal streams are not Send; the stream lives on its own thread.
            std::thread::spawn(move || run_capture(device_name, feed, ready_tx));

            tokio::task::spawn_blocking(move || ready_rx.recv())
                .await
                .map_err(|e| DuetError::internal(format!("Microphone thread failed: {e}")))?
                .map_err(|_| DuetError::recognition("Microphone thread exited early"))??;
            Ok(capture)
        }

        fn describe(&self) -> String {
            match &self.device_name {
                Some(name) => format!("microphone {name}"),
                None => "default microphone".to_string(),
            }
        }
    }

    fn run_capture(
        device_name: Option<String>,
        feed: AudioFeed,
        ready: std::sync::mpsc::Sender<Result<()>>,
    ) {
        let stream = match open_stream(device_name, &feed) {
            Ok(stream) => stream,
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        while !feed.is_stopped() {
            std::thread::sleep(Duration::from_millis(50));
        }
        drop(stream);
        tracing::debug!("[Audio] Microphone stopped");
    }

    fn open_stream(device_name: Option<String>, feed: &AudioFeed) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| DuetError::recognition(format!("Failed to enumerate devices: {e}")))?
                .find(|d| d.name().unwrap_or_default() == name)
                .ok_or_else(|| DuetError::recognition(format!("Device '{name}' not found")))?,
            None => host
                .default_input_device()
                .ok_or_else(|| DuetError::recognition("No default input device available"))?,
        };
        let config = device
            .default_input_config()
            .map_err(|e| DuetError::recognition(format!("Failed to get device config: {e}")))?;
        tracing::info!(
            "[Audio] Using {} ({:?})",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config
        );

        let channels = config.channels() as usize;
        let mut resampler = LinearResampler::new(config.sample_rate().0, SAMPLE_RATE);
        let mut pending: Vec<u8> = Vec::with_capacity(FRAME_BYTES * 2);
        let frames = feed.frames.clone();
        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();

        let mut on_samples = move |data: &[f32]| {
            let mono = downmix(data, channels);
            pending.extend(to_pcm16_bytes(&resampler.process(&mono)));
            while pending.len() >= FRAME_BYTES {
                let frame: Vec<u8> = pending.drain(..FRAME_BYTES).collect();
                if let Err(mpsc::error::TrySendError::Full(_)) = frames.try_send(frame) {
                    tracing::warn!("[Audio] Capture buffer full, dropping frame");
                }
            }
        };
        let on_error = |err: cpal::StreamError| tracing::error!("[Audio] Input stream error: {}", err);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| on_samples(data),
                on_error,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<f32> =
                        data.iter().map(|s| *s as f32 / i16::MAX as f32).collect();
                    on_samples(&converted)
                },
                on_error,
                None,
            ),
            other => {
                return Err(DuetError::recognition(format!(
                    "Unsupported sample format: {other:?}"
                )));
            }
        }
        .map_err(|e| DuetError::recognition(format!("Failed to open input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| DuetError::recognition(format!("Failed to start input stream: {e}")))?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &std::path::Path, sample_rate: u32, channels: u16, seconds: f32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let total = (sample_rate as f32 * seconds) as usize * channels as usize;
        for i in 0..total {
            writer.write_sample(((i % 100) as i16) * 100).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_downmix_averages_channels() {
        assert_eq!(downmix(&[0.25, 0.75, -1.0, 1.0], 2), vec![0.5, 0.0]);
        assert_eq!(downmix(&[0.5], 1), vec![0.5]);
    }

    #[test]
    fn test_resampler_is_chunk_invariant() {
        let input: Vec<f32> = (0..480).map(|i| (i as f32 / 480.0).sin()).collect();

        let whole = LinearResampler::new(48_000, 16_000).process(&input);

        let mut chunked = LinearResampler::new(48_000, 16_000);
        let mut pieces = Vec::new();
        for chunk in input.chunks(37) {
            pieces.extend(chunked.process(chunk));
        }

        assert_eq!(whole.len(), pieces.len());
        for (a, b) in whole.iter().zip(&pieces) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_wav_is_converted_to_16k_mono() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stereo.wav");
        write_wav(&path, 32_000, 2, 0.5);

        let pcm = load_wav_pcm16(&path).unwrap();

        // 0.5 s at 16 kHz, 2 bytes per sample (within one sample of rounding)
        let samples = pcm.len() / 2;
        assert!((7_999..=8_000).contains(&samples), "got {samples} samples");
    }

    #[tokio::test]
    async fn test_wav_source_emits_40ms_frames() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("speech.wav");
        write_wav(&path, SAMPLE_RATE, 1, 0.1);

        let mut capture = WavFileSource::new(&path).unpaced().start().await.unwrap();
        let mut frames = Vec::new();
        while let Some(frame) = capture.next_frame().await {
            frames.push(frame);
        }

        // 1600 samples = 3200 bytes = two full frames and a 640-byte tail
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), FRAME_BYTES);
        assert_eq!(frames[2].len(), 640);
    }

    #[test]
    fn test_missing_wav_is_io_error() {
        let err = load_wav_pcm16(std::path::Path::new("/nonexistent/audio.wav")).unwrap_err();
        assert!(matches!(err, DuetError::Io { .. }));
    }
}
