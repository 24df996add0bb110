use crate::cache::AudioCache;
use crate::locator::file_name;
use crate::playback::output::{AudioOutput, OutputEvent, OutputEventSender, PlaybackError};
use crate::playback::symphonia_decoder::{scan_duration, TrackDecoder};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

type Listener = Arc<Mutex<Option<OutputEventSender>>>;

fn emit(listener: &Listener, event: OutputEvent) {
    if let Ok(guard) = listener.lock() {
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(event);
        }
    }
}

/// Fetched and probed source
struct LoadedSource {
    data: Arc<Vec<u8>>,
    extension: Option<String>,
    sample_rate: u32,
    frames: Arc<AtomicU64>,
}

/// Flags shared with the audio callback
#[derive(Default)]
struct StreamFlags {
    paused: AtomicBool,
    finished: AtomicBool,
}

/// Desktop audio output: HTTP fetch, symphonia decode, CPAL playback
pub struct CpalAudioOutput {
    client: reqwest::Client,
    cache: AudioCache,
    device: Device,
    stream_config: StreamConfig,
    listener: Listener,
    source: Option<String>,
    loaded: Option<LoadedSource>,
    stream: Option<Stream>,
    flags: Arc<StreamFlags>,
    duration: f64,
    /// Measured length of a loaded body whose container records none
    seekable_end: Option<f64>,
}

impl CpalAudioOutput {
    pub fn new(client: reqwest::Client, cache: AudioCache) -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Device("No output device".to_string()))?;

        let default_config = device
            .default_output_config()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        let sample_format = default_config.sample_format();
        let stream_config = StreamConfig::from(default_config);

        info!(
            "Audio device: {} channels, {} Hz, {:?}",
            stream_config.channels, stream_config.sample_rate.0, sample_format
        );

        Ok(Self {
            client,
            cache,
            device,
            stream_config,
            listener: Arc::new(Mutex::new(None)),
            source: None,
            loaded: None,
            stream: None,
            flags: Arc::new(StreamFlags::default()),
            duration: f64::NAN,
            seekable_end: None,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Arc<Vec<u8>>, PlaybackError> {
        if let Some(data) = self.cache.get(url).await {
            return Ok(data);
        }

        info!("Fetching {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| PlaybackError::Fetch(e.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| PlaybackError::Fetch(e.to_string()))?;

        let data = Arc::new(body.to_vec());
        self.cache.put(url, data.clone()).await;
        Ok(data)
    }

    async fn load(&mut self, url: &str) -> Result<(), PlaybackError> {
        let data = self.fetch(url).await?;
        let extension = file_name(url)
            .rsplit_once('.')
            .map(|(_, extension)| extension.to_ascii_lowercase());

        let decoder = TrackDecoder::new(data.clone(), extension.as_deref())
            .map_err(|e| PlaybackError::Decode(e.to_string()))?;

        self.duration = decoder
            .duration()
            .map(|duration| duration.as_secs_f64())
            .unwrap_or(f64::INFINITY);
        self.seekable_end = if self.duration.is_finite() {
            Some(self.duration)
        } else {
            // No length in the container; measure the buffered body
            match scan_duration(data.clone(), extension.as_deref()) {
                Ok(end) => end.map(|end| end.as_secs_f64()),
                Err(e) => {
                    warn!("Could not measure {}: {}", url, e);
                    None
                }
            }
        };
        self.loaded = Some(LoadedSource {
            data,
            extension,
            sample_rate: decoder.sample_rate(),
            frames: decoder.frame_counter(),
        });
        emit(&self.listener, OutputEvent::MetadataLoaded);

        self.start_stream(decoder)
    }

    /// Replace the stream with one fed by `decoder`, keeping the pause state
    fn start_stream(&mut self, decoder: TrackDecoder) -> Result<(), PlaybackError> {
        self.stream = None;

        let paused = self.flags.paused.load(Ordering::Relaxed);
        let flags = Arc::new(StreamFlags::default());
        flags.paused.store(paused, Ordering::Relaxed);

        if let Some(loaded) = self.loaded.as_mut() {
            loaded.frames = decoder.frame_counter();
        }

        let stream = self.build_stream(decoder, flags.clone())?;
        stream
            .play()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        self.flags = flags;
        self.stream = Some(stream);
        Ok(())
    }

    fn build_stream(
        &self,
        mut decoder: TrackDecoder,
        flags: Arc<StreamFlags>,
    ) -> Result<Stream, PlaybackError> {
        let output_channels = self.stream_config.channels as usize;
        // Sample rate conversion factor
        let ratio = decoder.sample_rate() as f64 / self.stream_config.sample_rate.0 as f64;
        let listener = self.listener.clone();

        let mut decoded = Vec::new();
        let mut pending: Vec<f32> = Vec::new();
        let mut pending_pos = 0usize;
        let mut last_time_update = Instant::now();

        self.device
            .build_output_stream(
                &self.stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if flags.paused.load(Ordering::Relaxed) || flags.finished.load(Ordering::Relaxed)
                    {
                        data.fill(0.0);
                        return;
                    }

                    let mut written = 0;
                    while written < data.len() {
                        if pending_pos >= pending.len() {
                            decoded.clear();
                            match decoder.decode_into(&mut decoded) {
                                Ok(true) => {
                                    let channels = decoder.channels().max(1);
                                    let resampled = resample_linear(&decoded, channels, ratio);
                                    pending = map_channels(&resampled, channels, output_channels);
                                    pending_pos = 0;
                                    continue;
                                }
                                Ok(false) => {
                                    flags.finished.store(true, Ordering::Relaxed);
                                    flags.paused.store(true, Ordering::Relaxed);
                                    data[written..].fill(0.0);
                                    emit(&listener, OutputEvent::Ended);
                                    return;
                                }
                                Err(e) => {
                                    error!("Decoder error: {:?}", e);
                                    flags.paused.store(true, Ordering::Relaxed);
                                    data[written..].fill(0.0);
                                    emit(&listener, OutputEvent::Pause);
                                    return;
                                }
                            }
                        }

                        let count = (data.len() - written).min(pending.len() - pending_pos);
                        data[written..written + count]
                            .copy_from_slice(&pending[pending_pos..pending_pos + count]);
                        written += count;
                        pending_pos += count;
                    }

                    if last_time_update.elapsed() >= TIME_UPDATE_INTERVAL {
                        emit(&listener, OutputEvent::TimeUpdate);
                        last_time_update = Instant::now();
                    }
                },
                |err| {
                    error!("Audio stream error: {:?}", err);
                },
                None,
            )
            .map_err(|e| PlaybackError::Device(e.to_string()))
    }

    /// Rebuild the decoder positioned at `seconds`
    fn restart_at(&mut self, seconds: f64) -> Result<(), PlaybackError> {
        let Some(loaded) = self.loaded.as_ref() else {
            return Err(PlaybackError::NoSource);
        };

        let mut decoder = TrackDecoder::new(loaded.data.clone(), loaded.extension.as_deref())
            .map_err(|e| PlaybackError::Decode(e.to_string()))?;
        decoder
            .seek(Duration::from_secs_f64(seconds.max(0.0)))
            .map_err(|e| PlaybackError::Decode(e.to_string()))?;

        self.start_stream(decoder)
    }

    fn reset(&mut self) {
        self.stream = None;
        self.loaded = None;
        self.flags = Arc::new(StreamFlags::default());
        self.duration = f64::NAN;
        self.seekable_end = None;
    }
}

#[async_trait::async_trait(?Send)]
impl AudioOutput for CpalAudioOutput {
    fn subscribe(&mut self, events: OutputEventSender) {
        if let Ok(mut listener) = self.listener.lock() {
            *listener = Some(events);
        }
    }

    fn unsubscribe(&mut self) {
        if let Ok(mut listener) = self.listener.lock() {
            *listener = None;
        }
    }

    fn set_source(&mut self, url: &str) {
        debug!("Output source: {}", url);
        self.reset();
        self.source = Some(url.to_string());
    }

    fn clear_source(&mut self) {
        self.reset();
        self.source = None;
    }

    async fn play(&mut self) -> Result<(), PlaybackError> {
        let url = self.source.clone().ok_or(PlaybackError::NoSource)?;

        self.flags.paused.store(false, Ordering::Relaxed);
        if self.loaded.is_none() {
            self.load(&url).await?;
        } else if self.flags.finished.load(Ordering::Relaxed) {
            self.restart_at(0.0)?;
        }

        emit(&self.listener, OutputEvent::Play);
        Ok(())
    }

    fn pause(&mut self) {
        self.flags.paused.store(true, Ordering::Relaxed);
        emit(&self.listener, OutputEvent::Pause);
    }

    fn current_time(&self) -> f64 {
        match self.loaded.as_ref() {
            Some(loaded) => {
                loaded.frames.load(Ordering::Relaxed) as f64 / loaded.sample_rate as f64
            }
            None => 0.0,
        }
    }

    fn set_current_time(&mut self, seconds: f64) {
        if let Err(e) = self.restart_at(seconds) {
            error!("Seek to {:.1}s failed: {}", seconds, e);
            return;
        }
        emit(&self.listener, OutputEvent::TimeUpdate);
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn seekable_end(&self) -> Option<f64> {
        self.loaded.as_ref()?;
        self.seekable_end
    }
}

/// Linear interpolation resampling of interleaved samples.
///
/// `ratio` is source rate over output rate.
pub fn resample_linear(input: &[f32], channels: usize, ratio: f64) -> Vec<f32> {
    if ratio == 1.0 || input.is_empty() {
        return input.to_vec();
    }

    let input_frames = input.len() / channels;
    let output_frames = (input_frames as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(output_frames * channels);

    for frame in 0..output_frames {
        let source = frame as f64 * ratio;
        let i0 = (source as usize).min(input_frames - 1);
        let i1 = (i0 + 1).min(input_frames - 1);
        let t = (source - i0 as f64) as f32;
        for ch in 0..channels {
            let a = input[i0 * channels + ch];
            let b = input[i1 * channels + ch];
            output.push(a + (b - a) * t);
        }
    }

    output
}

/// Map interleaved frames from `input_channels` to `output_channels`
pub fn map_channels(input: &[f32], input_channels: usize, output_channels: usize) -> Vec<f32> {
    if input_channels == output_channels {
        return input.to_vec();
    }

    let frames = input.len() / input_channels;
    let mut output = Vec::with_capacity(frames * output_channels);

    for frame in input.chunks_exact(input_channels) {
        if output_channels == 1 {
            // Downmix
            output.push(frame.iter().sum::<f32>() / input_channels as f32);
            continue;
        }
        for ch in 0..output_channels {
            let sample = if input_channels == 1 {
                frame[0]
            } else {
                frame.get(ch).copied().unwrap_or(0.0)
            };
            output.push(sample);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_halves_rate() {
        let input = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(resample_linear(&input, 1, 2.0), vec![0.0, 2.0]);
    }

    #[test]
    fn test_resample_interpolates() {
        let input = [0.0, 10.0, 1.0, 20.0];
        let output = resample_linear(&input, 2, 0.5);
        assert_eq!(output, vec![0.0, 10.0, 0.5, 15.0, 1.0, 20.0, 1.0, 20.0]);
    }

    #[test]
    fn test_mono_to_stereo() {
        assert_eq!(map_channels(&[0.25, 0.5], 1, 2), vec![0.25, 0.25, 0.5, 0.5]);
    }

    #[test]
    fn test_stereo_downmix() {
        assert_eq!(map_channels(&[0.25, 0.75, 1.0, 0.0], 2, 1), vec![0.5, 0.5]);
    }

    #[test]
    fn test_surround_to_stereo_keeps_front() {
        let input = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        assert_eq!(map_channels(&input, 6, 2), vec![0.1, 0.2]);
    }
}
