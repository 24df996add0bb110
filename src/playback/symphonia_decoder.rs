use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo, Track},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
    units::Time,
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("Symphonia error: {0}")]
    Symphonia(#[from] SymphoniaError),
    #[error("No audio tracks found")]
    NoAudioTracks,
}

/// Fetched body shared between the cache and any number of decoders
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

fn probe(data: Arc<Vec<u8>>, extension: Option<&str>) -> Result<Box<dyn FormatReader>, DecoderError> {
    let cursor = Cursor::new(SharedBytes(data));
    let media_source = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        media_source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    Ok(probed.format)
}

fn audio_track(format_reader: &dyn FormatReader) -> Result<&Track, DecoderError> {
    format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or(DecoderError::NoAudioTracks)
}

/// Measure the stream length by walking every packet without decoding.
///
/// Used for containers that record no frame count, such as streamed MP3.
/// Returns `None` when the packets carry no timestamps.
pub fn scan_duration(
    data: Arc<Vec<u8>>,
    extension: Option<&str>,
) -> Result<Option<std::time::Duration>, DecoderError> {
    let mut format_reader = probe(data, extension)?;
    let track = audio_track(format_reader.as_ref())?;
    let track_id = track.id;
    let time_base = track.codec_params.time_base;
    let sample_rate = track.codec_params.sample_rate;

    let mut end = 0u64;
    loop {
        match format_reader.next_packet() {
            Ok(packet) => {
                if packet.track_id() == track_id {
                    end = end.max(packet.ts() + packet.dur());
                }
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecoderError::Symphonia(e)),
        }
    }

    if end == 0 {
        return Ok(None);
    }

    let seconds = match (time_base, sample_rate) {
        (Some(time_base), _) => {
            let time = time_base.calc_time(end);
            time.seconds as f64 + time.frac
        }
        (None, Some(rate)) => end as f64 / rate as f64,
        (None, None) => return Ok(None),
    };
    Ok(Some(std::time::Duration::from_secs_f64(seconds)))
}

/// Wrapper around symphonia decoder that tracks decoded frames for position calculation
pub struct TrackDecoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    decoded_frames: Arc<AtomicU64>,
    duration: Option<std::time::Duration>,
    sample_buffer: Option<SampleBuffer<f32>>,
}

impl TrackDecoder {
    /// Probe `data` and open its first audio track.
    ///
    /// `extension` is passed to the probe as a format hint.
    pub fn new(data: Arc<Vec<u8>>, extension: Option<&str>) -> Result<Self, DecoderError> {
        let format_reader = probe(data, extension)?;
        let track = audio_track(format_reader.as_ref())?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track
            .codec_params
            .channels
            .map(|channels| channels.count())
            .unwrap_or(2);

        // Absent for containers that do not record a frame count
        let duration = track.codec_params.n_frames.map(|n_frames| {
            std::time::Duration::from_secs_f64(n_frames as f64 / sample_rate as f64)
        });

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;

        Ok(Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            decoded_frames: Arc::new(AtomicU64::new(0)),
            duration,
            sample_buffer: None,
        })
    }

    /// Decode the next packet and append its interleaved samples to `out`.
    ///
    /// Returns `false` at end of stream.
    pub fn decode_into(&mut self, out: &mut Vec<f32>) -> Result<bool, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => return Err(DecoderError::Symphonia(e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(audio_buf) => {
                    let spec = *audio_buf.spec();
                    let frames = audio_buf.frames();
                    self.channels = spec.channels.count();

                    let capacity = audio_buf.capacity();
                    if self
                        .sample_buffer
                        .as_ref()
                        .map_or(true, |buffer| buffer.capacity() < capacity)
                    {
                        self.sample_buffer = Some(SampleBuffer::new(capacity as u64, spec));
                    }
                    if let Some(buffer) = self.sample_buffer.as_mut() {
                        buffer.copy_interleaved_ref(audio_buf);
                        out.extend_from_slice(buffer.samples());
                    }

                    self.decoded_frames
                        .fetch_add(frames as u64, Ordering::Relaxed);
                    return Ok(true);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(DecoderError::Symphonia(e)),
            }
        }
    }

    /// Counter of frames decoded so far, readable after the decoder moves
    /// into the audio callback
    pub fn frame_counter(&self) -> Arc<AtomicU64> {
        self.decoded_frames.clone()
    }

    /// Get the current playback position based on decoded frames
    pub fn position(&self) -> std::time::Duration {
        let frames = self.decoded_frames.load(Ordering::Relaxed);
        std::time::Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the most recently decoded packet
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Seek to a specific position
    pub fn seek(&mut self, position: std::time::Duration) -> Result<(), DecoderError> {
        let position_seconds = position.as_secs_f64();
        let frame_number = (position_seconds * self.sample_rate as f64) as u64;

        let seek_time = Time::new(position_seconds.floor() as u64, position_seconds.fract());

        match self.format_reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: seek_time,
                track_id: Some(self.track_id),
            },
        ) {
            Ok(_) => {
                self.decoder.reset();
                self.decoded_frames.store(frame_number, Ordering::Relaxed);
                return Ok(());
            }
            Err(e) => {
                warn!(
                    "Seek by Time failed for {:.3}s: {:?}, falling back to decode",
                    position_seconds, e
                );
            }
        }

        // Fallback: rewind and decode forward to the target
        info!(
            "Seeking by decoding from start to {:.3}s (frame {})",
            position_seconds, frame_number
        );

        self.format_reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::new(0, 0.0),
                track_id: Some(self.track_id),
            },
        )?;
        self.decoder.reset();
        self.decoded_frames.store(0, Ordering::Relaxed);

        let mut scratch = Vec::new();
        while self.decoded_frames.load(Ordering::Relaxed) < frame_number {
            scratch.clear();
            if !self.decode_into(&mut scratch)? {
                break;
            }
        }

        let decoded = self.decoded_frames.load(Ordering::Relaxed);
        self.decoded_frames
            .store(decoded.min(frame_number), Ordering::Relaxed);

        Ok(())
    }

    /// Get the track duration, if the container records it
    pub fn duration(&self) -> Option<std::time::Duration> {
        self.duration
    }
}
