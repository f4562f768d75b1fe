//! Plays a couple of synthetic tones back-to-back through the default
//! output device, demonstrating gapless enqueue and the notification
//! stream. Requires the `device` feature (`cargo run --features device
//! --bin gapless-demo`).

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use gapless_engine::{
    AudioFormat, Decoder, DecoderError, Engine, EngineConfig, EngineDelegate, FramesProduced,
    Notification, RenderCallback,
};

/// A synthetic sine-wave decoder standing in for a real codec, the way the
/// YM2149 player's demo mode stands in for a loaded file.
struct ToneDecoder {
    frequency_hz: f32,
    format: AudioFormat,
    total_frames: i64,
    position: i64,
}

impl ToneDecoder {
    fn new(frequency_hz: f32, duration_seconds: f32, format: AudioFormat) -> Self {
        Self {
            frequency_hz,
            format,
            total_frames: (duration_seconds * format.sample_rate as f32) as i64,
            position: 0,
        }
    }
}

impl Decoder for ToneDecoder {
    fn open(&mut self) -> Result<(), DecoderError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), DecoderError> {
        Ok(())
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn frame_length(&self) -> i64 {
        self.total_frames
    }

    fn read_audio(&mut self, buffers: &mut [&mut [f32]]) -> Result<FramesProduced, DecoderError> {
        let remaining = (self.total_frames - self.position).max(0) as usize;
        let n = buffers[0].len().min(remaining);
        let sample_rate = self.format.sample_rate as f32;
        for i in 0..n {
            let t = (self.position as usize + i) as f32 / sample_rate;
            let sample = (2.0 * std::f32::consts::PI * self.frequency_hz * t).sin() * 0.2;
            for channel in buffers.iter_mut() {
                channel[i] = sample;
            }
        }
        self.position += n as i64;
        Ok(FramesProduced(n))
    }
}

struct LoggingDelegate;

impl EngineDelegate for LoggingDelegate {
    fn on_notification(&mut self, event: Notification) {
        println!("{event:?}");
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        eprintln!("No audio output device available");
        return;
    };
    let device_config = device.default_output_config().unwrap();
    let format = AudioFormat::new(device_config.sample_rate().0, device_config.channels());

    let (engine, render) =
        Engine::create(EngineConfig::low_latency(format), Box::new(LoggingDelegate))
            .expect("engine creation should not fail with a valid configuration");

    engine
        .enqueue(Box::new(ToneDecoder::new(440.0, 1.0, format)))
        .unwrap();
    engine
        .enqueue(Box::new(ToneDecoder::new(523.25, 1.0, format)))
        .unwrap();
    engine.play();

    let render = Arc::new(Mutex::new(render));
    let channels = format.channels as usize;

    let stream = device
        .build_output_stream(
            &device_config.into(),
            move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                interleave_from_engine(&render, data, channels, info)
            },
            |err| eprintln!("audio stream error: {err}"),
            None,
        )
        .unwrap();
    stream.play().unwrap();

    // Two one-second tones plus headroom for the notification worker to
    // catch up; a real host would drive this off EndOfAudio instead.
    std::thread::sleep(std::time::Duration::from_millis(2500));
    engine.shutdown();
}

/// Render non-interleaved frames from [`RenderCallback`] into cpal's
/// interleaved output buffer.
fn interleave_from_engine(
    render: &Arc<Mutex<RenderCallback>>,
    data: &mut [f32],
    channels: usize,
    info: &cpal::OutputCallbackInfo,
) {
    let frame_count = data.len() / channels;
    let mut scratch: Vec<Vec<f32>> = vec![vec![0.0; frame_count]; channels];
    {
        let mut guard = render.lock().unwrap();
        let mut slices: Vec<&mut [f32]> = scratch.iter_mut().map(|c| c.as_mut_slice()).collect();
        let host_time = info.timestamp().playback.as_nanos() as u64;
        guard.render(host_time, frame_count, &mut slices);
    }
    for frame in 0..frame_count {
        for channel in 0..channels {
            data[frame * channels + channel] = scratch[channel][frame];
        }
    }
}
