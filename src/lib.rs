//! An embeddable, realtime-safe gapless audio player engine core.
//!
//! This crate is the producer/consumer pipeline between PCM decoders and an
//! audio sink: a lock-free single-producer/single-consumer ring buffer, a
//! decoding thread that keeps it fed and opens the next decoder ahead of
//! time for gapless transitions, and a [`RenderCallback`] the host drives
//! from its own realtime audio thread. Codec implementations, tag/metadata
//! parsing, replay-gain, channel-layout enumerations, file I/O, and the
//! host's audio sink or routing graph are all out of scope — see the
//! [`Decoder`] trait for the boundary.
//!
//! ```no_run
//! use gapless_engine::{Engine, EngineConfig, EngineDelegate, AudioFormat, Notification};
//!
//! struct Logger;
//! impl EngineDelegate for Logger {
//!     fn on_notification(&mut self, event: Notification) {
//!         println!("{event:?}");
//!     }
//! }
//!
//! # fn make_decoder() -> Box<dyn gapless_engine::Decoder> { unimplemented!() }
//! let format = AudioFormat::new(44_100, 2);
//! let (engine, mut render) = Engine::create(EngineConfig::stable(format), Box::new(Logger)).unwrap();
//! engine.enqueue(make_decoder()).unwrap();
//! engine.play();
//!
//! // On the host's realtime audio thread:
//! let mut left = [0.0f32; 512];
//! let mut right = [0.0f32; 512];
//! render.render(0, 512, &mut [&mut left, &mut right]);
//! ```

mod config;
mod decoder;
mod decoder_queue;
mod decoder_slots;
mod decoder_state;
mod engine;
mod error;
mod event;
mod format;
mod gc;
mod render;
mod ring_buffer;
mod wake;

pub use config::EngineConfig;
pub use decoder::{ChannelLayout, Decoder, FramesProduced};
pub use decoder_state::{DecoderFlags, DecoderState};
pub use engine::{Engine, EngineDelegate};
pub use error::{DecoderError, EngineError};
pub use event::Notification;
pub use format::{AudioFormat, ChannelMap, FRAMES_UNKNOWN};
pub use render::RenderCallback;
pub use ring_buffer::{RingBuffer, RingBufferError, RingBufferReader, RingBufferWriter};
