//! Utility modules

pub mod audio_decoder;
pub mod no_clobber;

pub use audio_decoder::{decode_interleaved, DecodeStats, StreamInfo};
pub use no_clobber::move_no_clobber;
