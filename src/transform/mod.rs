//! Canvas transforms and codecs.
//!
//! Stages here consume the current canvas and return a new one. Decoding and
//! encoding sit at the edges of a run; nothing in between sees bytes.

pub mod codec;
pub mod quality;
pub mod resize;

pub use codec::{decode_image, encode, DecodedImage, EncoderFactory, ImageEncoder, OutputFormat};
pub use quality::{Quality, MAX_QUALITY};
pub use resize::{resize_rgba, target_dimensions, ResizeMode, ResizeOptions};
