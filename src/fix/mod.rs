//! FIX 4.2 wire layer: tag constants, message representation, and codec.

pub mod codec;
pub mod message;
pub mod tag;

pub use codec::{encode, FixDecoder, FramingError};
pub use message::FixMessage;
