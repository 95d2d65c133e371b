#![no_std]
pub mod builder;
pub mod context;
pub mod error;
pub mod frame;
pub mod opcode;
pub mod plum;
pub mod timer;

#[cfg(feature = "embedded-graphics")]
pub use embedded_graphics;

pub use builder::Builder;
pub use context::Context;
pub use error::Error;
pub use frame::{Frame, FrameView};
pub use opcode::OpCode;
pub use plum::{Plum8, Quirks};
