//! Context for accessing functionalities of the platform that the
//! machine is emulated on.
//!
//! Presentation, input capture, audio and randomness all live on the
//! host side of this trait; the core itself never touches a display,
//! a key matrix or a clock.

use crate::frame::FrameView;

/// Trait aggregating platform functionalities
pub trait Context {
    /// Present the current frame
    ///
    /// Called after every chip tick, whether or not any pixel changed
    fn on_frame(&mut self, frame: FrameView<'_>);
    /// Turn sound on
    ///
    /// Called while the sound timer is counting down
    fn sound_on(&mut self);
    /// Turn sound off
    ///
    /// Called the instant the sound timer reaches zero
    fn sound_off(&mut self);
    /// Get state of each key on the 4x4 keyboard
    ///
    /// Read once at the start of every chip tick; the last write before
    /// the tick wins
    fn get_keys(&mut self) -> &[bool; 16];
    /// Generate random 8-bit number
    ///
    /// Called whenever the executing program requests one
    fn gen_random(&mut self) -> u8;
}
