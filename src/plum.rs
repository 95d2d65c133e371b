use core::convert::TryFrom;

use heapless::{consts::U16, Vec};
use log::{debug, trace};

use crate::context::Context;
use crate::error::{Error, MAX_PROGRAM_LEN};
use crate::frame::{Frame, FrameView};
use crate::opcode::OpCode;
use crate::timer::{Timer, TimerState};

/// Address programs are loaded at and execution starts from
const PROG_START: u16 = 0x200;

/// Built-in character sprites, one 5-byte glyph per hex digit,
/// installed at 0x000 on power-on
#[rustfmt::skip]
const FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

/// Compatibility profile for the historically ambiguous shift opcodes
///
/// By default `8XY6`/`8XYE` shift VX in place and leave VF alone.
/// [`Quirks::cosmac`] selects the COSMAC VIP interpretation instead,
/// for programs that depend on it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Quirks {
    /// `8XY6`/`8XYE` shift the value of VY instead of VX
    pub shift_source_vy: bool,
    /// `8XY6`/`8XYE` store the shifted-out bit in VF
    pub shift_sets_vf: bool,
}

impl Quirks {
    /// COSMAC VIP shifts: VX becomes VY shifted, VF holds the shifted-out bit
    pub fn cosmac() -> Self {
        Self {
            shift_source_vy: true,
            shift_sets_vf: true,
        }
    }
}

pub struct Plum8<C: Context + Sized> {
    pub ctx: C,
    quirks: Quirks,
    v: [u8; 16],
    i: u16,
    pc: u16,
    frame: Frame,
    memory: [u8; 4096],
    stack: Vec<u16, U16>,
    keys: [bool; 16],
    delay_timer: Timer,
    sound_timer: Timer,
}

impl<C: Context + Sized> Plum8<C> {
    /// Create a machine in its power-on state: cleared registers and
    /// display, font table installed, pc at the program start address
    pub fn new(ctx: C) -> Self {
        let mut memory = [0u8; 4096];
        memory[..FONT.len()].copy_from_slice(&FONT);
        Self {
            ctx,
            quirks: Quirks::default(),
            v: [0; 16],
            i: 0,
            pc: PROG_START,
            frame: Frame::new(),
            memory,
            stack: Vec::new(),
            keys: [false; 16],
            delay_timer: Timer::new(),
            sound_timer: Timer::new(),
        }
    }

    /// Create a machine with a program already in memory
    pub fn load(ctx: C, prog: &[u8]) -> Result<Self, Error> {
        let mut chip = Self::new(ctx);
        chip.load_program(prog)?;
        Ok(chip)
    }

    /// Select a compatibility profile
    pub fn with_quirks(mut self, quirks: Quirks) -> Self {
        self.quirks = quirks;
        self
    }

    /// The active compatibility profile
    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    /// Copy a program image to memory at the program start address
    ///
    /// Images are limited to 0xC9F bytes so that the region above 0xEA0
    /// stays reserved for the classic stack/variables/display areas.
    /// Nothing is copied when the image is rejected.
    pub fn load_program(&mut self, prog: &[u8]) -> Result<(), Error> {
        if prog.len() > MAX_PROGRAM_LEN {
            return Err(Error::ImageTooLarge { len: prog.len() });
        }
        let start = PROG_START as usize;
        self.memory[start..start + prog.len()].copy_from_slice(prog);
        debug!("loaded {} byte program at {:#05X}", prog.len(), PROG_START);
        Ok(())
    }

    /// Return to the power-on state, keeping the context and quirks
    pub fn reset(&mut self) {
        debug!("reset to power-on state");
        self.v = [0; 16];
        self.i = 0;
        self.pc = PROG_START;
        self.frame.clear();
        self.memory = [0; 4096];
        self.memory[..FONT.len()].copy_from_slice(&FONT);
        self.stack.clear();
        self.keys = [false; 16];
        self.delay_timer.set(0);
        self.sound_timer.set(0);
    }

    /// View the current frame
    pub fn frame(&self) -> FrameView<'_> {
        self.frame.view()
    }

    /// Execute one instruction
    ///
    /// Snapshots the keypad, fetches and decodes the word at pc, runs
    /// it, then hands the frame to the context. `Err(WouldBlock)` means
    /// an `FX0A` key-wait is unsatisfied and the same instruction will
    /// run again next tick; `Err(Other)` carries a machine fault.
    pub fn tick_chip(&mut self) -> nb::Result<(), Error> {
        self.keys = *self.ctx.get_keys();
        let at = self.pc;
        let raw = self.fetch();
        trace!("pc {:#05X} op {:#06X}", at, raw);
        let opcode =
            OpCode::try_from(raw).map_err(|_| Error::UnknownOpcode { opcode: raw, pc: at })?;
        let res = self.execute(opcode);
        self.ctx.on_frame(self.frame.view());
        res
    }

    /// Count both timers down one step
    ///
    /// The context is told to keep sound on while the sound timer runs
    /// and to stop it the instant the timer reaches zero.
    pub fn tick_timers(&mut self) {
        let _ = self.delay_timer.tick();
        match self.sound_timer.tick() {
            TimerState::Active => self.ctx.sound_on(),
            TimerState::Expired => self.ctx.sound_off(),
            TimerState::Idle => (),
        }
    }

    /// Advance one full cycle: one instruction, then one timer step
    ///
    /// Timers still count on key-wait cycles; they stop only when the
    /// instruction itself faulted.
    pub fn tick(&mut self) -> nb::Result<(), Error> {
        match self.tick_chip() {
            Err(nb::Error::Other(fault)) => Err(nb::Error::Other(fault)),
            res => {
                self.tick_timers();
                res
            }
        }
    }

    /// Read the big-endian instruction word at pc and advance pc past
    /// it, before dispatch, so jump handlers can assign pc directly
    fn fetch(&mut self) -> u16 {
        let hi = self.read_byte(self.pc);
        let lo = self.read_byte(self.pc.wrapping_add(1));
        self.pc = self.pc.wrapping_add(2);
        u16::from(hi) << 8 | u16::from(lo)
    }

    /// Address of the instruction currently being executed
    fn fault_pc(&self) -> u16 {
        self.pc.wrapping_sub(2)
    }

    /// Memory reads on behalf of a program see 12-bit addresses
    fn read_byte(&self, addr: u16) -> u8 {
        self.memory[(addr & 0x0FFF) as usize]
    }

    fn write_byte(&mut self, addr: u16, value: u8) {
        self.memory[(addr & 0x0FFF) as usize] = value;
    }

    fn skip_next(&mut self) {
        self.pc = self.pc.wrapping_add(2);
    }
}

// OpCodes impls
impl<C: Context + Sized> Plum8<C> {
    #[rustfmt::skip]
    fn execute(&mut self, opcode: OpCode) -> nb::Result<(), Error> {
        match opcode {
            OpCode::_00E0             => self.clear_screen(),
            OpCode::_00EE             => self.subroutine_return()?,
            OpCode::_1NNN { nnn }     => self.jump_to(nnn),
            OpCode::_2NNN { nnn }     => self.exec_subroutine_at(nnn)?,
            OpCode::_3XNN { x, nn }   => self.skip_if_vx_eq_nn(x, nn),
            OpCode::_4XNN { x, nn }   => self.skip_if_vx_ne_nn(x, nn),
            OpCode::_5XY0 { x, y }    => self.skip_if_vx_eq_vy(x, y),
            OpCode::_6XNN { x, nn }   => self.assign_vx_nn(x, nn),
            OpCode::_7XNN { x, nn }   => self.assign_add_vx_nn(x, nn),
            OpCode::_8XY0 { x, y }    => self.assign_vx_vy(x, y),
            OpCode::_8XY1 { x, y }    => self.assign_or_vx_vy(x, y),
            OpCode::_8XY2 { x, y }    => self.assign_and_vx_vy(x, y),
            OpCode::_8XY3 { x, y }    => self.assign_xor_vx_vy(x, y),
            OpCode::_8XY4 { x, y }    => self.assign_add_vx_vy(x, y),
            OpCode::_8XY5 { x, y }    => self.assign_sub_vx_vy(x, y),
            OpCode::_8XY6 { x, y }    => self.assign_vx_shifted_r(x, y),
            OpCode::_8XY7 { x, y }    => self.assign_vx_vy_sub_vx(x, y),
            OpCode::_8XYE { x, y }    => self.assign_vx_shifted_l(x, y),
            OpCode::_9XY0 { x, y }    => self.skip_if_vx_ne_vy(x, y),
            OpCode::_ANNN { nnn }     => self.assign_i_nnn(nnn),
            OpCode::_BNNN { nnn }     => self.jump_to_nnn_add_v0(nnn),
            OpCode::_CXNN { x, nn }   => self.assign_vx_random_and_nn(x, nn),
            OpCode::_DXYN { x, y, n } => self.draw_n_at_vx_vy(x, y, n),
            OpCode::_EX9E { x }       => self.skip_if_vx_in_keys(x),
            OpCode::_EXA1 { x }       => self.skip_if_vx_not_in_keys(x),
            OpCode::_FX07 { x }       => self.assign_vx_delay_t(x),
            OpCode::_FX0A { x }       => return self.assign_vx_wait_for_key(x),
            OpCode::_FX15 { x }       => self.assign_delay_t_vx(x),
            OpCode::_FX18 { x }       => self.assign_sound_t_vx(x),
            OpCode::_FX1E { x }       => self.assign_add_i_vx(x),
            OpCode::_FX29 { x }       => self.assign_i_addr_of_sprite_vx(x),
            OpCode::_FX33 { x }       => self.assign_mem_at_i_bcd_of_vx(x),
            OpCode::_FX55 { x }       => self.assign_mem_at_i_v0_to_vx(x),
            OpCode::_FX65 { x }       => self.assign_v0_to_vx_mem_at_i(x),
        }
        Ok(())
    }

    /// Clear the screen
    /// 00E0,
    fn clear_screen(&mut self) {
        self.frame.clear();
    }

    /// Return from a subroutine
    /// 00EE,
    fn subroutine_return(&mut self) -> Result<(), Error> {
        let at = self.fault_pc();
        self.pc = self.stack.pop().ok_or(Error::StackUnderflow {
            opcode: 0x00EE,
            pc: at,
        })?;
        Ok(())
    }

    /// Jump to address NNN
    /// 1NNN { nnn: u16 },
    fn jump_to(&mut self, nnn: u16) {
        self.pc = nnn;
    }

    /// Execute subroutine starting at address NNN
    /// 2NNN { nnn: u16 },
    fn exec_subroutine_at(&mut self, nnn: u16) -> Result<(), Error> {
        let at = self.fault_pc();
        self.stack.push(self.pc).map_err(|_| Error::StackOverflow {
            opcode: 0x2000 | nnn,
            pc: at,
        })?;
        self.pc = nnn;
        Ok(())
    }

    /// Skip the following instruction if the value of register VX equals NN
    /// 3XNN { x: u8, nn: u8 },
    fn skip_if_vx_eq_nn(&mut self, x: u8, nn: u8) {
        if self.v[x as usize] == nn {
            self.skip_next();
        }
    }

    /// Skip the following instruction if the value of register VX is not equal to NN
    /// 4XNN { x: u8, nn: u8 },
    fn skip_if_vx_ne_nn(&mut self, x: u8, nn: u8) {
        if self.v[x as usize] != nn {
            self.skip_next();
        }
    }

    /// Skip the following instruction if the value of register VX is equal to the value of register VY
    /// 5XY0 { x: u8, y: u8 },
    fn skip_if_vx_eq_vy(&mut self, x: u8, y: u8) {
        if self.v[x as usize] == self.v[y as usize] {
            self.skip_next();
        }
    }

    /// Store number NN in register VX
    /// 6XNN { x: u8, nn: u8 },
    fn assign_vx_nn(&mut self, x: u8, nn: u8) {
        self.v[x as usize] = nn;
    }

    /// Add the value NN to register VX, wrapping, without touching VF
    /// 7XNN { x: u8, nn: u8 },
    fn assign_add_vx_nn(&mut self, x: u8, nn: u8) {
        self.v[x as usize] = self.v[x as usize].wrapping_add(nn);
    }

    /// Store the value of register VY in register VX
    /// 8XY0 { x: u8, y: u8 },
    fn assign_vx_vy(&mut self, x: u8, y: u8) {
        self.v[x as usize] = self.v[y as usize];
    }

    /// Set VX to VX OR VY
    /// 8XY1 { x: u8, y: u8 },
    fn assign_or_vx_vy(&mut self, x: u8, y: u8) {
        self.v[x as usize] |= self.v[y as usize];
    }

    /// Set VX to VX AND VY
    /// 8XY2 { x: u8, y: u8 },
    fn assign_and_vx_vy(&mut self, x: u8, y: u8) {
        self.v[x as usize] &= self.v[y as usize];
    }

    /// Set VX to VX XOR VY
    /// 8XY3 { x: u8, y: u8 },
    fn assign_xor_vx_vy(&mut self, x: u8, y: u8) {
        self.v[x as usize] ^= self.v[y as usize];
    }

    /// Add the value of register VY to register VX, Set VF to 01 if a carry occurs, Set VF to 00 if a carry does not occur
    /// 8XY4 { x: u8, y: u8 },
    fn assign_add_vx_vy(&mut self, x: u8, y: u8) {
        let (value, overflow) = self.v[x as usize].overflowing_add(self.v[y as usize]);
        self.v[x as usize] = value;
        self.v[15] = if overflow { 0x01u8 } else { 0x00u8 };
    }

    /// Subtract the value of register VY from register VX, Set VF to 00 if a borrow occurs, Set VF to 01 if a borrow does not occur
    /// 8XY5 { x: u8, y: u8 },
    fn assign_sub_vx_vy(&mut self, x: u8, y: u8) {
        let (value, borrow) = self.v[x as usize].overflowing_sub(self.v[y as usize]);
        self.v[x as usize] = value;
        self.v[15] = if borrow { 0x00u8 } else { 0x01u8 };
    }

    /// Shift right one bit; the quirks profile picks the source register
    /// and whether VF receives the shifted-out bit
    /// 8XY6 { x: u8, y: u8 },
    fn assign_vx_shifted_r(&mut self, x: u8, y: u8) {
        let source = if self.quirks.shift_source_vy {
            self.v[y as usize]
        } else {
            self.v[x as usize]
        };
        self.v[x as usize] = source >> 1;
        if self.quirks.shift_sets_vf {
            self.v[15] = source & 1u8;
        }
    }

    /// Set register VX to the value of VY minus VX, Set VF to 00 if a borrow occurs, Set VF to 01 if a borrow does not occur
    /// 8XY7 { x: u8, y: u8 },
    fn assign_vx_vy_sub_vx(&mut self, x: u8, y: u8) {
        let (value, borrow) = self.v[y as usize].overflowing_sub(self.v[x as usize]);
        self.v[x as usize] = value;
        self.v[15] = if borrow { 0x00u8 } else { 0x01u8 };
    }

    /// Shift left one bit; the quirks profile picks the source register
    /// and whether VF receives the shifted-out bit
    /// 8XYE { x: u8, y: u8 },
    fn assign_vx_shifted_l(&mut self, x: u8, y: u8) {
        let source = if self.quirks.shift_source_vy {
            self.v[y as usize]
        } else {
            self.v[x as usize]
        };
        self.v[x as usize] = source << 1;
        if self.quirks.shift_sets_vf {
            self.v[15] = source >> 7;
        }
    }

    /// Skip the following instruction if the value of register VX is not equal to the value of register VY
    /// 9XY0 { x: u8, y: u8 },
    fn skip_if_vx_ne_vy(&mut self, x: u8, y: u8) {
        if self.v[x as usize] != self.v[y as usize] {
            self.skip_next();
        }
    }

    /// Store memory address NNN in register I
    /// ANNN { nnn: u16 },
    fn assign_i_nnn(&mut self, nnn: u16) {
        self.i = nnn;
    }

    /// Jump to address NNN + V0; the sum is stored untruncated, the next
    /// fetch masks it to the address space
    /// BNNN { nnn: u16 },
    fn jump_to_nnn_add_v0(&mut self, nnn: u16) {
        self.pc = nnn + self.v[0] as u16;
    }

    /// Set VX to a random number with a mask of NN
    /// CXNN { x: u8, nn: u8 },
    fn assign_vx_random_and_nn(&mut self, x: u8, nn: u8) {
        self.v[x as usize] = self.ctx.gen_random() & nn;
    }

    /// Draw a sprite at position VX, VY with N bytes of sprite data starting at the address stored in I, Set VF to 01 if any set pixels are changed to unset, and 00 otherwise
    ///
    /// Pixels are XORed onto the frame and wrap at the display edges.
    /// DXYN { x: u8, y: u8, n: u8 },
    fn draw_n_at_vx_vy(&mut self, x: u8, y: u8, n: u8) {
        let col = self.v[x as usize] as usize;
        let row = self.v[y as usize] as usize;
        let mut collision = false;
        for line in 0..n as usize {
            let sprite = self.read_byte(self.i.wrapping_add(line as u16));
            for bit in 0..8usize {
                let px = sprite & (0x80 >> bit) != 0;
                collision |= self.frame.xor_bit(col + bit, row + line, px);
            }
        }
        self.v[15] = collision as u8;
    }

    /// Skip the following instruction if the key corresponding to the hex value currently stored in register VX is pressed
    ///
    /// Only the low nibble of VX selects a key.
    /// EX9E { x: u8 },
    fn skip_if_vx_in_keys(&mut self, x: u8) {
        if self.keys[(self.v[x as usize] & 0x0F) as usize] {
            self.skip_next();
        }
    }

    /// Skip the following instruction if the key corresponding to the hex value currently stored in register VX is not pressed
    /// EXA1 { x: u8 },
    fn skip_if_vx_not_in_keys(&mut self, x: u8) {
        if !self.keys[(self.v[x as usize] & 0x0F) as usize] {
            self.skip_next();
        }
    }

    /// Store the current value of the delay timer in register VX
    /// FX07 { x: u8 },
    fn assign_vx_delay_t(&mut self, x: u8) {
        self.v[x as usize] = self.delay_timer.get();
    }

    /// Wait for a keypress and store the result in register VX
    ///
    /// Never blocks: with no key down, pc is rewound over this
    /// instruction and `WouldBlock` tells the host to come back. The
    /// lowest-numbered pressed key wins.
    /// FX0A { x: u8 },
    fn assign_vx_wait_for_key(&mut self, x: u8) -> nb::Result<(), Error> {
        match self.keys.iter().position(|&key| key) {
            Some(key) => {
                self.v[x as usize] = key as u8;
                Ok(())
            }
            None => {
                self.pc = self.pc.wrapping_sub(2);
                Err(nb::Error::WouldBlock)
            }
        }
    }

    /// Set the delay timer to the value of register VX
    /// FX15 { x: u8 },
    fn assign_delay_t_vx(&mut self, x: u8) {
        self.delay_timer.set(self.v[x as usize]);
    }

    /// Set the sound timer to the value of register VX
    /// FX18 { x: u8 },
    fn assign_sound_t_vx(&mut self, x: u8) {
        self.sound_timer.set(self.v[x as usize]);
    }

    /// Add the value stored in register VX to register I, wrapping at 16 bits
    /// FX1E { x: u8 },
    fn assign_add_i_vx(&mut self, x: u8) {
        self.i = self.i.wrapping_add(self.v[x as usize] as u16);
    }

    /// Set I to the memory address of the sprite data corresponding to the hexadecimal digit stored in register VX
    ///
    /// Glyphs are 5 bytes each from address zero; values of VX above 0xF
    /// point past the font table and are meaningless.
    /// FX29 { x: u8 },
    fn assign_i_addr_of_sprite_vx(&mut self, x: u8) {
        self.i = self.v[x as usize] as u16 * 5;
    }

    /// Store the binary-coded decimal equivalent of the value stored in register VX at addresses I, I+1, and I+2
    /// FX33 { x: u8 },
    fn assign_mem_at_i_bcd_of_vx(&mut self, x: u8) {
        let value = self.v[x as usize];
        self.write_byte(self.i, value / 100u8);
        self.write_byte(self.i.wrapping_add(1), (value % 100) / 10u8);
        self.write_byte(self.i.wrapping_add(2), value % 10u8);
    }

    /// Store the values of registers V0 to VX inclusive in memory starting at address I; I is unmodified
    /// FX55 { x: u8 },
    fn assign_mem_at_i_v0_to_vx(&mut self, x: u8) {
        for idx in 0..=x {
            self.write_byte(self.i.wrapping_add(idx as u16), self.v[idx as usize]);
        }
    }

    /// Fill registers V0 to VX inclusive with the values stored in memory starting at address I; I is unmodified
    /// FX65 { x: u8 },
    fn assign_v0_to_vx_mem_at_i(&mut self, x: u8) {
        for idx in 0..=x {
            self.v[idx as usize] = self.read_byte(self.i.wrapping_add(idx as u16));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::TestingContext;

    #[test]
    fn power_on_state() {
        let chip = Plum8::new(TestingContext::new(0));
        assert_eq!(chip.pc, PROG_START);
        assert_eq!(chip.i, 0);
        assert_eq!(chip.v, [0; 16]);
        assert!(chip.stack.is_empty());
        assert_eq!(chip.delay_timer.get(), 0);
        assert_eq!(chip.sound_timer.get(), 0);
        assert_eq!(&chip.memory[..5], &[0xF0, 0x90, 0x90, 0x90, 0xF0]);
        assert_eq!(&chip.memory[75..80], &[0xF0, 0x80, 0xF0, 0x80, 0x80]);
        assert!(chip.memory[80..].iter().all(|&byte| byte == 0));
    }

    #[test]
    fn load_program_copies_to_start_address() {
        let mut chip = Plum8::new(TestingContext::new(0));
        chip.load_program(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        assert_eq!(&chip.memory[0x200..0x204], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(chip.memory[0x204..].iter().all(|&byte| byte == 0));
    }

    #[test]
    fn load_program_accepts_the_largest_image() {
        let mut chip = Plum8::new(TestingContext::new(0));
        let image = [0xAAu8; MAX_PROGRAM_LEN];
        chip.load_program(&image).unwrap();
        assert_eq!(chip.memory[0x200 + MAX_PROGRAM_LEN - 1], 0xAA);
    }

    #[test]
    fn load_program_rejects_oversized_image_without_copying() {
        let mut chip = Plum8::new(TestingContext::new(0));
        let image = [0xAAu8; MAX_PROGRAM_LEN + 1];
        assert_eq!(
            chip.load_program(&image),
            Err(Error::ImageTooLarge {
                len: MAX_PROGRAM_LEN + 1
            }),
        );
        assert!(chip.memory[0x200..].iter().all(|&byte| byte == 0));
    }

    #[test]
    fn reset_restores_power_on_state() {
        let mut chip = Plum8::load(TestingContext::new(0), &[0x63, 0x0A]).unwrap();
        chip.tick().unwrap();
        chip.i = 0x300;
        chip.sound_timer.set(9);
        chip.frame.xor_bit(0, 0, true);
        chip.stack.push(0x204).unwrap();

        chip.reset();
        assert_eq!(chip.pc, PROG_START);
        assert_eq!(chip.i, 0);
        assert_eq!(chip.v, [0; 16]);
        assert!(chip.stack.is_empty());
        assert_eq!(chip.sound_timer.get(), 0);
        assert_eq!(chip.frame.view().get_bit(0, 0), Some(&false));
        assert!(chip.memory[0x200..].iter().all(|&byte| byte == 0));
        assert_eq!(&chip.memory[..5], &[0xF0, 0x90, 0x90, 0x90, 0xF0]);
    }

    #[test]
    fn fetch_is_big_endian_and_advances_pc() {
        let mut chip = Plum8::load(TestingContext::new(0), &[0xAB, 0xCD]).unwrap();
        assert_eq!(chip.fetch(), 0xABCD);
        assert_eq!(chip.pc, PROG_START + 2);
    }

    #[test]
    fn fetch_masks_pc_to_address_space() {
        let mut chip = Plum8::new(TestingContext::new(0));
        chip.memory[0x0FE] = 0x12;
        chip.memory[0x0FF] = 0x34;
        chip.pc = 0x10FE;
        assert_eq!(chip.fetch(), 0x1234);
        assert_eq!(chip.pc, 0x1100);
    }
}


// Whole-program scenarios driven through tick
#[cfg(test)]
mod program_tests {
    use super::*;
    use crate::context::testing::TestingContext;

    fn run(chip: &mut Plum8<TestingContext>, cycles: usize) {
        for _ in 0..cycles {
            chip.tick().unwrap();
        }
    }

    #[test]
    fn arithmetic_program() {
        // V0 = 5; V1 = 3; V0 += V1
        let prog = [0x60, 0x05, 0x61, 0x03, 0x80, 0x14];
        let mut chip = Plum8::load(TestingContext::new(0), &prog).unwrap();

        run(&mut chip, 3);
        assert_eq!(chip.v[0], 8);
        assert_eq!(chip.v[1], 3);
        assert_eq!(chip.v[15], 0);
        assert_eq!(chip.pc, 0x206);
    }

    #[test]
    fn glyph_draw_program() {
        // I = 0; V3 = 0xA; I = glyph address for VA; draw 5 rows at (V0, V0)
        let prog = [0xA0, 0x00, 0x63, 0x0A, 0xF3, 0x29, 0xD0, 0x05];
        let mut chip = Plum8::load(TestingContext::new(0), &prog).unwrap();

        run(&mut chip, 4);
        assert_eq!(chip.i, 0x0A * 5);
        assert_eq!(chip.v[15], 0);
        let glyph = &FONT[0x0A * 5..0x0A * 5 + 5];
        for (row, &expected) in glyph.iter().enumerate() {
            for col in 0..8 {
                let lit = expected & (0x80 >> col) != 0;
                assert_eq!(chip.frame().get_bit(col, row), Some(&lit));
            }
        }
    }

    #[test]
    fn nested_calls_overflow_on_the_seventeenth() {
        // 18 consecutive calls, each to the next address
        let mut prog = [0u8; 36];
        for call in 0..18 {
            let target = 0x202u16 + call as u16 * 2;
            prog[call * 2] = 0x20 | (target >> 8) as u8;
            prog[call * 2 + 1] = (target & 0xFF) as u8;
        }
        let mut chip = Plum8::load(TestingContext::new(0), &prog).unwrap();

        run(&mut chip, 16);
        assert_eq!(chip.stack.len(), 16);
        assert_eq!(
            chip.tick(),
            Err(nb::Error::Other(Error::StackOverflow {
                opcode: 0x2222,
                pc: 0x220,
            })),
        );
    }

    #[test]
    fn return_with_empty_stack_underflows() {
        let prog = [0x00, 0xEE];
        let mut chip = Plum8::load(TestingContext::new(0), &prog).unwrap();

        assert_eq!(
            chip.tick(),
            Err(nb::Error::Other(Error::StackUnderflow {
                opcode: 0x00EE,
                pc: 0x200,
            })),
        );
    }

    #[test]
    fn unknown_opcode_names_the_instruction_and_address() {
        let prog = [0x60, 0x00, 0xFF, 0xFF];
        let mut chip = Plum8::load(TestingContext::new(0), &prog).unwrap();

        chip.tick().unwrap();
        assert_eq!(
            chip.tick(),
            Err(nb::Error::Other(Error::UnknownOpcode {
                opcode: 0xFFFF,
                pc: 0x202,
            })),
        );
    }

    #[test]
    fn key_wait_reruns_until_a_key_is_down() {
        let prog = [0xF3, 0x0A];
        let mut chip = Plum8::load(TestingContext::new(0), &prog).unwrap();

        for _ in 0..3 {
            assert_eq!(chip.tick(), Err(nb::Error::WouldBlock));
            assert_eq!(chip.pc, 0x200);
        }

        chip.ctx.set_key(3);
        chip.tick().unwrap();
        assert_eq!(chip.v[3], 3);
        assert_eq!(chip.pc, 0x202);
    }

    #[test]
    fn timers_count_down_while_waiting_for_a_key() {
        // delay = V2 = 9, then wait for a key
        let prog = [0x62, 0x09, 0xF2, 0x15, 0xF0, 0x0A];
        let mut chip = Plum8::load(TestingContext::new(0), &prog).unwrap();

        run(&mut chip, 2);
        assert_eq!(chip.delay_timer.get(), 8);

        for _ in 0..3 {
            assert_eq!(chip.tick(), Err(nb::Error::WouldBlock));
        }
        assert_eq!(chip.delay_timer.get(), 5);
    }

    #[test]
    fn sound_timer_drives_the_context() {
        // V2 = 2; sound = V2; loop
        let prog = [0x62, 0x02, 0xF2, 0x18, 0x12, 0x04];
        let mut chip = Plum8::load(TestingContext::new(0), &prog).unwrap();

        chip.tick().unwrap();
        assert!(!chip.ctx.is_sound_on());

        // setting the timer, then the first countdown step keeps sound on
        chip.tick().unwrap();
        assert!(chip.ctx.is_sound_on());

        // 1 -> 0 turns it off
        chip.tick().unwrap();
        assert!(!chip.ctx.is_sound_on());
        assert_eq!(chip.sound_timer.get(), 0);
    }

    #[test]
    fn delay_timer_readback() {
        // delay = V2 = 3; V3 = delay
        let prog = [0x62, 0x03, 0xF2, 0x15, 0xF3, 0x07];
        let mut chip = Plum8::load(TestingContext::new(0), &prog).unwrap();

        run(&mut chip, 3);
        // one step elapsed between store and read
        assert_eq!(chip.v[3], 2);
        assert_eq!(chip.delay_timer.get(), 1);
    }

    #[test]
    fn frame_reaches_the_context_every_cycle() {
        let prog = [0x60, 0x00];
        let mut chip = Plum8::load(TestingContext::new(0), &prog).unwrap();
        assert!(chip.ctx.get_frame().is_none());

        chip.tick().unwrap();
        assert!(chip.ctx.get_frame().is_some());
    }
}
