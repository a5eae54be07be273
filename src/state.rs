use crate::display::Framebuffer;
use crate::error::{Chip8Error, Result};

pub type Timer = u8;
pub type Address = u16;

pub const MEM_SIZE: usize = 4096;
pub const FONT_ADDR: usize = 0x50;
pub const FONT_HEIGHT: usize = 5;
pub const PC_START_ADDR: Address = 0x200;
pub const NUM_REGISTERS: usize = 16;
pub const NUM_KEYS: usize = 16;
pub const STACK_SIZE: usize = 16;

/// Hex digit glyphs 0-F, five rows of four pixels each (high nibble).
pub const FONT_SET: [u8; 16 * FONT_HEIGHT] = [
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

pub struct Memory {
    data: [u8; MEM_SIZE],
}
impl Memory {
    pub fn new() -> Self {
        Memory {
            data: [0; MEM_SIZE],
        }
    }

    pub fn load_font(&mut self) {
        self.data[FONT_ADDR..FONT_ADDR + FONT_SET.len()].copy_from_slice(&FONT_SET);
    }

    pub fn read(&self, addr: usize) -> Result<u8> {
        self.data
            .get(addr)
            .copied()
            .ok_or(Chip8Error::MemoryOutOfBounds { address: addr })
    }

    pub fn write(&mut self, addr: usize, value: u8) -> Result<()> {
        let cell = self
            .data
            .get_mut(addr)
            .ok_or(Chip8Error::MemoryOutOfBounds { address: addr })?;
        *cell = value;
        Ok(())
    }

    /// Borrows `len` consecutive bytes starting at `addr`.
    pub fn read_block(&self, addr: usize, len: usize) -> Result<&[u8]> {
        let end = Self::checked_end(addr, len)?;
        Ok(&self.data[addr..end])
    }

    /// Copies `bytes` to `addr`. The whole range is validated before anything is written.
    pub fn write_block(&mut self, addr: usize, bytes: &[u8]) -> Result<()> {
        let end = Self::checked_end(addr, bytes.len())?;
        self.data[addr..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn load_rom(&mut self, rom: &[u8]) -> Result<()> {
        let start = usize::from(PC_START_ADDR);
        if rom.len() > MEM_SIZE - start {
            return Err(Chip8Error::RomTooLarge {
                size: rom.len(),
                max_size: MEM_SIZE - start,
            });
        }
        self.data[start..start + rom.len()].copy_from_slice(rom);
        Ok(())
    }

    fn checked_end(addr: usize, len: usize) -> Result<usize> {
        match addr.checked_add(len) {
            Some(end) if end <= MEM_SIZE => Ok(end),
            // Report the first address that falls outside memory.
            _ => Err(Chip8Error::MemoryOutOfBounds {
                address: addr.max(MEM_SIZE),
            }),
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register {
    V0,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
    V9,
    VA,
    VB,
    VC,
    VD,
    VE,
    VF,
}
impl Register {
    pub const ALL: [Register; NUM_REGISTERS] = [
        Register::V0,
        Register::V1,
        Register::V2,
        Register::V3,
        Register::V4,
        Register::V5,
        Register::V6,
        Register::V7,
        Register::V8,
        Register::V9,
        Register::VA,
        Register::VB,
        Register::VC,
        Register::VD,
        Register::VE,
        Register::VF,
    ];

    /// Only the low nibble is considered, so every value names a register.
    pub fn from_nibble(value: u8) -> Self {
        Self::ALL[usize::from(value & 0x0F)]
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

pub struct RegisterBank {
    registers: [u8; NUM_REGISTERS],
}
impl RegisterBank {
    pub fn new() -> Self {
        RegisterBank {
            registers: [0; NUM_REGISTERS],
        }
    }

    pub fn read(&self, reg: Register) -> u8 {
        self.registers[reg.index()]
    }

    pub fn write(&mut self, reg: Register, value: u8) {
        self.registers[reg.index()] = value;
    }

    /// Registers V0 through `last`, inclusive.
    pub fn range_through(&self, last: Register) -> &[u8] {
        &self.registers[..=last.index()]
    }

    pub fn range_through_mut(&mut self, last: Register) -> &mut [u8] {
        &mut self.registers[..=last.index()]
    }
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

/// Return addresses for nested subroutine calls.
///
/// `sp` is the number of occupied slots: push writes then increments, pop
/// decrements then reads.
pub struct CallStack {
    slots: [Address; STACK_SIZE],
    sp: usize,
}
impl CallStack {
    pub fn new() -> Self {
        CallStack {
            slots: [0; STACK_SIZE],
            sp: 0,
        }
    }

    pub fn push(&mut self, addr: Address) -> Result<()> {
        let slot = self.slots.get_mut(self.sp).ok_or(Chip8Error::StackOverflow)?;
        *slot = addr;
        self.sp += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Address> {
        if self.sp == 0 {
            return Err(Chip8Error::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.slots[self.sp])
    }

    pub fn depth(&self) -> usize {
        self.sp
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Key0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF,
}
impl Key {
    pub const ALL: [Key; NUM_KEYS] = [
        Key::Key0,
        Key::Key1,
        Key::Key2,
        Key::Key3,
        Key::Key4,
        Key::Key5,
        Key::Key6,
        Key::Key7,
        Key::Key8,
        Key::Key9,
        Key::KeyA,
        Key::KeyB,
        Key::KeyC,
        Key::KeyD,
        Key::KeyE,
        Key::KeyF,
    ];

    /// Register values above 0xF select the key named by their low nibble.
    pub fn from_nibble(value: u8) -> Self {
        Self::ALL[usize::from(value & 0x0F)]
    }

    pub fn index(self) -> u8 {
        self as u8
    }
}

pub struct Keypad {
    keys: [bool; NUM_KEYS],
}
impl Keypad {
    pub fn new() -> Self {
        Keypad {
            keys: [false; NUM_KEYS],
        }
    }

    pub fn set(&mut self, key: Key, pressed: bool) {
        self.keys[usize::from(key.index())] = pressed;
    }

    pub fn press_key(&mut self, key: Key) {
        self.set(key, true);
    }

    pub fn release_key(&mut self, key: Key) {
        self.set(key, false);
    }

    pub fn release_all(&mut self) {
        self.keys.fill(false);
    }

    pub fn is_key_pressed(&self, key: Key) -> bool {
        self.keys[usize::from(key.index())]
    }

    /// Lowest-numbered key currently held down.
    pub fn first_pressed(&self) -> Option<Key> {
        Key::ALL.into_iter().find(|&key| self.is_key_pressed(key))
    }
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}

/// Behavioural switches for ROMs written against older CHIP-8 variants.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    /// 8xy6/8xyE shift Vy into Vx instead of shifting Vx in place.
    pub shift_uses_vy: bool,
    /// 8xy1/8xy2/8xy3 clear VF.
    pub logic_resets_vf: bool,
    /// Fx55/Fx65 leave I pointing one past the last byte transferred.
    pub load_store_increments_index: bool,
    /// Sprite pixels past the right or bottom edge are dropped instead of wrapping.
    pub clip_sprites: bool,
    /// Emit a warning for every opcode that decodes to nothing.
    pub report_unknown_opcodes: bool,
}

pub struct Chip8State {
    pub config: Config,
    pub memory: Memory,
    pub registers: RegisterBank,
    pub pc: Address,
    pub index: Address,
    pub stack: CallStack,
    pub delay_timer: Timer,
    pub sound_timer: Timer,
    pub display: Framebuffer,
    pub keypad: Keypad,
}
impl Chip8State {
    pub fn new(config: Config) -> Self {
        Chip8State {
            config,
            memory: Memory::new(),
            registers: RegisterBank::new(),
            pc: PC_START_ADDR,
            index: 0,
            stack: CallStack::new(),
            delay_timer: 0,
            sound_timer: 0,
            display: Framebuffer::new(),
            keypad: Keypad::new(),
        }
    }

    /// Zeroes everything except the configuration.
    pub fn reset(&mut self) {
        *self = Chip8State::new(self.config);
    }

    pub fn tick_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }
}
