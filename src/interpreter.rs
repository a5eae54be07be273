use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::display::Framebuffer;
use crate::error::{Chip8Error, Result};
use crate::instruction::{self, Flow, Instruction, decode};
use crate::state::{Chip8State, Config, Key, MEM_SIZE, Register, Timer};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Running,
    /// Parked on an Fx0A. Cycles only poll the keypad until a key is held.
    AwaitingKey(Register),
}

/// A CHIP-8 machine. The host drives it one [`cycle`](Self::cycle) at a time
/// and touches the keypad and framebuffer only between cycles.
pub struct Interpreter<R: Rng = StdRng> {
    state: Chip8State,
    rng: R,
    status: Status,
}

impl Interpreter<StdRng> {
    pub fn new(config: Config) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// An interpreter whose random instruction replays the same sequence for the same seed.
    pub fn seeded(config: Config, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Interpreter<R> {
    pub fn with_rng(config: Config, rng: R) -> Self {
        let mut interpreter = Interpreter {
            state: Chip8State::new(config),
            rng,
            status: Status::Running,
        };
        interpreter.load_font();
        interpreter
    }

    pub fn load_font(&mut self) {
        self.state.memory.load_font();
        log::debug!("font set loaded");
    }

    /// Copies `rom` to the program area. Nothing is written if it does not fit.
    pub fn load_program(&mut self, rom: &[u8]) -> Result<()> {
        self.state.memory.load_rom(rom)?;
        log::debug!("loaded {} byte program", rom.len());
        Ok(())
    }

    /// Reads the whole file before touching memory, so a failed read leaves
    /// the machine as it was. Returns the program size.
    pub fn load_program_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let rom = std::fs::read(path).map_err(|source| Chip8Error::RomRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_program(&rom)?;
        Ok(rom.len())
    }

    /// Back to power-on state with the font loaded. Any program must be loaded again.
    pub fn reset(&mut self) {
        self.state.reset();
        self.status = Status::Running;
        self.load_font();
    }

    /// One fetch-decode-execute step followed by a timer tick.
    ///
    /// On error the program counter is left on the faulting instruction and
    /// the timers are not ticked.
    pub fn cycle(&mut self) -> Result<()> {
        match self.status {
            Status::Running => {
                let start_pc = self.state.pc;
                let flow = self.step().inspect_err(|_| self.state.pc = start_pc)?;
                if let Flow::AwaitKey(x) = flow {
                    log::debug!("waiting for key press into {x:?} at {start_pc:#06X}");
                    self.status = Status::AwaitingKey(x);
                }
            }
            Status::AwaitingKey(x) => {
                if instruction::take_pressed_key(&mut self.state, x) {
                    log::debug!("key wait satisfied with {:#X}", self.state.registers.read(x));
                    self.state.pc = self.state.pc.wrapping_add(2);
                    self.status = Status::Running;
                }
            }
        }

        self.state.tick_timers();
        Ok(())
    }

    fn step(&mut self) -> Result<Flow> {
        let pc = self.state.pc;
        if usize::from(pc) + 1 >= MEM_SIZE {
            return Err(Chip8Error::ProgramCounterOutOfBounds { pc });
        }
        let bytes = self.state.memory.read_block(usize::from(pc), 2)?;
        let raw = u16::from_be_bytes([bytes[0], bytes[1]]);

        // Move the program counter to next instruction
        self.state.pc = pc + 2;

        let instruction = decode(raw);
        log::trace!("{pc:#06X}: {raw:04X} {instruction:?}");
        if matches!(instruction, Instruction::Unknown(_))
            && self.state.config.report_unknown_opcodes
        {
            log::warn!("unknown opcode {raw:#06X} at {pc:#06X}, skipped");
        }

        instruction.execute(&mut self.state, &mut self.rng)
    }

    pub fn set_key(&mut self, key: Key, pressed: bool) {
        self.state.keypad.set(key, pressed);
    }

    pub fn press_key(&mut self, key: Key) {
        self.state.keypad.press_key(key);
    }

    pub fn release_key(&mut self, key: Key) {
        self.state.keypad.release_key(key);
    }

    pub fn release_all_keys(&mut self) {
        self.state.keypad.release_all();
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.state.display
    }

    pub fn delay_timer(&self) -> Timer {
        self.state.delay_timer
    }

    pub fn sound_timer(&self) -> Timer {
        self.state.sound_timer
    }

    /// The host should sound a tone while this holds.
    pub fn is_sound_active(&self) -> bool {
        self.state.sound_timer > 0
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn state(&self) -> &Chip8State {
        &self.state
    }
}
