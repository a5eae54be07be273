use rand::Rng;

use crate::error::Result;
use crate::state::{Address, Chip8State, FONT_ADDR, FONT_HEIGHT, Key, Register};

/// Raw operand fields of an opcode. Each handler picks the ones it needs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Operands {
    /// First nibble. Selects the instruction family.
    pub family: u8,
    /// Second nibble. Used to look up one of the 16 registers.
    pub x: Register,
    /// Third nibble. Used to look up one of the 16 registers.
    pub y: Register,
    /// Fourth nibble. A 4-bit number.
    pub n: u8,
    /// The second byte (third and fourth nibbles). An 8-bit immediate number.
    pub nn: u8,
    /// The second, third, and fourth nibbles. A 12-bit immediate address.
    pub nnn: Address,
}
impl Operands {
    pub fn new(raw: u16) -> Self {
        Operands {
            family: (raw >> 12) as u8,
            x: Register::from_nibble((raw >> 8) as u8),
            y: Register::from_nibble((raw >> 4) as u8),
            n: (raw & 0x0F) as u8,
            nn: (raw & 0x00FF) as u8,
            nnn: raw & 0x0FFF,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// 00E0
    ClearScreen,
    /// 00EE
    SubroutineReturn,
    /// 1nnn
    Jump { addr: Address },
    /// 2nnn
    SubroutineCall { addr: Address },
    /// 3xnn
    SkipEqImmediate { x: Register, byte: u8 },
    /// 4xnn
    SkipNeqImmediate { x: Register, byte: u8 },
    /// 5xy0
    SkipEqRegister { x: Register, y: Register },
    /// 6xnn
    SetImmediate { x: Register, byte: u8 },
    /// 7xnn, no carry.
    AddImmediate { x: Register, byte: u8 },
    /// 8xy0
    SetXToY { x: Register, y: Register },
    /// 8xy1
    BinaryOr { x: Register, y: Register },
    /// 8xy2
    BinaryAnd { x: Register, y: Register },
    /// 8xy3
    LogicalXor { x: Register, y: Register },
    /// 8xy4
    AddWithCarry { x: Register, y: Register },
    /// 8xy5
    SubtractYFromX { x: Register, y: Register },
    /// 8xy6
    RightShift { x: Register, y: Register },
    /// 8xy7
    SubtractXFromY { x: Register, y: Register },
    /// 8xyE
    LeftShift { x: Register, y: Register },
    /// 9xy0
    SkipNeqRegister { x: Register, y: Register },
    /// Annn
    SetIndex { addr: Address },
    /// Bnnn
    JumpWithOffset { addr: Address },
    /// Cxnn
    Random { x: Register, mask: u8 },
    /// Dxyn
    Draw { x: Register, y: Register, height: u8 },
    /// Ex9E
    SkipIfKeyPressed { x: Register },
    /// ExA1
    SkipIfKeyNotPressed { x: Register },
    /// Fx07
    ReadDelayTimer { x: Register },
    /// Fx0A
    WaitForKey { x: Register },
    /// Fx15
    SetDelayTimer { x: Register },
    /// Fx18
    SetSoundTimer { x: Register },
    /// Fx1E
    AddToIndex { x: Register },
    /// Fx29
    FontChar { x: Register },
    /// Fx33
    BinaryCodedDecimal { x: Register },
    /// Fx55
    Store { x: Register },
    /// Fx65
    Load { x: Register },
    /// Anything else, including 0nnn machine routines. Executes as a no-op.
    Unknown(u16),
}

/// What the interpreter should do after an instruction has run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Fx0A found no key held. The program counter has been rolled back onto
    /// the instruction and the result goes to the given register.
    AwaitKey(Register),
}

pub fn decode(raw: u16) -> Instruction {
    let Operands {
        family,
        x,
        y,
        n,
        nn,
        nnn,
    } = Operands::new(raw);

    match family {
        0x0 => match nn {
            0xE0 => Instruction::ClearScreen,
            0xEE => Instruction::SubroutineReturn,
            _ => Instruction::Unknown(raw),
        },
        0x1 => Instruction::Jump { addr: nnn },
        0x2 => Instruction::SubroutineCall { addr: nnn },
        0x3 => Instruction::SkipEqImmediate { x, byte: nn },
        0x4 => Instruction::SkipNeqImmediate { x, byte: nn },
        0x5 => Instruction::SkipEqRegister { x, y },
        0x6 => Instruction::SetImmediate { x, byte: nn },
        0x7 => Instruction::AddImmediate { x, byte: nn },
        0x8 => match n {
            0x0 => Instruction::SetXToY { x, y },
            0x1 => Instruction::BinaryOr { x, y },
            0x2 => Instruction::BinaryAnd { x, y },
            0x3 => Instruction::LogicalXor { x, y },
            0x4 => Instruction::AddWithCarry { x, y },
            0x5 => Instruction::SubtractYFromX { x, y },
            0x6 => Instruction::RightShift { x, y },
            0x7 => Instruction::SubtractXFromY { x, y },
            0xE => Instruction::LeftShift { x, y },
            _ => Instruction::Unknown(raw),
        },
        0x9 => Instruction::SkipNeqRegister { x, y },
        0xA => Instruction::SetIndex { addr: nnn },
        0xB => Instruction::JumpWithOffset { addr: nnn },
        0xC => Instruction::Random { x, mask: nn },
        0xD => Instruction::Draw { x, y, height: n },
        0xE => match nn {
            0x9E => Instruction::SkipIfKeyPressed { x },
            0xA1 => Instruction::SkipIfKeyNotPressed { x },
            _ => Instruction::Unknown(raw),
        },
        0xF => match nn {
            0x07 => Instruction::ReadDelayTimer { x },
            0x0A => Instruction::WaitForKey { x },
            0x15 => Instruction::SetDelayTimer { x },
            0x18 => Instruction::SetSoundTimer { x },
            0x1E => Instruction::AddToIndex { x },
            0x29 => Instruction::FontChar { x },
            0x33 => Instruction::BinaryCodedDecimal { x },
            0x55 => Instruction::Store { x },
            0x65 => Instruction::Load { x },
            _ => Instruction::Unknown(raw),
        },
        _ => Instruction::Unknown(raw),
    }
}

impl Instruction {
    /// Applies the instruction to `state`. The program counter must already
    /// point past the instruction.
    pub fn execute<R: Rng>(self, state: &mut Chip8State, rng: &mut R) -> Result<Flow> {
        match self {
            Instruction::ClearScreen => state.display.clear(),
            Instruction::SubroutineReturn => state.pc = state.stack.pop()?,
            Instruction::Jump { addr } => state.pc = addr,
            Instruction::SubroutineCall { addr } => {
                state.stack.push(state.pc)?;
                state.pc = addr;
            }
            Instruction::SkipEqImmediate { x, byte } => {
                let condition = state.registers.read(x) == byte;
                skip_if(state, condition);
            }
            Instruction::SkipNeqImmediate { x, byte } => {
                let condition = state.registers.read(x) != byte;
                skip_if(state, condition);
            }
            Instruction::SkipEqRegister { x, y } => {
                let condition = state.registers.read(x) == state.registers.read(y);
                skip_if(state, condition);
            }
            Instruction::SkipNeqRegister { x, y } => {
                let condition = state.registers.read(x) != state.registers.read(y);
                skip_if(state, condition);
            }
            Instruction::SetImmediate { x, byte } => state.registers.write(x, byte),
            Instruction::AddImmediate { x, byte } => {
                let value_x = state.registers.read(x);
                state.registers.write(x, value_x.wrapping_add(byte));
            }
            Instruction::SetXToY { x, y } => {
                let value_y = state.registers.read(y);
                state.registers.write(x, value_y);
            }
            Instruction::BinaryOr { x, y } => logic(state, x, y, |a, b| a | b),
            Instruction::BinaryAnd { x, y } => logic(state, x, y, |a, b| a & b),
            Instruction::LogicalXor { x, y } => logic(state, x, y, |a, b| a ^ b),
            Instruction::AddWithCarry { x, y } => {
                let sum = u16::from(state.registers.read(x)) + u16::from(state.registers.read(y));
                write_with_flag(state, x, (sum & 0xFF) as u8, sum > 0xFF);
            }
            Instruction::SubtractYFromX { x, y } => {
                let value_x = state.registers.read(x);
                let value_y = state.registers.read(y);
                write_with_flag(state, x, value_x.wrapping_sub(value_y), value_x >= value_y);
            }
            Instruction::SubtractXFromY { x, y } => {
                let value_x = state.registers.read(x);
                let value_y = state.registers.read(y);
                write_with_flag(state, x, value_y.wrapping_sub(value_x), value_y >= value_x);
            }
            Instruction::RightShift { x, y } => {
                let value = shift_source(state, x, y);
                write_with_flag(state, x, value >> 1, value & 0x01 == 1);
            }
            Instruction::LeftShift { x, y } => {
                let value = shift_source(state, x, y);
                write_with_flag(state, x, value << 1, value & 0x80 != 0);
            }
            Instruction::SetIndex { addr } => state.index = addr,
            Instruction::JumpWithOffset { addr } => {
                state.pc = addr + Address::from(state.registers.read(Register::V0));
            }
            Instruction::Random { x, mask } => {
                let random_value = rng.random::<u8>() & mask;
                state.registers.write(x, random_value);
            }
            Instruction::Draw { x, y, height } => draw(state, x, y, height)?,
            Instruction::SkipIfKeyPressed { x } => {
                let key = Key::from_nibble(state.registers.read(x));
                let pressed = state.keypad.is_key_pressed(key);
                skip_if(state, pressed);
            }
            Instruction::SkipIfKeyNotPressed { x } => {
                let key = Key::from_nibble(state.registers.read(x));
                let pressed = state.keypad.is_key_pressed(key);
                skip_if(state, !pressed);
            }
            Instruction::ReadDelayTimer { x } => state.registers.write(x, state.delay_timer),
            Instruction::WaitForKey { x } => {
                if !take_pressed_key(state, x) {
                    // Point back at this instruction until a key shows up.
                    state.pc = state.pc.wrapping_sub(2);
                    return Ok(Flow::AwaitKey(x));
                }
            }
            Instruction::SetDelayTimer { x } => state.delay_timer = state.registers.read(x),
            Instruction::SetSoundTimer { x } => state.sound_timer = state.registers.read(x),
            Instruction::AddToIndex { x } => {
                let value_x = state.registers.read(x);
                state.index = state.index.wrapping_add(Address::from(value_x));
            }
            Instruction::FontChar { x } => {
                let digit = usize::from(state.registers.read(x) & 0x0F);
                state.index = (FONT_ADDR + digit * FONT_HEIGHT) as Address;
            }
            Instruction::BinaryCodedDecimal { x } => {
                let value_x = state.registers.read(x);
                let bcd = [value_x / 100, (value_x / 10) % 10, value_x % 10];
                state.memory.write_block(usize::from(state.index), &bcd)?;
            }
            Instruction::Store { x } => {
                state
                    .memory
                    .write_block(usize::from(state.index), state.registers.range_through(x))?;
                advance_index(state, x);
            }
            Instruction::Load { x } => {
                let bytes = state
                    .memory
                    .read_block(usize::from(state.index), x.index() + 1)?;
                state.registers.range_through_mut(x).copy_from_slice(bytes);
                advance_index(state, x);
            }
            Instruction::Unknown(_) => {}
        }
        Ok(Flow::Continue)
    }
}

/// Stores the lowest held key in `x`. Returns false if no key is down.
pub(crate) fn take_pressed_key(state: &mut Chip8State, x: Register) -> bool {
    match state.keypad.first_pressed() {
        Some(key) => {
            state.registers.write(x, key.index());
            true
        }
        None => false,
    }
}

fn skip_if(state: &mut Chip8State, condition: bool) {
    if condition {
        state.pc = state.pc.wrapping_add(2);
    }
}

/// Writes the result before the flag, so VF as a destination ends up holding the flag.
fn write_with_flag(state: &mut Chip8State, x: Register, value: u8, flag: bool) {
    state.registers.write(x, value);
    state.registers.write(Register::VF, u8::from(flag));
}

fn logic(state: &mut Chip8State, x: Register, y: Register, op: impl Fn(u8, u8) -> u8) {
    let value_x = state.registers.read(x);
    let value_y = state.registers.read(y);
    state.registers.write(x, op(value_x, value_y));
    if state.config.logic_resets_vf {
        state.registers.write(Register::VF, 0);
    }
}

fn shift_source(state: &Chip8State, x: Register, y: Register) -> u8 {
    if state.config.shift_uses_vy {
        state.registers.read(y)
    } else {
        state.registers.read(x)
    }
}

fn advance_index(state: &mut Chip8State, x: Register) {
    if state.config.load_store_increments_index {
        state.index = state.index.wrapping_add(x.index() as Address + 1);
    }
}

fn draw(state: &mut Chip8State, x: Register, y: Register, height: u8) -> Result<()> {
    let pos_x = usize::from(state.registers.read(x));
    let pos_y = usize::from(state.registers.read(y));
    let clip = state.config.clip_sprites;

    let sprite = state
        .memory
        .read_block(usize::from(state.index), usize::from(height))?;
    let collision = state.display.draw_sprite(pos_x, pos_y, sprite, clip);

    state.registers.write(Register::VF, u8::from(collision));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Config;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn run(state: &mut Chip8State, raw: u16) -> Flow {
        let mut rng = StdRng::seed_from_u64(0);
        state.pc += 2;
        decode(raw).execute(state, &mut rng).unwrap()
    }

    #[test]
    fn operands_split_every_field() {
        let ops = Operands::new(0xD12F);
        assert_eq!(ops.family, 0xD);
        assert_eq!(ops.x, Register::V1);
        assert_eq!(ops.y, Register::V2);
        assert_eq!(ops.n, 0xF);
        assert_eq!(ops.nn, 0x2F);
        assert_eq!(ops.nnn, 0x12F);
    }

    #[test]
    fn decodes_each_family() {
        use Register::*;
        assert_eq!(decode(0x00E0), Instruction::ClearScreen);
        assert_eq!(decode(0x00EE), Instruction::SubroutineReturn);
        assert_eq!(decode(0x1ABC), Instruction::Jump { addr: 0xABC });
        assert_eq!(decode(0x2ABC), Instruction::SubroutineCall { addr: 0xABC });
        assert_eq!(decode(0x3A12), Instruction::SkipEqImmediate { x: VA, byte: 0x12 });
        assert_eq!(decode(0x4A12), Instruction::SkipNeqImmediate { x: VA, byte: 0x12 });
        assert_eq!(decode(0x5AB0), Instruction::SkipEqRegister { x: VA, y: VB });
        assert_eq!(decode(0x6C7F), Instruction::SetImmediate { x: VC, byte: 0x7F });
        assert_eq!(decode(0x7C01), Instruction::AddImmediate { x: VC, byte: 0x01 });
        assert_eq!(decode(0x8124), Instruction::AddWithCarry { x: V1, y: V2 });
        assert_eq!(decode(0x812E), Instruction::LeftShift { x: V1, y: V2 });
        assert_eq!(decode(0x9120), Instruction::SkipNeqRegister { x: V1, y: V2 });
        assert_eq!(decode(0xA2F0), Instruction::SetIndex { addr: 0x2F0 });
        assert_eq!(decode(0xB300), Instruction::JumpWithOffset { addr: 0x300 });
        assert_eq!(decode(0xC30F), Instruction::Random { x: V3, mask: 0x0F });
        assert_eq!(decode(0xD125), Instruction::Draw { x: V1, y: V2, height: 5 });
        assert_eq!(decode(0xE49E), Instruction::SkipIfKeyPressed { x: V4 });
        assert_eq!(decode(0xE4A1), Instruction::SkipIfKeyNotPressed { x: V4 });
        assert_eq!(decode(0xF50A), Instruction::WaitForKey { x: V5 });
        assert_eq!(decode(0xF533), Instruction::BinaryCodedDecimal { x: V5 });
        assert_eq!(decode(0xFF65), Instruction::Load { x: VF });
    }

    #[test]
    fn unmatched_secondary_codes_are_unknown() {
        for raw in [0x0123, 0x00E1, 0x8008, 0x800F, 0xE19F, 0xF0FF, 0xF056] {
            assert_eq!(decode(raw), Instruction::Unknown(raw), "{raw:#06X}");
        }
    }

    #[test]
    fn unknown_instruction_changes_nothing() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::VF, 7);
        assert_eq!(run(&mut state, 0x8008), Flow::Continue);
        assert_eq!(state.registers.read(Register::VF), 7);
        assert_eq!(state.pc, 0x202);
    }

    #[test]
    fn subtraction_flags_compare_before_writing() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::V1, 20);
        state.registers.write(Register::V2, 20);
        run(&mut state, 0x8125);
        assert_eq!(state.registers.read(Register::V1), 0);
        assert_eq!(state.registers.read(Register::VF), 1);

        state.registers.write(Register::V1, 10);
        state.registers.write(Register::V2, 30);
        run(&mut state, 0x8127);
        assert_eq!(state.registers.read(Register::V1), 20);
        assert_eq!(state.registers.read(Register::VF), 1);

        state.registers.write(Register::V1, 30);
        run(&mut state, 0x8127);
        assert_eq!(state.registers.read(Register::V1), 0);
        assert_eq!(state.registers.read(Register::VF), 1);
    }

    #[test]
    fn reverse_subtraction_borrows_when_vy_is_smaller() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::V1, 30);
        state.registers.write(Register::V2, 10);
        run(&mut state, 0x8127);
        assert_eq!(state.registers.read(Register::V1), 236);
        assert_eq!(state.registers.read(Register::VF), 0);
    }

    #[test]
    fn flag_wins_when_vf_is_the_destination() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::VF, 200);
        state.registers.write(Register::V1, 100);
        run(&mut state, 0x8F14);
        assert_eq!(state.registers.read(Register::VF), 1);

        // 50 - 100 borrows; the flag overwrites the difference.
        state.registers.write(Register::VF, 50);
        run(&mut state, 0x8F15);
        assert_eq!(state.registers.read(Register::VF), 0);

        // 100 - 50 does not borrow.
        state.registers.write(Register::VF, 50);
        run(&mut state, 0x8F17);
        assert_eq!(state.registers.read(Register::VF), 1);
    }

    #[test]
    fn register_skips_compare_vx_with_vy() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::V1, 5);
        state.registers.write(Register::V2, 5);
        run(&mut state, 0x5120);
        assert_eq!(state.pc, 0x204);
        run(&mut state, 0x9120);
        assert_eq!(state.pc, 0x206);

        state.registers.write(Register::V2, 6);
        run(&mut state, 0x5120);
        assert_eq!(state.pc, 0x208);
        run(&mut state, 0x9120);
        assert_eq!(state.pc, 0x20C);
    }

    #[test]
    fn register_copy_leaves_vf_alone() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::V1, 0x5A);
        state.registers.write(Register::VF, 3);
        run(&mut state, 0x8210);
        assert_eq!(state.registers.read(Register::V2), 0x5A);
        assert_eq!(state.registers.read(Register::V1), 0x5A);
        assert_eq!(state.registers.read(Register::VF), 3);
        assert_eq!(state.pc, 0x202);
    }

    #[test]
    fn shifts_capture_the_outgoing_bit() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::V3, 0b1000_0011);
        run(&mut state, 0x8306);
        assert_eq!(state.registers.read(Register::V3), 0b0100_0001);
        assert_eq!(state.registers.read(Register::VF), 1);

        run(&mut state, 0x830E);
        assert_eq!(state.registers.read(Register::V3), 0b1000_0010);
        assert_eq!(state.registers.read(Register::VF), 0);

        run(&mut state, 0x830E);
        assert_eq!(state.registers.read(Register::V3), 0b0000_0100);
        assert_eq!(state.registers.read(Register::VF), 1);
    }

    #[test]
    fn shift_source_follows_config() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::V1, 0x10);
        state.registers.write(Register::V2, 0x03);
        run(&mut state, 0x8126);
        assert_eq!(state.registers.read(Register::V1), 0x08);
        assert_eq!(state.registers.read(Register::VF), 0);

        state.config.shift_uses_vy = true;
        state.registers.write(Register::V1, 0x10);
        run(&mut state, 0x8126);
        assert_eq!(state.registers.read(Register::V1), 0x01);
        assert_eq!(state.registers.read(Register::V2), 0x03);
        assert_eq!(state.registers.read(Register::VF), 1);
    }

    #[test]
    fn logic_ops_leave_vf_unless_configured() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::V0, 0b1100);
        state.registers.write(Register::V1, 0b1010);
        state.registers.write(Register::VF, 5);
        run(&mut state, 0x8011);
        assert_eq!(state.registers.read(Register::V0), 0b1110);
        assert_eq!(state.registers.read(Register::VF), 5);

        run(&mut state, 0x8012);
        assert_eq!(state.registers.read(Register::V0), 0b1010);

        state.config.logic_resets_vf = true;
        run(&mut state, 0x8013);
        assert_eq!(state.registers.read(Register::V0), 0);
        assert_eq!(state.registers.read(Register::VF), 0);
    }

    #[test]
    fn font_char_points_at_glyph() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::V6, 0x0A);
        run(&mut state, 0xF629);
        assert_eq!(state.index, 0x50 + 10 * 5);

        state.registers.write(Register::V6, 0x1F);
        run(&mut state, 0xF629);
        assert_eq!(state.index, 0x50 + 15 * 5);
    }

    #[test]
    fn bcd_writes_three_digits() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::V2, 254);
        state.index = 0x300;
        run(&mut state, 0xF233);
        assert_eq!(state.memory.read_block(0x300, 3).unwrap(), &[2, 5, 4]);
        assert_eq!(state.index, 0x300);
    }

    #[test]
    fn store_and_load_include_the_last_register() {
        let mut state = Chip8State::new(Config::default());
        for (i, reg) in Register::ALL.into_iter().enumerate() {
            state.registers.write(reg, i as u8 + 1);
        }
        state.index = 0x400;
        run(&mut state, 0xF255);
        assert_eq!(state.memory.read_block(0x400, 4).unwrap(), &[1, 2, 3, 0]);
        assert_eq!(state.index, 0x400);

        state.config.load_store_increments_index = true;
        state.memory.write_block(0x400, &[9, 8, 7]).unwrap();
        run(&mut state, 0xF165);
        assert_eq!(state.registers.read(Register::V0), 9);
        assert_eq!(state.registers.read(Register::V1), 8);
        assert_eq!(state.registers.read(Register::V2), 3);
        assert_eq!(state.index, 0x402);
    }

    #[test]
    fn jump_with_offset_adds_v0() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::V0, 0x10);
        run(&mut state, 0xB300);
        assert_eq!(state.pc, 0x310);
    }

    #[test]
    fn key_skips_use_low_nibble_of_register() {
        let mut state = Chip8State::new(Config::default());
        state.registers.write(Register::V1, 0x15);
        state.keypad.press_key(Key::Key5);
        run(&mut state, 0xE19E);
        assert_eq!(state.pc, 0x204);
        run(&mut state, 0xE1A1);
        assert_eq!(state.pc, 0x206);
    }

    #[test]
    fn wait_for_key_rolls_back_without_input() {
        let mut state = Chip8State::new(Config::default());
        assert_eq!(run(&mut state, 0xF30A), Flow::AwaitKey(Register::V3));
        assert_eq!(state.pc, 0x200);

        state.keypad.press_key(Key::KeyE);
        assert_eq!(run(&mut state, 0xF30A), Flow::Continue);
        assert_eq!(state.pc, 0x202);
        assert_eq!(state.registers.read(Register::V3), 0xE);
    }
}
