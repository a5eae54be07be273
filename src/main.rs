mod emulator;
mod keymap;

use std::path::PathBuf;

use chip8_interpreter::{Config, Interpreter};
use clap::Parser;

use emulator::{
    DEFAULT_FRAME_RATE, DEFAULT_INSTRUCTIONS_PER_SECOND, Emulator, InputMode, Settings,
};

/// Run a CHIP-8 program in the terminal.
///
/// Logs go to stderr and are controlled by RUST_LOG; redirect them when
/// raising the level, since the screen is drawn on the same terminal.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the program image
    rom: PathBuf,

    /// Screen refreshes per second
    #[arg(long, default_value_t = DEFAULT_FRAME_RATE)]
    frame_rate: u64,

    /// Interpreter cycles per second. The delay and sound timers tick once
    /// per cycle, so only 60 gives them their usual 60 Hz rate; higher
    /// values make ROM delay loops run proportionally faster
    #[arg(long, default_value_t = DEFAULT_INSTRUCTIONS_PER_SECOND)]
    ips: u64,

    /// Keyboard source
    #[arg(long, value_enum, default_value_t = InputMode::Global)]
    input: InputMode,

    /// Seed for the random-number instruction
    #[arg(long)]
    seed: Option<u64>,

    /// Shift Vy into Vx for 8xy6/8xyE
    #[arg(long)]
    shift_uses_vy: bool,

    /// Clear VF after 8xy1/8xy2/8xy3
    #[arg(long)]
    logic_resets_vf: bool,

    /// Advance I past the registers transferred by Fx55/Fx65
    #[arg(long)]
    load_store_increments_index: bool,

    /// Drop sprite pixels that run off the screen instead of wrapping them
    #[arg(long)]
    clip_sprites: bool,

    /// Warn about opcodes that do not decode to an instruction
    #[arg(long)]
    report_unknown_opcodes: bool,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            shift_uses_vy: self.shift_uses_vy,
            logic_resets_vf: self.logic_resets_vf,
            load_store_increments_index: self.load_store_increments_index,
            clip_sprites: self.clip_sprites,
            report_unknown_opcodes: self.report_unknown_opcodes,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    anyhow::ensure!(cli.frame_rate > 0, "frame rate must be at least 1");

    let config = cli.config();
    let interpreter = match cli.seed {
        Some(seed) => Interpreter::seeded(config, seed),
        None => Interpreter::new(config),
    };
    let settings = Settings::new(cli.frame_rate, cli.ips, cli.rom, cli.input);

    let mut emulator = Emulator::new(interpreter, settings);
    emulator.run()?;

    Ok(())
}
