use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use anyhow::Context;
use chip8_interpreter::display::{DISPLAY_HEIGHT, DISPLAY_WIDTH};
use chip8_interpreter::{Interpreter, Key};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
};

use crate::keymap;

pub const DEFAULT_FRAME_RATE: u64 = 60;
pub const DEFAULT_INSTRUCTIONS_PER_SECOND: u64 = 700;

type Tui = Terminal<CrosstermBackend<std::io::Stdout>>;

/// Where keypad state comes from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum InputMode {
    /// Real press and release events from the desktop session.
    Global,
    /// Terminal key presses, each held for one frame.
    Terminal,
}

pub struct Settings {
    pub frame_rate: u64,
    pub ips: u64,
    pub rom: PathBuf,
    pub input: InputMode,
}
impl Settings {
    pub fn new(frame_rate: u64, ips: u64, rom: PathBuf, input: InputMode) -> Self {
        Settings {
            frame_rate,
            ips,
            rom,
            input,
        }
    }

    fn cycles_per_frame(&self) -> u64 {
        (self.ips / self.frame_rate).max(1)
    }
}

enum InputEvent {
    Key(Key, bool),
    Quit,
}

/// Forwards global key events from a background thread. Nothing touches the
/// keypad until the main loop drains the channel between cycles.
fn spawn_key_listener() -> Receiver<InputEvent> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = rdev::listen(move |event| {
            let input = match event.event_type {
                rdev::EventType::KeyPress(rdev::Key::Escape) => Some(InputEvent::Quit),
                rdev::EventType::KeyPress(key) => {
                    keymap::from_rdev(key).map(|k| InputEvent::Key(k, true))
                }
                rdev::EventType::KeyRelease(key) => {
                    keymap::from_rdev(key).map(|k| InputEvent::Key(k, false))
                }
                _ => None,
            };
            if let Some(input) = input {
                // The receiver only goes away on shutdown.
                let _ = tx.send(input);
            }
        });
        if let Err(err) = result {
            log::error!("global key listener stopped: {err:?}");
        }
    });
    rx
}

pub struct Emulator {
    interpreter: Interpreter,
    settings: Settings,
}

impl Emulator {
    pub fn new(interpreter: Interpreter, settings: Settings) -> Self {
        Emulator {
            interpreter,
            settings,
        }
    }

    fn draw(&self, frame: &mut ratatui::Frame, rom_name: &str) {
        let area = frame.area();

        // Exact size for the 64x32 display plus borders
        let game_width = (DISPLAY_WIDTH as u16) + 2;
        let game_height = (DISPLAY_HEIGHT as u16) + 2;

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(game_height),
                Constraint::Length(7),
                Constraint::Min(0),
            ])
            .split(area);

        let game_area = if chunks[0].width > game_width {
            Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Min(0),
                    Constraint::Length(game_width),
                    Constraint::Min(0),
                ])
                .split(chunks[0])[1]
        } else {
            chunks[0]
        };

        let mut screen = String::with_capacity(DISPLAY_WIDTH * DISPLAY_HEIGHT + DISPLAY_HEIGHT);
        for row in self.interpreter.framebuffer().rows() {
            screen.extend(row.iter().by_vals().map(|on| if on { '█' } else { ' ' }));
            screen.push('\n');
        }

        let title = if self.interpreter.is_sound_active() {
            format!("{rom_name} ♪")
        } else {
            rom_name.to_string()
        };
        let game_paragraph = Paragraph::new(screen)
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(Style::default().fg(Color::White));
        frame.render_widget(game_paragraph, game_area);

        let key_paragraph = Paragraph::new(keymap::KEY_MAPPING_HELP)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("Keypad"))
            .style(Style::default().fg(Color::Yellow));
        frame.render_widget(key_paragraph, chunks[1]);
    }

    /// Applies pending input. Returns false once the user asked to quit.
    fn poll_input(&mut self, global_keys: Option<&Receiver<InputEvent>>) -> anyhow::Result<bool> {
        if let Some(rx) = global_keys {
            for input in rx.try_iter() {
                match input {
                    InputEvent::Key(key, pressed) => self.interpreter.set_key(key, pressed),
                    InputEvent::Quit => return Ok(false),
                }
            }
        }

        // Always drain crossterm events so they are not echoed
        while event::poll(Duration::ZERO)? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Esc => return Ok(false),
                KeyCode::Char(c) if global_keys.is_none() => {
                    if let Some(key) = keymap::from_char(c) {
                        self.interpreter.press_key(key);
                    }
                }
                _ => {}
            }
        }
        Ok(true)
    }

    fn main_loop(&mut self, terminal: &mut Tui, rom_name: &str) -> anyhow::Result<()> {
        let frame_duration = Duration::from_secs_f64(1.0 / self.settings.frame_rate as f64);
        let cycles_per_frame = self.settings.cycles_per_frame();
        let global_keys = match self.settings.input {
            InputMode::Global => Some(spawn_key_listener()),
            InputMode::Terminal => None,
        };

        loop {
            let frame_start = Instant::now();

            if !self.poll_input(global_keys.as_ref())? {
                return Ok(());
            }

            for _ in 0..cycles_per_frame {
                self.interpreter.cycle().with_context(|| {
                    format!("cycle failed at {:#06X}", self.interpreter.state().pc)
                })?;
            }

            terminal.draw(|frame| self.draw(frame, rom_name))?;

            // Terminals never report releases
            if global_keys.is_none() {
                self.interpreter.release_all_keys();
            }

            let elapsed = frame_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let rom_stem: String = self
            .settings
            .rom
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown ROM".to_string());

        self.interpreter.reset();
        let size = self
            .interpreter
            .load_program_file(&self.settings.rom)
            .with_context(|| format!("could not load {}", self.settings.rom.display()))?;
        log::info!(
            "running {rom_stem} ({size} bytes) at {} cycles/frame, {} fps",
            self.settings.cycles_per_frame(),
            self.settings.frame_rate
        );

        enable_raw_mode()?;
        let result = Terminal::new(CrosstermBackend::new(std::io::stdout()))
            .map_err(anyhow::Error::from)
            .and_then(|mut terminal| {
                terminal.clear()?;
                let result = self.main_loop(&mut terminal, &rom_stem);
                first_error(result, [terminal.clear()])
            });

        // Raw mode is restored no matter how the session ended.
        first_error(result, [disable_raw_mode()])
    }
}

/// Reports `result`'s error if there is one, otherwise the first cleanup
/// failure. Every cleanup step has already run by the time this is called.
fn first_error<const N: usize>(
    result: anyhow::Result<()>,
    cleanup: [std::io::Result<()>; N],
) -> anyhow::Result<()> {
    result?;
    for step in cleanup {
        step?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_per_frame_never_drops_to_zero() {
        let settings = Settings::new(60, 700, PathBuf::from("a.ch8"), InputMode::Terminal);
        assert_eq!(settings.cycles_per_frame(), 11);

        let slow = Settings::new(60, 10, PathBuf::from("a.ch8"), InputMode::Terminal);
        assert_eq!(slow.cycles_per_frame(), 1);
    }

    #[test]
    fn loop_error_wins_over_cleanup_error() {
        let result = first_error(
            Err(anyhow::anyhow!("cycle failed")),
            [Err(std::io::Error::other("clear failed"))],
        );
        assert_eq!(result.unwrap_err().to_string(), "cycle failed");
    }

    #[test]
    fn cleanup_error_surfaces_after_clean_exit() {
        let result = first_error(
            Ok(()),
            [Ok(()), Err(std::io::Error::other("raw mode stuck"))],
        );
        assert_eq!(result.unwrap_err().to_string(), "raw mode stuck");
        assert!(first_error(Ok(()), [Ok(()), Ok(())]).is_ok());
    }
}
