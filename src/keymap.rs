//! Physical keyboard to CHIP-8 keypad.
//!
//! ```text
//! 1 2 3 4    →    1 2 3 C
//! Q W E R    →    4 5 6 D
//! A S D F    →    7 8 9 E
//! Z X C V    →    A 0 B F
//! ```

use chip8_interpreter::Key;

pub const KEY_MAPPING_HELP: &str = "Key Mapping:\n\
    1 2 3 4    →    1 2 3 C\n\
    Q W E R    →    4 5 6 D\n\
    A S D F    →    7 8 9 E\n\
    Z X C V    →    A 0 B F";

pub fn from_rdev(key: rdev::Key) -> Option<Key> {
    use rdev::Key as K;

    match key {
        K::Num1 => Some(Key::Key1),
        K::Num2 => Some(Key::Key2),
        K::Num3 => Some(Key::Key3),
        K::Num4 => Some(Key::KeyC),
        K::KeyQ => Some(Key::Key4),
        K::KeyW => Some(Key::Key5),
        K::KeyE => Some(Key::Key6),
        K::KeyR => Some(Key::KeyD),
        K::KeyA => Some(Key::Key7),
        K::KeyS => Some(Key::Key8),
        K::KeyD => Some(Key::Key9),
        K::KeyF => Some(Key::KeyE),
        K::KeyZ => Some(Key::KeyA),
        K::KeyX => Some(Key::Key0),
        K::KeyC => Some(Key::KeyB),
        K::KeyV => Some(Key::KeyF),
        _ => None,
    }
}

pub fn from_char(c: char) -> Option<Key> {
    match c.to_ascii_lowercase() {
        '1' => Some(Key::Key1),
        '2' => Some(Key::Key2),
        '3' => Some(Key::Key3),
        '4' => Some(Key::KeyC),
        'q' => Some(Key::Key4),
        'w' => Some(Key::Key5),
        'e' => Some(Key::Key6),
        'r' => Some(Key::KeyD),
        'a' => Some(Key::Key7),
        's' => Some(Key::Key8),
        'd' => Some(Key::Key9),
        'f' => Some(Key::KeyE),
        'z' => Some(Key::KeyA),
        'x' => Some(Key::Key0),
        'c' => Some(Key::KeyB),
        'v' => Some(Key::KeyF),
        _ => None,
    }
}
