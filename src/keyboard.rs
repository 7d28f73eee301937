use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub keycode: u32,
    pub shift: bool,
}

// Linux evdev keycodes (see linux/input-event-codes.h)
pub const KEY_1: u32 = 2;
pub const KEY_2: u32 = 3;
pub const KEY_3: u32 = 4;
pub const KEY_4: u32 = 5;
pub const KEY_5: u32 = 6;
pub const KEY_6: u32 = 7;
pub const KEY_7: u32 = 8;
pub const KEY_8: u32 = 9;
pub const KEY_9: u32 = 10;
pub const KEY_0: u32 = 11;

pub const KEY_MINUS: u32 = 12;
pub const KEY_EQUAL: u32 = 13;
pub const KEY_BACKSPACE: u32 = 14;
pub const KEY_TAB: u32 = 15;

pub const KEY_Q: u32 = 16;
pub const KEY_W: u32 = 17;
pub const KEY_E: u32 = 18;
pub const KEY_R: u32 = 19;
pub const KEY_T: u32 = 20;
pub const KEY_Y: u32 = 21;
pub const KEY_U: u32 = 22;
pub const KEY_I: u32 = 23;
pub const KEY_O: u32 = 24;
pub const KEY_P: u32 = 25;

pub const KEY_LEFTBRACE: u32 = 26;
pub const KEY_RIGHTBRACE: u32 = 27;
pub const KEY_ENTER: u32 = 28;

pub const KEY_LEFTCTRL: u32 = 29;

pub const KEY_A: u32 = 30;
pub const KEY_S: u32 = 31;
pub const KEY_D: u32 = 32;
pub const KEY_F: u32 = 33;
pub const KEY_G: u32 = 34;
pub const KEY_H: u32 = 35;
pub const KEY_J: u32 = 36;
pub const KEY_K: u32 = 37;
pub const KEY_L: u32 = 38;

pub const KEY_SEMICOLON: u32 = 39;
pub const KEY_APOSTROPHE: u32 = 40;
pub const KEY_GRAVE: u32 = 41;

pub const KEY_LEFTSHIFT: u32 = 42;

pub const KEY_BACKSLASH: u32 = 43;

pub const KEY_Z: u32 = 44;
pub const KEY_X: u32 = 45;
pub const KEY_C: u32 = 46;
pub const KEY_V: u32 = 47;
pub const KEY_B: u32 = 48;
pub const KEY_N: u32 = 49;
pub const KEY_M: u32 = 50;

pub const KEY_COMMA: u32 = 51;
pub const KEY_DOT: u32 = 52;
pub const KEY_SLASH: u32 = 53;

pub const KEY_RIGHTSHIFT: u32 = 54;

pub const KEY_LEFTALT: u32 = 56;
pub const KEY_SPACE: u32 = 57;

pub const KEY_RIGHTCTRL: u32 = 97;
pub const KEY_RIGHTALT: u32 = 100;

const LETTER_KEYS: [u32; 26] = [
    KEY_A, KEY_B, KEY_C, KEY_D, KEY_E, KEY_F, KEY_G, KEY_H, KEY_I, KEY_J, KEY_K, KEY_L, KEY_M,
    KEY_N, KEY_O, KEY_P, KEY_Q, KEY_R, KEY_S, KEY_T, KEY_U, KEY_V, KEY_W, KEY_X, KEY_Y, KEY_Z,
];

const DIGIT_KEYS: [u32; 10] = [
    KEY_0, KEY_1, KEY_2, KEY_3, KEY_4, KEY_5, KEY_6, KEY_7, KEY_8, KEY_9,
];

// (unshifted, shifted, keycode) for the US-QWERTY symbol keys.
const SYMBOL_KEYS: [(char, char, u32); 11] = [
    ('-', '_', KEY_MINUS),
    ('=', '+', KEY_EQUAL),
    ('[', '{', KEY_LEFTBRACE),
    (']', '}', KEY_RIGHTBRACE),
    ('\\', '|', KEY_BACKSLASH),
    (';', ':', KEY_SEMICOLON),
    ('\'', '"', KEY_APOSTROPHE),
    ('`', '~', KEY_GRAVE),
    (',', '<', KEY_COMMA),
    ('.', '>', KEY_DOT),
    ('/', '?', KEY_SLASH),
];

const SHIFTED_DIGITS: [char; 10] = [')', '!', '@', '#', '$', '%', '^', '&', '*', '('];

fn plain(keycode: u32) -> Option<KeyStroke> {
    Some(KeyStroke {
        keycode,
        shift: false,
    })
}

fn shifted(keycode: u32) -> Option<KeyStroke> {
    Some(KeyStroke {
        keycode,
        shift: true,
    })
}

/// Map a character the engine wants to emit to a US-QWERTY keystroke.
///
/// Smart quotes are sent as their ASCII keys; editors with auto-substitution
/// turn them back. A bare CR has no key of its own and is not typed.
pub fn keystroke_for_char(c: char) -> Option<KeyStroke> {
    match c {
        '\n' => plain(KEY_ENTER),
        '\t' => plain(KEY_TAB),
        ' ' => plain(KEY_SPACE),
        '’' | '‘' => plain(KEY_APOSTROPHE),
        '”' | '“' => shifted(KEY_APOSTROPHE),
        'a'..='z' => plain(LETTER_KEYS[(c as u8 - b'a') as usize]),
        'A'..='Z' => shifted(LETTER_KEYS[(c as u8 - b'A') as usize]),
        '0'..='9' => plain(DIGIT_KEYS[(c as u8 - b'0') as usize]),
        _ => {
            if let Some(idx) = SHIFTED_DIGITS.iter().position(|&d| d == c) {
                return shifted(DIGIT_KEYS[idx]);
            }
            SYMBOL_KEYS.iter().find_map(|&(lower, upper, keycode)| {
                if c == lower {
                    plain(keycode)
                } else if c == upper {
                    shifted(keycode)
                } else {
                    None
                }
            })
        }
    }
}

fn qwerty_neighbours(c: char) -> &'static [char] {
    match c.to_ascii_lowercase() {
        'a' => &['q', 'w', 's', 'z', 'x'],
        'b' => &['v', 'g', 'h', 'n'],
        'c' => &['x', 'd', 'f', 'v'],
        'd' => &['s', 'e', 'r', 'f', 'c', 'x'],
        'e' => &['w', 's', 'd', 'r'],
        'f' => &['d', 'r', 't', 'g', 'v', 'c'],
        'g' => &['f', 't', 'y', 'h', 'b', 'v'],
        'h' => &['g', 'y', 'u', 'j', 'n', 'b'],
        'i' => &['u', 'j', 'k', 'o'],
        'j' => &['h', 'u', 'i', 'k', 'm', 'n'],
        'k' => &['j', 'i', 'o', 'l', 'm'],
        'l' => &['k', 'o', 'p'],
        'm' => &['n', 'j', 'k'],
        'n' => &['b', 'h', 'j', 'm'],
        'o' => &['i', 'k', 'l', 'p'],
        'p' => &['o', 'l'],
        'q' => &['w', 'a'],
        'r' => &['e', 'd', 'f', 't'],
        's' => &['a', 'w', 'e', 'd', 'x', 'z'],
        't' => &['r', 'f', 'g', 'y'],
        'u' => &['y', 'h', 'j', 'i'],
        'v' => &['c', 'f', 'g', 'b'],
        'w' => &['q', 'a', 's', 'e'],
        'x' => &['z', 's', 'd', 'c'],
        'y' => &['t', 'g', 'h', 'u'],
        'z' => &['a', 's', 'x'],
        '1' => &['q'],
        '2' => &['q', 'w'],
        '3' => &['w', 'e'],
        '4' => &['e', 'r'],
        '5' => &['r', 't'],
        '6' => &['t', 'y'],
        '7' => &['y', 'u'],
        '8' => &['u', 'i'],
        '9' => &['i', 'o'],
        '0' => &['o', 'p'],
        _ => &[],
    }
}

/// A lowercase letter on a key next to `c`, if `c` sits on the QWERTY grid.
pub fn qwerty_adjacent_letter(c: char, rng: &mut impl Rng) -> Option<char> {
    let neighbours = qwerty_neighbours(c);
    if neighbours.is_empty() {
        return None;
    }
    Some(neighbours[rng.gen_range(0..neighbours.len())])
}
