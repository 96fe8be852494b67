//! Note → color mapping for the note grid overlay.
//!
//! Hue comes from the note letter, shade from the octave.

use super::notes::{Letter, Note};
use crate::projector::{hex_to_rgb, srgb_to_linear};

/// Shades per palette, lightest octave first
type Palette = [u32; 6];

const GREEN: Palette = [0x81c784, 0x43a047, 0x1b5e20, 0x69f0ae, 0x00e676, 0x00c853];
const BLUE: Palette = [0x64b5f6, 0x1e88e5, 0x0d47a1, 0x448aff, 0x2979ff, 0x2962ff];
const RED: Palette = [0xe57373, 0xe53935, 0xb71c1c, 0xff5252, 0xff1744, 0xd50000];
const YELLOW: Palette = [0xfff176, 0xfdd835, 0xf57f17, 0xffff00, 0xffea00, 0xffd600];
const LIGHT_BLUE: Palette = [0x4fc3f7, 0x039be5, 0x01579b, 0x40c4ff, 0x00b0ff, 0x0091ea];
const DEEP_ORANGE: Palette = [0xff8a65, 0xf4511e, 0xbf360c, 0xff6e40, 0xff3d00, 0xdd2c00];
const ORANGE: Palette = [0xffb74d, 0xfb8c00, 0xe65100, 0xffab40, 0xff9100, 0xff6d00];

fn palette(letter: Letter) -> &'static Palette {
    match letter {
        Letter::A => &GREEN,
        Letter::B => &BLUE,
        Letter::C => &RED,
        Letter::D => &YELLOW,
        Letter::E => &LIGHT_BLUE,
        Letter::F => &DEEP_ORANGE,
        Letter::G => &ORANGE,
    }
}

/// sRGB hex color of a note
pub fn note_hex(note: Note) -> u32 {
    // Sharps keep their letter's hue so A# sits next to A, not in the
    // default green
    // Octaves outside 1..=6 fall back to the lightest shade
    let shade = match note.octave {
        1..=6 => (note.octave - 1) as usize,
        _ => 0,
    };
    palette(note.letter)[shade]
}

/// Linear RGB color of a note, ready for the instance buffer
pub fn note_color(note: Note) -> [f32; 3] {
    hex_to_rgb(note_hex(note)).map(srgb_to_linear)
}
