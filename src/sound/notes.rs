//! Note names, pitches and the two fixed scales.

use std::fmt;

/// Natural note letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    /// Semitones above C
    pub fn semitone(self) -> i32 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }

    fn as_char(self) -> char {
        match self {
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
            Letter::F => 'F',
            Letter::G => 'G',
            Letter::A => 'A',
            Letter::B => 'B',
        }
    }
}

/// A spelled note in scientific pitch notation, e.g. `A#4`.
///
/// Spelling is kept as written (`E#5` stays `E#5`), only the pitch is
/// enharmonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note {
    pub letter: Letter,
    pub sharp: bool,
    pub octave: i8,
}

impl Note {
    pub const fn natural(letter: Letter, octave: i8) -> Self {
        Self {
            letter,
            sharp: false,
            octave,
        }
    }

    pub const fn sharp(letter: Letter, octave: i8) -> Self {
        Self {
            letter,
            sharp: true,
            octave,
        }
    }

    /// MIDI note number (C4 = 60)
    pub fn midi(&self) -> i32 {
        12 * (self.octave as i32 + 1) + self.letter.semitone() + self.sharp as i32
    }

    /// Equal-tempered frequency, A4 = 440 Hz
    pub fn frequency_hz(&self) -> f32 {
        440.0 * 2f32.powf((self.midi() - 69) as f32 / 12.0)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.letter.as_char(),
            if self.sharp { "#" } else { "" },
            self.octave
        )
    }
}

use Letter::*;

/// Scale used for even region sums
pub static MAJOR_PENTATONIC: [Note; 16] = [
    Note::natural(C, 6),
    Note::natural(A, 5),
    Note::natural(G, 5),
    Note::natural(E, 5),
    Note::natural(D, 5),
    Note::natural(C, 5),
    Note::natural(A, 4),
    Note::natural(G, 4),
    Note::natural(E, 4),
    Note::natural(D, 4),
    Note::natural(C, 4),
    Note::natural(A, 3),
    Note::natural(G, 3),
    Note::natural(E, 3),
    Note::natural(D, 3),
    Note::natural(C, 3),
];

/// Scale used for odd region sums
pub static MINOR_PENTATONIC: [Note; 16] = [
    Note::natural(C, 6),
    Note::sharp(A, 5),
    Note::natural(G, 5),
    Note::sharp(E, 5),
    Note::sharp(D, 5),
    Note::natural(C, 5),
    Note::sharp(A, 4),
    Note::natural(G, 4),
    Note::sharp(E, 4),
    Note::sharp(D, 4),
    Note::natural(C, 4),
    Note::sharp(A, 3),
    Note::natural(G, 3),
    Note::sharp(E, 3),
    Note::sharp(D, 3),
    Note::natural(C, 3),
];

/// Row-major grid of notes, one row per sampled region row.
///
/// Rows may be shorter than the region column count (a row stops at the
/// first silent region) but are never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteGrid {
    rows: Vec<Vec<Note>>,
}

impl NoteGrid {
    pub fn new(rows: Vec<Vec<Note>>) -> Self {
        Self {
            rows: rows.into_iter().filter(|row| !row.is_empty()).collect(),
        }
    }

    pub fn rows(&self) -> &[Vec<Note>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Total number of notes
    pub fn len(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Flatten row-major into one sequence
    pub fn flatten(&self) -> Vec<Note> {
        self.rows.iter().flatten().copied().collect()
    }
}

impl fmt::Display for NoteGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let names: Vec<String> = row.iter().map(Note::to_string).collect();
            write!(f, "{}", names.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a4_is_440() {
        let a4 = Note::natural(A, 4);
        assert_eq!(a4.midi(), 69);
        assert!((a4.frequency_hz() - 440.0).abs() < 1e-3);
        assert_eq!(Note::natural(C, 4).midi(), 60);
    }

    #[test]
    fn test_e_sharp_is_f() {
        assert_eq!(Note::sharp(E, 5).midi(), Note::natural(F, 5).midi());
        assert_eq!(Note::sharp(E, 5).to_string(), "E#5");
    }

    #[test]
    fn test_scales_descend() {
        for scale in [MAJOR_PENTATONIC, MINOR_PENTATONIC] {
            assert!(scale.windows(2).all(|w| w[0].midi() > w[1].midi()));
        }
    }

    #[test]
    fn test_note_grid_display_and_flatten() {
        let grid = NoteGrid::new(vec![
            vec![Note::natural(C, 4), Note::sharp(A, 3)],
            vec![],
            vec![Note::natural(G, 5)],
        ]);
        assert_eq!(grid.rows().len(), 2);
        assert_eq!(grid.len(), 3);
        assert_eq!(grid.to_string(), "C4 A#3\nG5");
        assert_eq!(grid.flatten()[1], Note::sharp(A, 3));
    }
}
