//! Seed pattern catalogue used when (re)generating grid content.

/// A small hand-drawn automaton pattern (`#` alive, `.` dead).
///
/// Dimensions include a one-cell dead border so neighbouring placements
/// never touch.
#[derive(Debug)]
pub struct Pattern {
    pub name: &'static str,
    /// Relative pick weight
    pub weight: f32,
    rows: &'static [&'static str],
}

impl Pattern {
    /// Width including the safety border
    pub fn width(&self) -> usize {
        self.rows[0].len() + 2
    }

    /// Height including the safety border
    pub fn height(&self) -> usize {
        self.rows.len() + 2
    }

    /// Whether `(x, y)` (border-inclusive coordinates) is alive
    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        if x == 0 || y == 0 || x > self.rows[0].len() || y > self.rows.len() {
            return false;
        }
        self.rows[y - 1].as_bytes()[x - 1] == b'#'
    }

    /// Number of live cells in the pattern
    pub fn population(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.bytes().filter(|&b| b == b'#').count())
            .sum()
    }
}

pub static PATTERNS: &[Pattern] = &[
    Pattern {
        name: "blinker",
        weight: 0.3,
        rows: &["...", "###", "..."],
    },
    Pattern {
        name: "octagon",
        weight: 0.4,
        rows: &[
            "...##...",
            "..#..#..",
            ".#....#.",
            "#......#",
            "#......#",
            ".#....#.",
            "..#..#..",
            "...##...",
        ],
    },
    Pattern {
        name: "beacon",
        weight: 0.2,
        rows: &["##..", "#...", "...#", "..##"],
    },
    Pattern {
        name: "pulsar",
        weight: 0.2,
        rows: &[
            "..###...###..",
            ".............",
            "#....#.#....#",
            "#....#.#....#",
            "#....#.#....#",
            "..###...###..",
            ".............",
            "..###...###..",
            "#....#.#....#",
            "#....#.#....#",
            "#....#.#....#",
            ".............",
            "..###...###..",
        ],
    },
    Pattern {
        name: "pentadecathlon",
        weight: 0.2,
        rows: &["..#....#..", "##.####.##", "..#....#.."],
    },
    Pattern {
        name: "unix",
        weight: 0.1,
        rows: &[
            ".##.....",
            ".##.....",
            "........",
            ".#......",
            "#.#.....",
            "#..#..##",
            "....#.##",
            "..##....",
        ],
    },
    Pattern {
        name: "clock",
        weight: 0.1,
        rows: &["..#.", "#.#.", ".#.#", ".#.."],
    },
    Pattern {
        name: "bipole",
        weight: 0.2,
        rows: &["##...", "#.#..", ".....", "..#.#", "...##"],
    },
    Pattern {
        name: "queen bee shuttle",
        weight: 0.15,
        rows: &[
            ".........#............",
            ".......#.#............",
            "......#.#.............",
            "##...#..#...........##",
            "##....#.#...........##",
            ".......#.#............",
            ".........#............",
        ],
    },
    Pattern {
        name: "tumbler",
        weight: 0.1,
        rows: &[
            ".#.....#.",
            "#.#...#.#",
            "#..#.#..#",
            "..#...#..",
            "..##.##..",
        ],
    },
];

/// Pick a pattern index with probability proportional to its weight
pub fn pick_weighted(rng: &mut fastrand::Rng) -> usize {
    let total: f32 = PATTERNS.iter().map(|p| p.weight).sum();
    let mut target = rng.f32() * total;

    for (i, pattern) in PATTERNS.iter().enumerate() {
        if target < pattern.weight {
            return i;
        }
        target -= pattern.weight;
    }

    PATTERNS.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_are_rectangular() {
        for pattern in PATTERNS {
            let width = pattern.rows[0].len();
            assert!(
                pattern.rows.iter().all(|row| row.len() == width),
                "{} is ragged",
                pattern.name
            );
            assert!(pattern.population() > 0);
        }
    }

    #[test]
    fn test_border_is_dead() {
        let blinker = &PATTERNS[0];
        assert_eq!(blinker.width(), 5);
        assert_eq!(blinker.height(), 5);
        for x in 0..blinker.width() {
            assert!(!blinker.is_alive(x, 0));
            assert!(!blinker.is_alive(x, blinker.height() - 1));
        }
        assert!(blinker.is_alive(1, 2));
        assert!(blinker.is_alive(3, 2));
        assert!(!blinker.is_alive(2, 1));
    }

    #[test]
    fn test_weighted_pick_in_range() {
        let mut rng = fastrand::Rng::with_seed(7);
        let mut seen = vec![0usize; PATTERNS.len()];
        for _ in 0..2000 {
            seen[pick_weighted(&mut rng)] += 1;
        }
        // The heaviest pattern should come up more often than the lightest
        assert!(seen[1] > seen[6]);
        assert!(seen.iter().all(|&n| n > 0));
    }
}
