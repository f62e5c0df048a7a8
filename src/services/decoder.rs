// Pattern decoder: dot-presence vectors to Unicode Braille characters

use crate::core::types::{Cell, DotPattern};

/// Emitted for any dot pattern without a table entry
pub const UNRECOGNIZED_CELL: char = '?';

/// Letters a-z and the word space, keyed by dot bitmask (bit `i` = dot `i + 1`)
const BRAILLE_PATTERNS: [(u8, char); 27] = [
    (0b000001, '⠁'), // a
    (0b000011, '⠃'), // b
    (0b001001, '⠉'), // c
    (0b011001, '⠙'), // d
    (0b010001, '⠑'), // e
    (0b001011, '⠋'), // f
    (0b011011, '⠛'), // g
    (0b010011, '⠓'), // h
    (0b001010, '⠊'), // i
    (0b011010, '⠚'), // j
    (0b000101, '⠅'), // k
    (0b000111, '⠇'), // l
    (0b001101, '⠍'), // m
    (0b011101, '⠝'), // n
    (0b010101, '⠕'), // o
    (0b001111, '⠏'), // p
    (0b011111, '⠟'), // q
    (0b010111, '⠗'), // r
    (0b001110, '⠎'), // s
    (0b011110, '⠞'), // t
    (0b100101, '⠥'), // u
    (0b100111, '⠧'), // v
    (0b111010, '⠺'), // w
    (0b101101, '⠭'), // x
    (0b111101, '⠽'), // y
    (0b110101, '⠵'), // z
    (0b000000, ' '), // space
];

const fn build_table() -> [char; 64] {
    let mut table = [UNRECOGNIZED_CELL; 64];
    let mut i = 0;
    while i < BRAILLE_PATTERNS.len() {
        let (bits, ch) = BRAILLE_PATTERNS[i];
        table[bits as usize] = ch;
        i += 1;
    }
    table
}

static PATTERN_TABLE: [char; 64] = build_table();

/// Decode one cell pattern
pub fn decode_pattern(pattern: DotPattern) -> char {
    PATTERN_TABLE[(pattern.bits() & 0x3f) as usize]
}

/// Decode a sequence of patterns into a Braille string
pub fn decode_patterns(patterns: &[DotPattern]) -> String {
    patterns.iter().map(|&p| decode_pattern(p)).collect()
}

/// Decode detected cells in reading order
pub fn decode_cells(cells: &[Cell]) -> String {
    cells.iter().map(|c| decode_pattern(c.pattern)).collect()
}

/// Defined table entries (letters plus space)
pub fn defined_patterns() -> impl Iterator<Item = (DotPattern, char)> {
    BRAILLE_PATTERNS
        .iter()
        .map(|&(bits, ch)| (DotPattern::from_bits(bits), ch))
}
