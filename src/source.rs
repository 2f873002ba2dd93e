use std::fmt;
use std::ops::Range;

/// A location in the source text. Lines start at 1, columns at 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub offset: usize, // Byte offset
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Position {
            offset,
            line,
            column,
        }
    }

    /// Moves the position past one consumed byte.
    pub fn advance(&mut self, byte: u8) {
        self.offset += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
    }

    /// Moves the position past every byte of `bytes`.
    pub fn advance_over(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.advance(byte);
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::new(0, 1, 0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line:{}, column:{}", self.line, self.column)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub start: Position,
    pub end: Position, // Exclusive
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Span { start, end }
    }

    /// Smallest span covering both.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Byte range covered by the span, as used by `ariadne` labels.
    pub fn to_range(&self) -> Range<usize> {
        self.start.offset..self.end.offset.max(self.start.offset)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_tracks_lines_and_columns() {
        let mut pos = Position::default();
        pos.advance_over(b"ab\ncd");
        assert_eq!(pos, Position::new(5, 2, 2));
    }

    #[test]
    fn test_merge_and_range() {
        let a = Span::new(Position::new(0, 1, 0), Position::new(3, 1, 3));
        let b = Span::new(Position::new(5, 1, 5), Position::new(9, 1, 9));
        let merged = b.merge(a);
        assert_eq!(merged.to_range(), 0..9);
        assert_eq!(merged.to_string(), "line:1, column:0");
    }
}
