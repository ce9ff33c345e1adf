use crate::value::{Cell, Payload};
use ren_value::{Kind, KindByte, MAX_INSITU_QUOTES};
use std::rc::Rc;

/// Out-of-line storage for a value quoted more deeply than the header byte can say.
#[derive(Debug, Clone)]
pub struct QuotedBox {
    depth: usize,
    cell: Cell,
}

impl QuotedBox {
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The unquoted value inside the box.
    pub fn cell(&self) -> &Cell {
        &self.cell
    }
}

impl Cell {
    /// Total quoting depth, whether in the header or in a box.
    pub fn quote_depth(&self) -> usize {
        match &self.payload {
            Payload::Quoted(boxed) if self.kind() == Kind::Quoted => boxed.depth,
            _ => self.kind.depth(),
        }
    }

    pub fn is_quoted(&self) -> bool {
        self.quote_depth() > 0
    }

    /// Adds `n` levels of quoting. Up to three levels only touch the header; deeper ones box the value.
    pub fn quoted(&self, n: usize) -> Cell {
        if n == 0 {
            return self.clone();
        }
        let depth = self.quote_depth() + n;
        let mut cell = self.dequoted().with_depth(depth);
        cell.flags = self.flags;
        cell
    }

    /// Removes `n` levels of quoting. `None` if the value isn't quoted that deeply.
    pub fn unquoted(&self, n: usize) -> Option<Cell> {
        let depth = self.quote_depth().checked_sub(n)?;
        let mut cell = self.dequoted().with_depth(depth);
        cell.flags = self.flags;
        Some(cell)
    }

    /// The value with every level of quoting removed.
    pub fn dequoted(&self) -> Cell {
        match &self.payload {
            Payload::Quoted(boxed) if self.kind() == Kind::Quoted => boxed.cell.clone(),
            _ => {
                let mut cell = self.clone();
                cell.set_kind_byte(KindByte::new(self.kind()));
                cell
            }
        }
    }

    /// Quotes an unquoted cell to exactly `depth`.
    fn with_depth(mut self, depth: usize) -> Cell {
        debug_assert_eq!(self.quote_depth(), 0);
        if depth <= MAX_INSITU_QUOTES {
            if let Some(byte) = KindByte::with_depth(self.kind(), depth) {
                self.set_kind_byte(byte);
                return self;
            }
        }
        let flags = self.flags;
        Cell { kind: KindByte::new(Kind::Quoted), flags, payload: Payload::Quoted(Rc::new(QuotedBox { depth, cell: self })) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ren_value::Heart;

    #[test]
    fn shallow_quotes_stay_in_the_header() {
        let value = Cell::integer(5);
        for depth in 1..=MAX_INSITU_QUOTES {
            let quoted = value.quoted(depth);
            assert_eq!(quoted.quote_depth(), depth);
            assert_eq!(quoted.heart(), Heart::Integer);
            assert_eq!(quoted.kind(), Kind::Integer);
            assert_eq!(quoted.type_of(), Kind::Quoted);
            assert_eq!(quoted.unquoted(depth).and_then(|cell| cell.as_integer()), Some(5));
        }
    }

    #[test]
    fn deep_quotes_are_boxed() {
        let quoted = Cell::integer(5).quoted(4);
        assert_eq!(quoted.heart(), Heart::Quoted);
        assert_eq!(quoted.kind(), Kind::Quoted);
        assert_eq!(quoted.quote_depth(), 4);

        let back = quoted.unquoted(1).unwrap();
        assert_eq!(back.heart(), Heart::Integer);
        assert_eq!(back.quote_depth(), 3);
        assert_eq!(quoted.unquoted(4).and_then(|cell| cell.as_integer()), Some(5));
    }

    #[test]
    fn quoting_composes() {
        let once = Cell::integer(1).quoted(2);
        let twice = once.quoted(5);
        assert_eq!(twice.quote_depth(), 7);
        assert_eq!(twice.dequoted().quote_depth(), 0);
        assert!(twice.unquoted(8).is_none());
    }
}
