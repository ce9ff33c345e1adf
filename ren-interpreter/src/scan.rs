use crate::error::ErrorId;
use crate::gc::GcInterface;
use crate::value::Cell;
use crate::vm_objects::array::Array;
use crate::vm_objects::text::Text;
use ren_core::Interner;
use ren_lexer::{Lexer, PathKind, PathPart, Token};
use ren_value::{CellFlags, Kind, Symbol};

/// A block or group being scanned.
struct Open {
    kind: Kind,
    line: u32,
    cells: Vec<Cell>,
    /// Quotes waiting for the next value.
    quotes: usize,
    newline: bool,
}

impl Open {
    fn new(kind: Kind, line: u32) -> Open {
        Open { kind, line, cells: Vec::new(), quotes: 0, newline: false }
    }

    fn push(&mut self, cell: Cell) {
        let mut cell = cell.quoted(self.quotes);
        if self.newline {
            cell.set_flag(CellFlags::NEWLINE_BEFORE);
        }
        self.quotes = 0;
        self.newline = false;
        self.cells.push(cell);
    }
}

/// Turns source text into an unbound block of values.
///
/// Every block remembers the file and the line it started on, which is what error reports show.
pub fn scan(gc: &mut GcInterface, interner: &mut Interner, source: &str, file: Option<Symbol>) -> Result<Array, ErrorId> {
    let mut lexer = Lexer::new(source).skip_comments(true).skip_whitespace(true);
    let mut stack = vec![Open::new(Kind::Block, 1)];

    while let Some(token) = lexer.next() {
        let line = lexer.token_line();
        let Some(top) = stack.last_mut() else {
            return Err(ErrorId::Internal("scanner lost its outermost block".to_string()));
        };
        let cell = match token {
            Token::Newline => {
                top.newline = true;
                continue;
            }
            Token::Whitespace | Token::Comment(_) => continue,
            Token::Quote => {
                top.quotes += 1;
                continue;
            }
            Token::NewBlock | Token::NewGroup => {
                let kind = if token == Token::NewBlock { Kind::Block } else { Kind::Group };
                stack.push(Open::new(kind, line));
                continue;
            }
            Token::EndBlock | Token::EndGroup => {
                let expected = if token == Token::EndBlock { Kind::Block } else { Kind::Group };
                let closing = if expected == Kind::Block { ']' } else { ')' };
                match stack.pop() {
                    Some(_) if stack.is_empty() => {
                        return Err(ErrorId::Scan(format!("unexpected {} on line {}", closing, line)));
                    }
                    Some(open) if open.kind == expected => {
                        if open.quotes > 0 {
                            return Err(ErrorId::Scan(format!("quote with nothing after it on line {}", line)));
                        }
                        let array = gc.alloc_array_at(open.cells, file, open.line);
                        Cell::array(open.kind, array)
                    }
                    Some(open) => {
                        let wanted = if open.kind == Kind::Block { ']' } else { ')' };
                        return Err(ErrorId::Scan(format!("expected {} but found {} on line {}", wanted, closing, line)));
                    }
                    None => return Err(ErrorId::Internal("scanner lost its outermost block".to_string())),
                }
            }
            Token::Blank => Cell::blank(),
            Token::LitInteger(value) => Cell::integer(value),
            Token::LitDecimal(value) => Cell::decimal(value),
            Token::LitString(value) => Cell::text(Text::new(&value)),
            Token::LitChar(value) => Cell::char(value),
            Token::LitTag(value) => Cell::string(Kind::Tag, Text::new(&value), 0),
            Token::LitTuple(bytes) => match Cell::tuple(&bytes) {
                Some(cell) => cell,
                None => return Err(ErrorId::Scan(format!("tuple too long on line {}", line))),
            },
            Token::Word(name) => word(interner, Kind::Word, &name),
            Token::SetWord(name) => word(interner, Kind::SetWord, &name),
            Token::GetWord(name) => word(interner, Kind::GetWord, &name),
            Token::Refinement(name) => word(interner, Kind::Refinement, &name),
            Token::Path(kind, parts) => {
                let cells = parts
                    .into_iter()
                    .map(|part| match part {
                        PathPart::Word(name) => word(interner, Kind::Word, &name),
                        PathPart::Integer(value) => Cell::integer(value),
                    })
                    .collect();
                let kind = match kind {
                    PathKind::Plain => Kind::Path,
                    PathKind::Set => Kind::SetPath,
                    PathKind::Get => Kind::GetPath,
                };
                Cell::array(kind, gc.alloc_array_at(cells, file, line))
            }
            Token::Invalid(reason) => return Err(ErrorId::Scan(format!("{} on line {}", reason, line))),
        };
        if let Some(top) = stack.last_mut() {
            top.push(cell);
        }
    }

    if stack.len() > 1 {
        let open = stack.pop().map(|open| (open.kind, open.line)).unwrap_or((Kind::Block, 0));
        let wanted = if open.0 == Kind::Block { ']' } else { ')' };
        return Err(ErrorId::Scan(format!("missing {} for the one opened on line {}", wanted, open.1)));
    }
    match stack.pop() {
        Some(top) if top.quotes == 0 => Ok(gc.alloc_array_at(top.cells, file, 1)),
        Some(_) => Err(ErrorId::Scan("quote with nothing after it at the end".to_string())),
        None => Err(ErrorId::Internal("scanner lost its outermost block".to_string())),
    }
}

fn word(interner: &mut Interner, kind: Kind, name: &str) -> Cell {
    Cell::word(kind, interner.intern(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_text(source: &str) -> Result<(Array, Interner), ErrorId> {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        scan(&mut gc, &mut interner, source, None).map(|array| (array, interner))
    }

    #[test]
    fn nested_blocks_and_lines() {
        let (array, _) = scan_text("a: 1\nb: [2\n(3)]").unwrap();
        assert_eq!(array.len(), 4);
        let b = array.get(2).unwrap();
        assert_eq!(b.kind(), Kind::SetWord);
        assert!(b.has_flag(CellFlags::NEWLINE_BEFORE));
        let block = array.get(3).unwrap();
        let (inner, _, _) = block.as_array().unwrap();
        assert_eq!(inner.line(), 2);
        assert_eq!(inner.get(1).unwrap().kind(), Kind::Group);
    }

    #[test]
    fn quotes_apply_to_the_next_value() {
        let (array, _) = scan_text("'x ''''[1]").unwrap();
        assert_eq!(array.get(0).unwrap().quote_depth(), 1);
        assert_eq!(array.get(1).unwrap().quote_depth(), 4);
        assert_eq!(array.get(1).unwrap().kind(), Kind::Quoted);
    }

    #[test]
    fn paths_become_arrays() {
        let (array, interner) = scan_text("obj/field/2: 10").unwrap();
        let path = array.get(0).unwrap();
        assert_eq!(path.kind(), Kind::SetPath);
        let (parts, _, _) = path.as_array().unwrap();
        assert_eq!(interner.reverse_lookup(parts.get(1).unwrap().word_symbol().unwrap()), "field");
        assert_eq!(parts.get(2).unwrap().as_integer(), Some(2));
    }

    #[test]
    fn unbalanced_brackets_are_reported() {
        assert!(matches!(scan_text("[1 2"), Err(ErrorId::Scan(_))));
        assert!(matches!(scan_text("1 2]"), Err(ErrorId::Scan(_))));
        assert!(matches!(scan_text("[1 2)"), Err(ErrorId::Scan(_))));
    }
}
