//! Turning values into text: MOLD gives source that loads back, FORM gives text for people.

use crate::hooks::HookTable;
use crate::invokable::ensure_sufficient_stack;
use crate::value::{Cell, Payload, TypeKey};
use crate::vm_objects::action::ParamClass;
use ren_core::Interner;
use ren_value::{CellFlags, Kind};
use std::fmt::Write;

/// Spaces per level of nesting, when a block is broken over lines.
const INDENT: usize = 4;

/// The universe's shared output buffer.
///
/// Every mold appends to the end and takes its text back off when done, so nested molds (a mold
/// hook molding its contents, an error molded while molding) just stack on top of each other.
#[derive(Debug, Default)]
pub struct MoldBuffer {
    data: String,
    depth: usize,
}

impl MoldBuffer {
    pub fn new() -> MoldBuffer {
        Self::default()
    }

    /// True when no mold is in progress.
    pub fn is_idle(&self) -> bool {
        self.depth == 0 && self.data.is_empty()
    }
}

/// A mold in progress, holding its place in the buffer.
///
/// Dropping it without calling [`Mold::finish`] discards what it wrote, so a mold abandoned
/// halfway leaves the buffer as it found it.
pub struct Mold<'a> {
    pub interner: &'a Interner,
    pub hooks: &'a HookTable,
    buffer: &'a mut MoldBuffer,
    /// FORM rather than MOLD.
    pub form: bool,
    start: usize,
    /// Series and contexts being molded, to cut cycles short.
    active: Vec<usize>,
    indent: usize,
}

impl<'a> Mold<'a> {
    pub fn push(buffer: &'a mut MoldBuffer, interner: &'a Interner, hooks: &'a HookTable, form: bool) -> Mold<'a> {
        let start = buffer.data.len();
        buffer.depth += 1;
        Mold { interner, hooks, buffer, form, start, active: Vec::new(), indent: 0 }
    }

    pub fn write_str(&mut self, text: &str) {
        self.buffer.data.push_str(text);
    }

    pub fn write_char(&mut self, ch: char) {
        self.buffer.data.push(ch);
    }

    fn written(&self) -> usize {
        self.buffer.data.len() - self.start
    }

    /// Writes a value, quotes included, through its type's mold hook.
    pub fn value(&mut self, cell: &Cell) {
        let depth = cell.quote_depth();
        for _ in 0..depth {
            self.write_char('\'');
        }
        let cell = if depth > 0 { cell.dequoted() } else { cell.clone() };
        ensure_sufficient_stack(|| match self.hooks.for_cell(&cell).mold {
            Some(hook) => hook(self, &cell),
            None => mold_builtin(self, &cell),
        })
    }

    /// Takes the text back off the buffer.
    pub fn finish(self) -> String {
        self.buffer.data.split_off(self.start)
    }

    fn enter(&mut self, addr: usize) -> bool {
        if self.active.contains(&addr) {
            return false;
        }
        self.active.push(addr);
        true
    }

    fn leave(&mut self) {
        self.active.pop();
    }

    fn newline(&mut self) {
        self.write_char('\n');
        for _ in 0..self.indent * INDENT {
            self.write_char(' ');
        }
    }

    fn spelling(&self, cell: &Cell) -> &'a str {
        match cell.word_symbol() {
            Some(symbol) => self.interner.reverse_lookup(symbol),
            None => "",
        }
    }
}

impl Drop for Mold<'_> {
    fn drop(&mut self) {
        self.buffer.data.truncate(self.start);
        self.buffer.depth -= 1;
    }
}

/// Molds every builtin kind.
pub fn mold_builtin(mold: &mut Mold<'_>, cell: &Cell) {
    match cell.payload() {
        Payload::Unit => match cell.kind() {
            Kind::Blank => mold.write_char('_'),
            kind => mold.write_str(&format!("~{}~", kind.name())),
        },
        Payload::Logic(value) => mold.write_str(if *value { "true" } else { "false" }),
        Payload::Integer(value) => mold.write_str(&value.to_string()),
        Payload::Decimal(value) => mold.write_str(&format!("{:?}", value)),
        Payload::Char(ch) if mold.form => mold.write_char(*ch),
        Payload::Char(ch) => {
            mold.write_str("#\"");
            escape_char(mold, *ch);
            mold.write_char('"');
        }
        Payload::Bytes(packed) => {
            let parts: Vec<String> = packed.as_slice().iter().map(u8::to_string).collect();
            mold.write_str(&parts.join("."));
        }
        Payload::String { text, index } => {
            let content = text.to_string_from(*index as usize);
            match cell.kind() {
                Kind::Tag => {
                    mold.write_char('<');
                    mold.write_str(&content);
                    mold.write_char('>');
                }
                _ if mold.form => mold.write_str(&content),
                _ => {
                    mold.write_char('"');
                    content.chars().for_each(|ch| escape_char(mold, ch));
                    mold.write_char('"');
                }
            }
        }
        Payload::Word { .. } => {
            let spelling = mold.spelling(cell);
            match cell.kind() {
                Kind::SetWord => {
                    mold.write_str(spelling);
                    mold.write_char(':');
                }
                Kind::GetWord => {
                    mold.write_char(':');
                    mold.write_str(spelling);
                }
                Kind::Refinement => {
                    mold.write_char('/');
                    mold.write_str(spelling);
                }
                _ => mold.write_str(spelling),
            }
        }
        Payload::Array { array, index, .. } => {
            if !mold.enter(array.addr()) {
                mold.write_str("[...]");
                return;
            }
            let cells = array.to_vec_from(*index as usize);
            match cell.kind() {
                Kind::Path | Kind::SetPath | Kind::GetPath => {
                    if cell.kind() == Kind::GetPath {
                        mold.write_char(':');
                    }
                    for (position, item) in cells.iter().enumerate() {
                        if position > 0 {
                            mold.write_char('/');
                        }
                        mold.value(item);
                    }
                    if cell.kind() == Kind::SetPath {
                        mold.write_char(':');
                    }
                }
                Kind::Block if mold.form && mold.active.len() == 1 => mold_items(mold, &cells),
                kind => {
                    let (open, close) = if kind == Kind::Group { ('(', ')') } else { ('[', ']') };
                    mold.write_char(open);
                    mold_items(mold, &cells);
                    mold.write_char(close);
                }
            }
            mold.leave();
        }
        Payload::Action { action, label, .. } => {
            let interner = mold.interner;
            mold.write_str("#[action! ");
            if let Some(label) = label {
                mold.write_str(interner.reverse_lookup(*label));
                mold.write_char(' ');
            }
            mold.write_char('[');
            let mut first = true;
            for (index, symbol, param) in action.params() {
                if action.is_param_hidden(index) {
                    continue;
                }
                if !first {
                    mold.write_char(' ');
                }
                first = false;
                let spelling = interner.reverse_lookup(symbol);
                match param.class {
                    ParamClass::HardQuote => mold.write_char('\''),
                    ParamClass::Refinement => mold.write_char('/'),
                    _ => {}
                }
                mold.write_str(spelling);
            }
            mold.write_str("]]");
        }
        Payload::Context { context, phase } => {
            let interner = mold.interner;
            if !mold.enter(context.addr()) {
                mold.write_str(&format!("make {}! [...]", context.kind().name()));
                return;
            }
            let fields = context.visible(phase.is_some());
            if mold.form {
                for (position, (symbol, value)) in fields.iter().enumerate() {
                    if position > 0 {
                        mold.newline();
                    }
                    let _ = write!(mold.buffer.data, "{}: ", interner.reverse_lookup(*symbol));
                    mold.value(value);
                }
            } else {
                let _ = write!(mold.buffer.data, "make {}! [", context.kind().name());
                mold.indent += 1;
                for (symbol, value) in &fields {
                    mold.newline();
                    let _ = write!(mold.buffer.data, "{}: ", interner.reverse_lookup(*symbol));
                    mold_field(mold, value);
                }
                mold.indent -= 1;
                if !fields.is_empty() {
                    mold.newline();
                }
                mold.write_char(']');
            }
            mold.leave();
        }
        Payload::Datatype(TypeKey::Builtin(kind)) => mold.write_str(&format!("{}!", kind.name())),
        Payload::Datatype(TypeKey::Custom(type_id)) => {
            let name = format!("{}!", mold.hooks.custom_name(*type_id).unwrap_or("custom"));
            mold.write_str(&name);
        }
        Payload::Typeset(types) => {
            mold.write_str("make typeset! [");
            let names: Vec<String> = types.kinds().map(|kind| format!("{}!", kind.name())).collect();
            mold.write_str(&names.join(" "));
            mold.write_char(']');
        }
        Payload::Param(param) => mold.write_str(&format!("#[param! {:?}]", param.class)),
        Payload::Handle(_) => mold.write_str("#[handle!]"),
        Payload::Custom { type_id, .. } => {
            let name = format!("#[{}!]", mold.hooks.custom_name(*type_id).unwrap_or("custom"));
            mold.write_str(&name);
        }
        Payload::Quoted(boxed) => {
            for _ in 0..boxed.depth() {
                mold.write_char('\'');
            }
            mold.value(boxed.cell());
        }
        Payload::Archetype { .. } => mold.write_str(&format!("#[{}!]", cell.kind().name())),
    }
}

/// Object fields hold evaluated values; words and paths among them need a quote to load back.
fn mold_field(mold: &mut Mold<'_>, value: &Cell) {
    let needs_quote = !value.is_quoted() && matches!(value.kind(), Kind::Word | Kind::SetWord | Kind::GetWord | Kind::Path | Kind::SetPath | Kind::GetPath);
    if needs_quote {
        mold.write_char('\'');
    }
    mold.value(value);
}

fn mold_items(mold: &mut Mold<'_>, cells: &[Cell]) {
    let broken = cells.iter().any(|item| item.has_flag(CellFlags::NEWLINE_BEFORE));
    if broken {
        mold.indent += 1;
    }
    for (position, item) in cells.iter().enumerate() {
        if item.has_flag(CellFlags::NEWLINE_BEFORE) {
            mold.newline();
        } else if position > 0 && mold.written() > 0 {
            mold.write_char(' ');
        }
        mold.value(item);
    }
    if broken {
        mold.indent -= 1;
        mold.newline();
    }
}

fn escape_char(mold: &mut Mold<'_>, ch: char) {
    match ch {
        '"' => mold.write_str("^\""),
        '^' => mold.write_str("^^"),
        '\n' => mold.write_str("^/"),
        '\t' => mold.write_str("^-"),
        ch => mold.write_char(ch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::GcInterface;
    use crate::vm_objects::text::Text;

    fn mold_one(interner: &Interner, cell: &Cell, form: bool) -> String {
        let hooks = HookTable::new();
        let mut buffer = MoldBuffer::new();
        let mut mold = Mold::push(&mut buffer, interner, &hooks, form);
        mold.value(cell);
        let text = mold.finish();
        assert!(buffer.is_idle());
        text
    }

    #[test]
    fn scalars() {
        let interner = Interner::default();
        assert_eq!(mold_one(&interner, &Cell::integer(-3), false), "-3");
        assert_eq!(mold_one(&interner, &Cell::decimal(1.5), false), "1.5");
        assert_eq!(mold_one(&interner, &Cell::char('a'), false), "#\"a\"");
        assert_eq!(mold_one(&interner, &Cell::text(Text::new("say \"hi\"")), false), "\"say ^\"hi^\"\"");
        assert_eq!(mold_one(&interner, &Cell::text(Text::new("plain")), true), "plain");
        assert_eq!(mold_one(&interner, &Cell::integer(7).quoted(2), false), "''7");
    }

    #[test]
    fn blocks_and_paths() {
        let mut interner = Interner::default();
        let mut gc = GcInterface::new();
        let (a, b) = (interner.intern("a"), interner.intern("b"));
        let path = gc.alloc_array(vec![Cell::word(Kind::Word, a), Cell::word(Kind::Word, b)]);
        let block = gc.alloc_array(vec![Cell::word(Kind::SetWord, a), Cell::integer(1), Cell::array(Kind::SetPath, path)]);
        assert_eq!(mold_one(&interner, &Cell::array(Kind::Block, block), false), "[a: 1 a/b:]");
    }

    #[test]
    fn cycles_are_cut() {
        let interner = Interner::default();
        let mut gc = GcInterface::new();
        let block = gc.alloc_array(vec![Cell::integer(1)]);
        block.push(Cell::array(Kind::Block, block.clone())).unwrap();
        assert_eq!(mold_one(&interner, &Cell::array(Kind::Block, block), false), "[1 [...]]");
    }

    #[test]
    fn abandoned_molds_leave_nothing_behind() {
        let interner = Interner::default();
        let hooks = HookTable::new();
        let mut buffer = MoldBuffer::new();
        {
            let mut mold = Mold::push(&mut buffer, &interner, &hooks, false);
            mold.write_str("half");
        }
        assert!(buffer.is_idle());
    }
}
