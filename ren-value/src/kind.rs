use anyhow::anyhow;
use std::fmt;

/// The logical type of a cell, as seen by the language.
///
/// Several kinds can share one physical layout (see [`Heart`]): a `set-word!` is laid out exactly
/// like a `word!`, a `group!` exactly like a `block!`.
///
/// Discriminants stay below [`crate::kind_byte::QUOTE_STEP`], which leaves room in the header byte
/// for three levels of in-situ quoting.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Null = 0,
    Void,
    Unset,
    Blank,
    Logic,
    Integer,
    Decimal,
    Char,
    Tuple,
    Text,
    Tag,
    Word,
    SetWord,
    GetWord,
    Refinement,
    Block,
    Group,
    Path,
    SetPath,
    GetPath,
    Action,
    Object,
    Module,
    Error,
    Frame,
    Datatype,
    Typeset,
    Param,
    Handle,
    Custom,
    Quoted,
}

/// The physical payload layout of a cell.
///
/// Code that manipulates payloads switches on the heart, code implementing language semantics
/// switches on the kind.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Heart {
    /// No payload at all (null, void, unset, blank).
    Unit,
    Logic,
    Integer,
    Decimal,
    Char,
    /// Short packed byte run (tuples).
    Bytes,
    /// Series of characters plus an index.
    String,
    /// Symbol plus optional binding.
    Word,
    /// Array plus an index and an optional specifier.
    Array,
    Action,
    Context,
    Datatype,
    Typeset,
    Param,
    Handle,
    Custom,
    /// Out-of-line quoting box, for depths the header byte can't hold.
    Quoted,
    /// The self-describing first slot of a varlist or a details array.
    Archetype,
}

impl Kind {
    /// Every kind, in discriminant order.
    pub const ALL: [Kind; 31] = [
        Kind::Null,
        Kind::Void,
        Kind::Unset,
        Kind::Blank,
        Kind::Logic,
        Kind::Integer,
        Kind::Decimal,
        Kind::Char,
        Kind::Tuple,
        Kind::Text,
        Kind::Tag,
        Kind::Word,
        Kind::SetWord,
        Kind::GetWord,
        Kind::Refinement,
        Kind::Block,
        Kind::Group,
        Kind::Path,
        Kind::SetPath,
        Kind::GetPath,
        Kind::Action,
        Kind::Object,
        Kind::Module,
        Kind::Error,
        Kind::Frame,
        Kind::Datatype,
        Kind::Typeset,
        Kind::Param,
        Kind::Handle,
        Kind::Custom,
        Kind::Quoted,
    ];

    /// Number of kinds, for sizing per-kind tables.
    pub const COUNT: usize = Self::ALL.len();

    /// The datatype name of this kind, without the trailing `!`.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Void => "void",
            Kind::Unset => "unset",
            Kind::Blank => "blank",
            Kind::Logic => "logic",
            Kind::Integer => "integer",
            Kind::Decimal => "decimal",
            Kind::Char => "char",
            Kind::Tuple => "tuple",
            Kind::Text => "text",
            Kind::Tag => "tag",
            Kind::Word => "word",
            Kind::SetWord => "set-word",
            Kind::GetWord => "get-word",
            Kind::Refinement => "refinement",
            Kind::Block => "block",
            Kind::Group => "group",
            Kind::Path => "path",
            Kind::SetPath => "set-path",
            Kind::GetPath => "get-path",
            Kind::Action => "action",
            Kind::Object => "object",
            Kind::Module => "module",
            Kind::Error => "error",
            Kind::Frame => "frame",
            Kind::Datatype => "datatype",
            Kind::Typeset => "typeset",
            Kind::Param => "param",
            Kind::Handle => "handle",
            Kind::Custom => "custom",
            Kind::Quoted => "quoted",
        }
    }

    /// Looks a kind up by its datatype name. Accepts the name with or without the trailing `!`.
    pub fn from_name(name: &str) -> Option<Kind> {
        let name = name.strip_suffix('!').unwrap_or(name);
        Self::ALL.iter().copied().find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    /// The physical layout used for cells of this kind.
    pub fn default_heart(self) -> Heart {
        match self {
            Kind::Null | Kind::Void | Kind::Unset | Kind::Blank => Heart::Unit,
            Kind::Logic => Heart::Logic,
            Kind::Integer => Heart::Integer,
            Kind::Decimal => Heart::Decimal,
            Kind::Char => Heart::Char,
            Kind::Tuple => Heart::Bytes,
            Kind::Text | Kind::Tag => Heart::String,
            Kind::Word | Kind::SetWord | Kind::GetWord | Kind::Refinement => Heart::Word,
            Kind::Block | Kind::Group | Kind::Path | Kind::SetPath | Kind::GetPath => Heart::Array,
            Kind::Action => Heart::Action,
            Kind::Object | Kind::Module | Kind::Error | Kind::Frame => Heart::Context,
            Kind::Datatype => Heart::Datatype,
            Kind::Typeset => Heart::Typeset,
            Kind::Param => Heart::Param,
            Kind::Handle => Heart::Handle,
            Kind::Custom => Heart::Custom,
            Kind::Quoted => Heart::Quoted,
        }
    }

    pub fn is_word(self) -> bool {
        self.default_heart() == Heart::Word
    }

    pub fn is_array(self) -> bool {
        self.default_heart() == Heart::Array
    }

    pub fn is_path(self) -> bool {
        matches!(self, Kind::Path | Kind::SetPath | Kind::GetPath)
    }

    pub fn is_string(self) -> bool {
        self.default_heart() == Heart::String
    }

    pub fn is_series(self) -> bool {
        self.is_array() || self.is_string()
    }

    pub fn is_context(self) -> bool {
        self.default_heart() == Heart::Context
    }

    pub fn is_number(self) -> bool {
        matches!(self, Kind::Integer | Kind::Decimal)
    }

    /// Kinds that evaluate to themselves.
    pub fn is_inert(self) -> bool {
        !matches!(
            self,
            Kind::Word
                | Kind::SetWord
                | Kind::GetWord
                | Kind::Group
                | Kind::Path
                | Kind::SetPath
                | Kind::GetPath
                | Kind::Action
                | Kind::Quoted
        )
    }
}

impl TryFrom<u8> for Kind {
    type Error = anyhow::Error;

    fn try_from(byte: u8) -> Result<Self, anyhow::Error> {
        Self::ALL.get(usize::from(byte)).copied().ok_or_else(|| anyhow!("no kind has the discriminant {}", byte))
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_follow_the_table() {
        for (index, kind) in Kind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, index);
            assert_eq!(Kind::try_from(index as u8).unwrap(), *kind);
        }
        assert!(Kind::try_from(Kind::COUNT as u8).is_err());
    }

    #[test]
    fn names_round_trip() {
        for kind in Kind::ALL {
            assert_eq!(Kind::from_name(kind.name()), Some(kind));
            assert_eq!(Kind::from_name(&kind.to_string()), Some(kind));
        }
        assert_eq!(Kind::from_name("no-such-type!"), None);
    }

    #[test]
    fn several_kinds_share_a_heart() {
        assert_eq!(Kind::SetWord.default_heart(), Kind::Word.default_heart());
        assert_eq!(Kind::Group.default_heart(), Heart::Array);
        assert_eq!(Kind::GetPath.default_heart(), Heart::Array);
        assert_eq!(Kind::Tag.default_heart(), Heart::String);
        assert_eq!(Kind::Frame.default_heart(), Heart::Context);
    }
}
