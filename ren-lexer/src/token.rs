/// The flavour of a path token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// `a/b`
    Plain,
    /// `a/b:`
    Set,
    /// `:a/b`
    Get,
}

/// One segment of a path token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathPart {
    Word(String),
    Integer(i64),
}

/// Represents a token from the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `[`
    NewBlock,
    /// `]`
    EndBlock,
    /// `(`
    NewGroup,
    /// `)`
    EndGroup,
    /// A `'` prefix, quoting whatever follows.
    Quote,
    /// `_`
    Blank,

    LitInteger(i64),
    LitDecimal(f64),
    /// Either `"..."` or `{...}`, escapes already resolved.
    LitString(String),
    /// `#"a"`
    LitChar(char),
    /// `<tag>`, brackets stripped.
    LitTag(String),
    /// `1.2.3`
    LitTuple(Vec<u8>),

    Word(String),
    /// `word:`
    SetWord(String),
    /// `:word`
    GetWord(String),
    /// `/word`
    Refinement(String),
    Path(PathKind, Vec<PathPart>),

    Newline,
    Whitespace,
    Comment(String),

    /// Text that doesn't form any valid token, with a description of what went wrong.
    Invalid(String),
}

impl Token {
    pub fn is_trivia(&self) -> bool {
        matches!(self, Token::Whitespace | Token::Comment(_) | Token::Newline)
    }
}
