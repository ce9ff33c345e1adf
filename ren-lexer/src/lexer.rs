use crate::token::{PathKind, PathPart, Token};

/// The lexical analyser for Ren source text.
///
/// It yields tokens one at a time. Line numbers are tracked so callers can ask where the last
/// token started.
#[derive(Debug, Clone)]
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    token_line: u32,
    skip_comments: bool,
    skip_whitespace: bool,
}

impl Lexer {
    /// Construct a new lexer.
    pub fn new<T: AsRef<str>>(input: T) -> Lexer {
        Lexer { chars: input.as_ref().chars().collect(), pos: 0, line: 1, token_line: 1, skip_comments: false, skip_whitespace: false }
    }

    /// Configure the lexer on whether to skip comments.
    pub fn skip_comments(mut self, value: bool) -> Lexer {
        self.skip_comments = value;
        self
    }

    /// Configure the lexer on whether to skip spaces and tabs. Line breaks are always reported.
    pub fn skip_whitespace(mut self, value: bool) -> Lexer {
        self.skip_whitespace = value;
        self
    }

    /// The line on which the most recently returned token started.
    pub fn token_line(&self) -> u32 {
        self.token_line
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn lex_one(&mut self) -> Option<Token> {
        self.token_line = self.line;
        let ch = self.peek()?;

        let token = match ch {
            '\n' => {
                self.bump();
                Token::Newline
            }
            ch if ch.is_whitespace() => {
                while self.peek().is_some_and(|ch| ch.is_whitespace() && ch != '\n') {
                    self.bump();
                }
                Token::Whitespace
            }
            ';' => {
                self.bump();
                let mut text = String::new();
                while let Some(ch) = self.peek().filter(|ch| *ch != '\n') {
                    text.push(ch);
                    self.bump();
                }
                Token::Comment(text)
            }
            '[' => {
                self.bump();
                Token::NewBlock
            }
            ']' => {
                self.bump();
                Token::EndBlock
            }
            '(' => {
                self.bump();
                Token::NewGroup
            }
            ')' => {
                self.bump();
                Token::EndGroup
            }
            '\'' => {
                self.bump();
                Token::Quote
            }
            '"' => {
                self.bump();
                self.lex_quoted_string()
            }
            '{' => {
                self.bump();
                self.lex_braced_string()
            }
            '}' => {
                self.bump();
                Token::Invalid("unmatched }".to_string())
            }
            '#' if self.peek_at(1) == Some('"') => {
                self.bump();
                self.bump();
                self.lex_char()
            }
            '<' if self.peek_at(1).is_some_and(|next| next.is_alphabetic() || next == '/') => {
                self.bump();
                self.lex_tag()
            }
            _ => {
                let atom = self.take_atom();
                classify_atom(&atom)
            }
        };

        Some(token)
    }

    /// A run of characters up to the next delimiter.
    fn take_atom(&mut self) -> String {
        let mut atom = String::new();
        while let Some(ch) = self.peek() {
            if is_delimiter(ch) {
                break;
            }
            atom.push(ch);
            self.bump();
        }
        atom
    }

    fn lex_escape(&mut self) -> Result<char, String> {
        match self.bump() {
            Some('/') => Ok('\n'),
            Some('-') => Ok('\t'),
            Some('"') => Ok('"'),
            Some('^') => Ok('^'),
            Some('{') => Ok('{'),
            Some('}') => Ok('}'),
            Some('@') => Ok('\0'),
            Some('(') => {
                let mut hex = String::new();
                loop {
                    match self.bump() {
                        Some(')') => break,
                        Some(ch) if ch.is_ascii_hexdigit() => hex.push(ch),
                        _ => return Err("bad ^(...) escape".to_string()),
                    }
                }
                u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32).ok_or_else(|| format!("bad codepoint ^({})", hex))
            }
            Some(other) => Err(format!("unknown escape ^{}", other)),
            None => Err("escape at end of input".to_string()),
        }
    }

    fn lex_quoted_string(&mut self) -> Token {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Token::LitString(text),
                Some('^') => match self.lex_escape() {
                    Ok(ch) => text.push(ch),
                    Err(message) => return Token::Invalid(message),
                },
                Some('\n') | None => return Token::Invalid("unterminated string".to_string()),
                Some(ch) => text.push(ch),
            }
        }
    }

    fn lex_braced_string(&mut self) -> Token {
        let mut text = String::new();
        let mut depth = 1usize;
        loop {
            match self.bump() {
                Some('{') => {
                    depth += 1;
                    text.push('{');
                }
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Token::LitString(text);
                    }
                    text.push('}');
                }
                Some('^') => match self.lex_escape() {
                    Ok(ch) => text.push(ch),
                    Err(message) => return Token::Invalid(message),
                },
                Some(ch) => text.push(ch),
                None => return Token::Invalid("unterminated string".to_string()),
            }
        }
    }

    fn lex_char(&mut self) -> Token {
        let ch = match self.bump() {
            Some('^') => match self.lex_escape() {
                Ok(ch) => ch,
                Err(message) => return Token::Invalid(message),
            },
            Some('"') | None => return Token::Invalid("empty character literal".to_string()),
            Some(ch) => ch,
        };
        match self.bump() {
            Some('"') => Token::LitChar(ch),
            _ => Token::Invalid("character literal holds more than one character".to_string()),
        }
    }

    fn lex_tag(&mut self) -> Token {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('>') => return Token::LitTag(text),
                Some('\n') | None => return Token::Invalid("unterminated tag".to_string()),
                Some(ch) => text.push(ch),
            }
        }
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            let token = self.lex_one()?;
            match token {
                Token::Whitespace if self.skip_whitespace => continue,
                Token::Comment(_) if self.skip_comments => continue,
                token => return Some(token),
            }
        }
    }
}

fn is_delimiter(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '[' | ']' | '(' | ')' | '"' | '{' | '}' | ';')
}

fn is_word_start(ch: char) -> bool {
    !ch.is_ascii_digit() && !matches!(ch, ':' | '/' | '\'' | '#' | '$' | '@' | '%' | ',')
}

fn is_valid_word(text: &str) -> bool {
    match text.chars().next() {
        Some(first) if is_word_start(first) || text == "/" || text == "//" => {
            text.chars().all(|ch| !matches!(ch, ':' | '\'' | '#' | '$' | '@' | '%' | ','))
                && (!text.contains('/') || text.chars().all(|ch| ch == '/'))
        }
        Some(first) if (first == '+' || first == '-') && text.len() == 1 => true,
        _ => false,
    }
}

fn classify_number(text: &str) -> Option<Token> {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    if digits.is_empty() || !digits.starts_with(|ch: char| ch.is_ascii_digit()) {
        return None;
    }

    if digits.chars().all(|ch| ch.is_ascii_digit()) {
        return Some(match text.parse::<i64>() {
            Ok(value) => Token::LitInteger(value),
            Err(_) => Token::Invalid(format!("integer out of range: {}", text)),
        });
    }

    let dots = digits.chars().filter(|ch| *ch == '.').count();
    let well_formed = digits.chars().all(|ch| ch.is_ascii_digit() || ch == '.') && !digits.ends_with('.');
    if !well_formed {
        return Some(Token::Invalid(format!("invalid number: {}", text)));
    }

    if dots == 1 {
        return Some(match text.parse::<f64>() {
            Ok(value) => Token::LitDecimal(value),
            Err(_) => Token::Invalid(format!("invalid decimal: {}", text)),
        });
    }

    if text.len() != digits.len() {
        return Some(Token::Invalid(format!("tuples can't be signed: {}", text)));
    }
    let segments: Result<Vec<u8>, _> = digits.split('.').map(str::parse::<u8>).collect();
    Some(match segments {
        Ok(segments) => Token::LitTuple(segments),
        Err(_) => Token::Invalid(format!("invalid tuple: {}", text)),
    })
}

fn classify_path(text: &str, kind: PathKind) -> Token {
    let mut parts = Vec::new();
    for segment in text.split('/') {
        if segment.is_empty() {
            return Token::Invalid(format!("empty path segment in {}", text));
        }
        if let Ok(index) = segment.parse::<i64>() {
            parts.push(PathPart::Integer(index));
        } else if is_valid_word(segment) {
            parts.push(PathPart::Word(segment.to_string()));
        } else {
            return Token::Invalid(format!("invalid path segment {} in {}", segment, text));
        }
    }
    Token::Path(kind, parts)
}

fn classify_atom(atom: &str) -> Token {
    if atom == "_" {
        return Token::Blank;
    }
    if let Some(number) = classify_number(atom) {
        return number;
    }

    if let Some(rest) = atom.strip_prefix(':') {
        if rest.contains('/') && !rest.starts_with('/') {
            return classify_path(rest, PathKind::Get);
        }
        return if is_valid_word(rest) { Token::GetWord(rest.to_string()) } else { Token::Invalid(format!("invalid get-word: {}", atom)) };
    }

    if let Some(rest) = atom.strip_suffix(':') {
        if rest.contains('/') && !rest.starts_with('/') {
            return classify_path(rest, PathKind::Set);
        }
        return if is_valid_word(rest) { Token::SetWord(rest.to_string()) } else { Token::Invalid(format!("invalid set-word: {}", atom)) };
    }

    if atom.chars().all(|ch| ch == '/') && atom.len() <= 2 {
        return Token::Word(atom.to_string());
    }

    if let Some(rest) = atom.strip_prefix('/') {
        return if is_valid_word(rest) { Token::Refinement(rest.to_string()) } else { Token::Invalid(format!("invalid refinement: {}", atom)) };
    }

    if atom.contains('/') {
        return classify_path(atom, PathKind::Plain);
    }

    if is_valid_word(atom) {
        Token::Word(atom.to_string())
    } else {
        Token::Invalid(format!("invalid word: {}", atom))
    }
}
