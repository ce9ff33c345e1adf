use ren_lexer::{Lexer, PathKind, PathPart, Token};
use rstest::rstest;

fn lex(input: &str) -> Vec<Token> {
    Lexer::new(input).skip_comments(true).skip_whitespace(true).collect()
}

#[test]
fn empty_block_test() {
    assert_eq!(lex("[ ]"), vec![Token::NewBlock, Token::EndBlock]);
}

#[test]
fn words_test() {
    let expected = vec![
        Token::Word("print".to_string()),
        Token::SetWord("x".to_string()),
        Token::GetWord("y".to_string()),
        Token::Refinement("only".to_string()),
        Token::Word("+".to_string()),
        Token::Word("<=".to_string()),
        Token::Word("/".to_string()),
    ];
    assert_eq!(lex("print x: :y /only + <= /"), expected);
}

#[rstest]
#[case("42", Token::LitInteger(42))]
#[case("-7", Token::LitInteger(-7))]
#[case("1.5", Token::LitDecimal(1.5))]
#[case("-0.25", Token::LitDecimal(-0.25))]
#[case("1.2.3", Token::LitTuple(vec![1, 2, 3]))]
#[case("_", Token::Blank)]
#[case("#\"a\"", Token::LitChar('a'))]
#[case("#\"^/\"", Token::LitChar('\n'))]
#[case("<local>", Token::LitTag("local".to_string()))]
fn literal_test(#[case] input: &str, #[case] expected: Token) {
    assert_eq!(lex(input), vec![expected]);
}

#[test]
fn strings_test() {
    assert_eq!(lex(r#""a^"b^/""#), vec![Token::LitString("a\"b\n".to_string())]);
    assert_eq!(lex("{outer {inner} done}"), vec![Token::LitString("outer {inner} done".to_string())]);
}

#[test]
fn paths_test() {
    assert_eq!(
        lex("a/b/1 obj/field: :f/ref"),
        vec![
            Token::Path(PathKind::Plain, vec![PathPart::Word("a".to_string()), PathPart::Word("b".to_string()), PathPart::Integer(1)]),
            Token::Path(PathKind::Set, vec![PathPart::Word("obj".to_string()), PathPart::Word("field".to_string())]),
            Token::Path(PathKind::Get, vec![PathPart::Word("f".to_string()), PathPart::Word("ref".to_string())]),
        ]
    );
}

#[test]
fn quotes_test() {
    assert_eq!(lex("''x"), vec![Token::Quote, Token::Quote, Token::Word("x".to_string())]);
}

#[test]
fn comments_and_lines_test() {
    let mut lexer = Lexer::new("a ; comment\n{multi\nline} b").skip_comments(true).skip_whitespace(true);
    assert_eq!(lexer.next(), Some(Token::Word("a".to_string())));
    assert_eq!(lexer.next(), Some(Token::Newline));
    assert_eq!(lexer.next(), Some(Token::LitString("multi\nline".to_string())));
    assert_eq!(lexer.token_line(), 2);
    assert_eq!(lexer.next(), Some(Token::Word("b".to_string())));
    assert_eq!(lexer.token_line(), 3);
    assert_eq!(lexer.next(), None);
}

#[rstest]
#[case("\"open")]
#[case("1x")]
#[case("a//b")]
#[case("#\"ab\"")]
fn invalid_test(#[case] input: &str) {
    assert!(matches!(lex(input).as_slice(), [Token::Invalid(_), ..]), "{:?}", lex(input));
}
