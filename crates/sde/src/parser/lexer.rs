use super::{ParseError, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'code> {
    BracketRoundOpen,
    BracketRoundClose,
    BracketCurlyOpen,
    BracketCurlyClose,
    BracketSquareOpen,
    BracketSquareClose,
    Comment(&'code str),
    Integer(i64),
    Float(f64),
    Text(&'code str),
    Identifier(&'code str),
    True,
    False,
    None,
    Colon,
    Comma,
    Dot,
    Semicolon,
    Bar,
    Assign,
    Equal,
    NotEqual,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    Minus,
    Plus,
    Asterisk,
    Slash,
}

impl<'code> Token<'code> {
    pub fn into_cow_str(self) -> Cow<'code, str> {
        match self {
            Self::BracketRoundOpen => "(".into(),
            Self::BracketRoundClose => ")".into(),
            Self::BracketCurlyOpen => "{".into(),
            Self::BracketCurlyClose => "}".into(),
            Self::BracketSquareOpen => "[".into(),
            Self::BracketSquareClose => "]".into(),
            Self::Comment(comment) => comment.into(),
            Self::Integer(integer) => integer.to_string().into(),
            Self::Float(float) => float.to_string().into(),
            Self::Text(text) => format!("\"{text}\"").into(),
            Self::Identifier(identifier) => identifier.into(),
            Self::True => "True".into(),
            Self::False => "False".into(),
            Self::None => "None".into(),
            Self::Colon => ":".into(),
            Self::Comma => ",".into(),
            Self::Dot => ".".into(),
            Self::Semicolon => ";".into(),
            Self::Bar => "|".into(),
            Self::Assign => "=".into(),
            Self::Equal => "==".into(),
            Self::NotEqual => "!=".into(),
            Self::GreaterOrEqual => ">=".into(),
            Self::Greater => ">".into(),
            Self::LessOrEqual => "<=".into(),
            Self::Less => "<".into(),
            Self::Minus => "-".into(),
            Self::Plus => "+".into(),
            Self::Asterisk => "*".into(),
            Self::Slash => "/".into(),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.into_cow_str())
    }
}

/// Tokenizes a single sheet line. Lines never span newlines, so no
/// `Newline` token exists.
pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('(').to(Token::BracketRoundOpen),
        just(')').to(Token::BracketRoundClose),
        just('{').to(Token::BracketCurlyOpen),
        just('}').to(Token::BracketCurlyClose),
        just('[').to(Token::BracketSquareOpen),
        just(']').to(Token::BracketSquareClose),
    ));

    let comparator = choice((
        just("==").to(Token::Equal),
        just("!=").to(Token::NotEqual),
        just(">=").to(Token::GreaterOrEqual),
        just('>').to(Token::Greater),
        just("<=").to(Token::LessOrEqual),
        just('<').to(Token::Less),
    ));

    let punctuation = choice((
        just(':').to(Token::Colon),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just(';').to(Token::Semicolon),
        just('|').to(Token::Bar),
        just('=').to(Token::Assign),
        just('-').to(Token::Minus),
        just('+').to(Token::Plus),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
    ));

    let comment = just('#')
        .then(any().repeated())
        .to_slice()
        .map(Token::Comment);

    let number = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .try_map(|number: &str, span| {
            if number.contains('.') {
                number.parse().map(Token::Float).map_err(|_| {
                    ParseError::custom(span, format!("Invalid number '{number}'"))
                })
            } else {
                number.parse().map(Token::Integer).map_err(|_| {
                    ParseError::custom(span, format!("Integer '{number}' is out of range"))
                })
            }
        });

    // @TODO escape sequences inside text
    let text_double_quoted = just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'));
    let text_single_quoted = just('\'')
        .ignore_then(none_of('\'').repeated().to_slice())
        .then_ignore(just('\''));
    let text = text_double_quoted.or(text_single_quoted).map(Token::Text);

    let identifier_or_keyword = text::ascii::ident().map(|identifier: &str| match identifier {
        "True" | "true" => Token::True,
        "False" | "false" => Token::False,
        "None" | "null" => Token::None,
        _ => Token::Identifier(identifier),
    });

    let token = choice((
        bracket,
        comment,
        number,
        comparator,
        punctuation,
        text,
        identifier_or_keyword,
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded_by(text::inline_whitespace())
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chumsky::prelude::Parser;

    fn tokens(code: &str) -> Vec<Token<'_>> {
        let result = lexer().parse(code);
        assert!(!result.has_errors(), "unexpected lexer errors for {code:?}");
        result.into_output().unwrap().into_iter().map(|token| token.node).collect()
    }

    #[test]
    fn test_assignment_with_call() {
        assert_eq!(
            tokens("prompt = Prompt()"),
            vec![
                Token::Identifier("prompt"),
                Token::Assign,
                Token::Identifier("Prompt"),
                Token::BracketRoundOpen,
                Token::BracketRoundClose,
            ]
        );
    }

    #[test]
    fn test_numbers_and_keywords() {
        assert_eq!(
            tokens("42 7.5 True none None"),
            vec![
                Token::Integer(42),
                Token::Float(7.5),
                Token::True,
                Token::Identifier("none"),
                Token::None,
            ]
        );
    }

    #[test]
    fn test_both_quote_styles() {
        assert_eq!(
            tokens(r#"{"polarity": 'positive'}"#),
            vec![
                Token::BracketCurlyOpen,
                Token::Text("polarity"),
                Token::Colon,
                Token::Text("positive"),
                Token::BracketCurlyClose,
            ]
        );
    }

    #[test]
    fn test_comparators_win_over_assign() {
        assert_eq!(
            tokens("a == b != c = d"),
            vec![
                Token::Identifier("a"),
                Token::Equal,
                Token::Identifier("b"),
                Token::NotEqual,
                Token::Identifier("c"),
                Token::Assign,
                Token::Identifier("d"),
            ]
        );
    }

    #[test]
    fn test_trailing_comment() {
        assert_eq!(
            tokens("x = 1 # one"),
            vec![
                Token::Identifier("x"),
                Token::Assign,
                Token::Integer(1),
                Token::Comment("# one"),
            ]
        );
    }

    #[test]
    fn test_unterminated_text_is_an_error() {
        assert!(lexer().parse("x = 'oops").has_errors());
    }
}
