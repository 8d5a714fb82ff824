use chumsky::{input::ValueInput, pratt::*, prelude::*};
use std::fmt;
use std::ops::Range;

mod lexer;
pub use lexer::{Token, lexer};

pub use chumsky::prelude::{Input, Parser};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

/// Owned form of a lexer/parser error, detached from the borrowed source.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub span: Range<usize>,
}

impl SyntaxError {
    fn from_rich<T: fmt::Display>(error: ParseError<'_, T>) -> Self {
        Self {
            message: error.to_string(),
            span: error.span().into_range(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

enum Postfix {
    Attribute(String),
    MethodCall {
        method: String,
        arguments: Vec<Spanned<Expression>>,
    },
    Call(Vec<Spanned<Expression>>),
}

pub fn expression_parser<'code, I>()
-> impl Parser<'code, I, Spanned<Expression>, extra::Err<ParseError<'code, Token<'code>>>> + Clone
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    recursive(|expression| {
        let identifier = select! { Token::Identifier(identifier) => identifier.to_owned() };

        let literal = select! {
            Token::Integer(integer) => Literal::Integer(integer),
            Token::Float(float) => Literal::Float(float),
            Token::Text(text) => Literal::Text(text.to_owned()),
            Token::True => Literal::Boolean(true),
            Token::False => Literal::Boolean(false),
            Token::None => Literal::None,
        };
        let expression_literal = literal.map(Expression::Literal);

        let list = expression
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect()
            .delimited_by(
                just(Token::BracketSquareOpen),
                just(Token::BracketSquareClose),
            )
            .map(|items| Expression::List { items });

        let map = {
            // Bare identifiers are accepted as keys: `{polarity: "negative"}`
            let key = select! {
                Token::Text(text) => text.to_owned(),
                Token::Identifier(identifier) => identifier.to_owned(),
            }
            .map_with(|key, extra| Spanned {
                node: key,
                span: extra.span(),
            });

            key.then_ignore(just(Token::Colon))
                .then(expression.clone())
                .map(|(key, value)| MapEntry { key, value })
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect()
                .delimited_by(
                    just(Token::BracketCurlyOpen),
                    just(Token::BracketCurlyClose),
                )
                .map(|entries| Expression::Map { entries })
        };

        let closure = identifier
            .clone()
            .separated_by(just(Token::Comma))
            .collect()
            .delimited_by(just(Token::Bar), just(Token::Bar))
            .then(expression.clone())
            .map(|(parameters, body)| Expression::Closure {
                parameters,
                body: Box::new(body),
            });

        let reference = identifier.clone().map(Expression::Reference);

        let nested = expression
            .clone()
            .delimited_by(
                just(Token::BracketRoundOpen),
                just(Token::BracketRoundClose),
            );

        let atom = choice((expression_literal, list, map, closure, reference))
            .map_with(|expression, extra| Spanned {
                node: expression,
                span: extra.span(),
            })
            .or(nested);

        let arguments = expression
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(
                just(Token::BracketRoundOpen),
                just(Token::BracketRoundClose),
            );

        let postfix = choice((
            just(Token::Dot)
                .ignore_then(identifier)
                .then(arguments.clone().or_not())
                .map(|(name, arguments)| match arguments {
                    Some(arguments) => Postfix::MethodCall {
                        method: name,
                        arguments,
                    },
                    None => Postfix::Attribute(name),
                }),
            arguments.map(Postfix::Call),
        ));

        let chain = atom.foldl_with(postfix.repeated(), |target, postfix, extra| {
            let node = match postfix {
                Postfix::Attribute(name) => Expression::Attribute {
                    target: Box::new(target),
                    name,
                },
                Postfix::MethodCall { method, arguments } => Expression::MethodCall {
                    receiver: Box::new(target),
                    method,
                    arguments,
                },
                Postfix::Call(arguments) => Expression::Call {
                    callee: Box::new(target),
                    arguments,
                },
            };
            Spanned {
                node,
                span: extra.span(),
            }
        });

        chain.pratt((
            // Precedence 7 (highest): Negation
            prefix(7, just(Token::Minus), |_, operand, extra| Spanned {
                span: extra.span(),
                node: Expression::ArithmeticOperator(ArithmeticOperator::Negate {
                    operand: Box::new(operand),
                }),
            }),
            // Precedence 5: Multiplicative operators
            infix(left(5), just(Token::Asterisk), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::ArithmeticOperator(ArithmeticOperator::Multiply {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(5), just(Token::Slash), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::ArithmeticOperator(ArithmeticOperator::Divide {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            // Precedence 3: Additive operators
            infix(left(3), just(Token::Plus), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::ArithmeticOperator(ArithmeticOperator::Add {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(3), just(Token::Minus), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::ArithmeticOperator(ArithmeticOperator::Subtract {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            // Precedence 1 (lowest): Comparison operators
            infix(left(1), just(Token::Equal), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Comparator(Comparator::Equal {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(1), just(Token::NotEqual), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Comparator(Comparator::NotEqual {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(1), just(Token::Greater), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Comparator(Comparator::Greater {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(1), just(Token::GreaterOrEqual), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Comparator(Comparator::GreaterOrEqual {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(1), just(Token::Less), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Comparator(Comparator::Less {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
            infix(left(1), just(Token::LessOrEqual), |l, _, r, extra| Spanned {
                span: extra.span(),
                node: Expression::Comparator(Comparator::LessOrEqual {
                    operand_a: Box::new(l),
                    operand_b: Box::new(r),
                }),
            }),
        ))
    })
}

pub fn statement_parser<'code, I>()
-> impl Parser<'code, I, Spanned<Action>, extra::Err<ParseError<'code, Token<'code>>>>
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    let identifier = select! { Token::Identifier(identifier) => identifier.to_owned() };
    let expression = expression_parser();

    let assign = identifier
        .clone()
        .then_ignore(just(Token::Assign))
        .then(expression.clone())
        .map(|(name, value)| Action::Assign { name, value });

    let set_property = identifier
        .clone()
        .then_ignore(just(Token::Dot))
        .then(identifier)
        .then_ignore(just(Token::Assign))
        .then(expression.clone())
        .map(|((target, property), value)| Action::SetProperty {
            target,
            property,
            value,
        });

    let evaluate = expression.map(Action::Evaluate);

    choice((assign, set_property, evaluate))
        .map_with(|action, extra| Spanned {
            node: action,
            span: extra.span(),
        })
        .then_ignore(just(Token::Semicolon).or_not())
}

pub fn span_at(offset: usize) -> Span {
    Span::from(offset..offset)
}

fn lex(code: &str) -> Result<Vec<Spanned<Token<'_>>>, Vec<SyntaxError>> {
    let (tokens, errors) = lexer().parse(code).into_output_errors();
    if !errors.is_empty() {
        return Err(errors.into_iter().map(SyntaxError::from_rich).collect());
    }
    let mut tokens = tokens.unwrap_or_default();
    tokens.retain(|spanned_token| !matches!(spanned_token.node, Token::Comment(_)));
    Ok(tokens)
}

/// Syntax-checks one statement line.
///
/// Returns `Ok(None)` for a line holding nothing but a comment.
pub fn validate_statement(code: &str) -> Result<Option<Spanned<Action>>, Vec<SyntaxError>> {
    let tokens = lex(code)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    statement_parser()
        .then_ignore(end())
        .parse(tokens.map(span_at(code.len()), |Spanned { node, span }| (node, span)))
        .into_result()
        .map(Some)
        .map_err(|errors| errors.into_iter().map(SyntaxError::from_rich).collect())
}

/// Parses a standalone expression, e.g. the payload of a `props:` line.
pub fn parse_expression(code: &str) -> Result<Spanned<Expression>, Vec<SyntaxError>> {
    let tokens = lex(code)?;
    if tokens.is_empty() {
        return Err(vec![SyntaxError {
            message: "expected an expression".to_owned(),
            span: 0..code.len(),
        }]);
    }
    expression_parser()
        .then_ignore(end())
        .parse(tokens.map(span_at(code.len()), |Spanned { node, span }| (node, span)))
        .into_result()
        .map_err(|errors| errors.into_iter().map(SyntaxError::from_rich).collect())
}

#[derive(Debug, Clone)]
pub enum Action {
    Assign {
        name: String,
        value: Spanned<Expression>,
    },
    SetProperty {
        target: String,
        property: String,
        value: Spanned<Expression>,
    },
    Evaluate(Spanned<Expression>),
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    List {
        items: Vec<Spanned<Self>>,
    },
    Map {
        entries: Vec<MapEntry>,
    },
    Reference(String),
    Attribute {
        target: Box<Spanned<Self>>,
        name: String,
    },
    Call {
        callee: Box<Spanned<Self>>,
        arguments: Vec<Spanned<Self>>,
    },
    MethodCall {
        receiver: Box<Spanned<Self>>,
        method: String,
        arguments: Vec<Spanned<Self>>,
    },
    Closure {
        parameters: Vec<String>,
        body: Box<Spanned<Self>>,
    },
    Comparator(Comparator),
    ArithmeticOperator(ArithmeticOperator),
}

#[derive(Debug, Clone)]
pub enum Comparator {
    Equal {
        operand_a: Box<Spanned<Expression>>,
        operand_b: Box<Spanned<Expression>>,
    },
    NotEqual {
        operand_a: Box<Spanned<Expression>>,
        operand_b: Box<Spanned<Expression>>,
    },
    Greater {
        operand_a: Box<Spanned<Expression>>,
        operand_b: Box<Spanned<Expression>>,
    },
    GreaterOrEqual {
        operand_a: Box<Spanned<Expression>>,
        operand_b: Box<Spanned<Expression>>,
    },
    Less {
        operand_a: Box<Spanned<Expression>>,
        operand_b: Box<Spanned<Expression>>,
    },
    LessOrEqual {
        operand_a: Box<Spanned<Expression>>,
        operand_b: Box<Spanned<Expression>>,
    },
}

#[derive(Debug, Clone)]
pub enum ArithmeticOperator {
    Negate {
        operand: Box<Spanned<Expression>>,
    },
    Add {
        operand_a: Box<Spanned<Expression>>,
        operand_b: Box<Spanned<Expression>>,
    },
    Subtract {
        operand_a: Box<Spanned<Expression>>,
        operand_b: Box<Spanned<Expression>>,
    },
    Multiply {
        operand_a: Box<Spanned<Expression>>,
        operand_b: Box<Spanned<Expression>>,
    },
    Divide {
        operand_a: Box<Spanned<Expression>>,
        operand_b: Box<Spanned<Expression>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    None,
}

#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: Spanned<String>,
    pub value: Spanned<Expression>,
}
