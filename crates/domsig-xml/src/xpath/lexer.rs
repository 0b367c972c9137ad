#![forbid(unsafe_code)]

//! XPath 1.0 tokenizer.
//!
//! Applies the lexical disambiguation rules of XPath 1.0 section 3.7: a `*`
//! or NCName following anything other than `@`, `::`, `(`, `[`, `,` or an
//! operator is an operator (`*`, `and`, `or`, `mod`, `div`); an NCName
//! followed by `(` is a function name or node type; an NCName followed by
//! `::` is an axis name.

use domsig_core::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    DotDot,
    At,
    Comma,
    ColonColon,
    Slash,
    DoubleSlash,
    Pipe,
    Plus,
    Minus,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Mod,
    Div,
    Multiply,
    Literal(String),
    Number(f64),
    /// `*`, `prefix:*` or a QName used as a name test.
    Name(NameToken),
    FunctionName(String),
    NodeType(String),
    AxisName(String),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameToken {
    Any,
    NamespaceAny(String),
    QName { prefix: Option<String>, local: String },
}

impl Token {
    /// Whether a following `*` or NCName must be read as a name test.
    fn expects_operand(&self) -> bool {
        matches!(
            self,
            Token::At
                | Token::ColonColon
                | Token::LParen
                | Token::LBracket
                | Token::Comma
                | Token::Slash
                | Token::DoubleSlash
                | Token::Pipe
                | Token::Plus
                | Token::Minus
                | Token::Eq
                | Token::Neq
                | Token::Lt
                | Token::Le
                | Token::Gt
                | Token::Ge
                | Token::And
                | Token::Or
                | Token::Mod
                | Token::Div
                | Token::Multiply
        )
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let operand_expected = tokens.last().map_or(true, Token::expects_operand);

        let token = match c {
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '[' => {
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            '@' => {
                i += 1;
                Token::At
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '|' => {
                i += 1;
                Token::Pipe
            }
            '+' => {
                i += 1;
                Token::Plus
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '=' => {
                i += 1;
                Token::Eq
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                i += 2;
                Token::Neq
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    Token::Le
                } else {
                    i += 1;
                    Token::Lt
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    Token::Ge
                } else {
                    i += 1;
                    Token::Gt
                }
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    i += 2;
                    Token::DoubleSlash
                } else {
                    i += 1;
                    Token::Slash
                }
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                i += 2;
                Token::ColonColon
            }
            '.' => {
                if chars.get(i + 1) == Some(&'.') {
                    i += 2;
                    Token::DotDot
                } else if chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) {
                    let (num, next) = read_number(&chars, i);
                    i = next;
                    Token::Number(num)
                } else {
                    i += 1;
                    Token::Dot
                }
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|ch| *ch == quote)
                    .map(|p| start + p)
                    .ok_or_else(|| Error::XPath(format!("unterminated literal in {input:?}")))?;
                i = end + 1;
                Token::Literal(chars[start..end].iter().collect())
            }
            '$' => {
                let (name, next) = read_ncname(&chars, i + 1);
                if name.is_empty() {
                    return Err(Error::XPath("empty variable name".into()));
                }
                i = next;
                Token::Variable(name)
            }
            '*' => {
                i += 1;
                if operand_expected {
                    Token::Name(NameToken::Any)
                } else {
                    Token::Multiply
                }
            }
            d if d.is_ascii_digit() => {
                let (num, next) = read_number(&chars, i);
                i = next;
                Token::Number(num)
            }
            n if is_name_start(n) => {
                let (name, next) = read_ncname(&chars, i);
                i = next;
                if !operand_expected {
                    match name.as_str() {
                        "and" => Token::And,
                        "or" => Token::Or,
                        "mod" => Token::Mod,
                        "div" => Token::Div,
                        other => {
                            return Err(Error::XPath(format!(
                                "unexpected name {other:?} in {input:?}"
                            )))
                        }
                    }
                } else {
                    read_name_token(&chars, &mut i, name)
                }
            }
            other => {
                return Err(Error::XPath(format!(
                    "unexpected character {other:?} in {input:?}"
                )))
            }
        };
        tokens.push(token);
    }
    Ok(tokens)
}

/// Classify an NCName in operand position: axis, function, node type or name test.
fn read_name_token(chars: &[char], i: &mut usize, name: String) -> Token {
    let after = skip_ws(chars, *i);
    if chars.get(after) == Some(&':') && chars.get(after + 1) == Some(&':') {
        return Token::AxisName(name);
    }
    // QName or prefix:* (no whitespace allowed around the colon).
    if chars.get(*i) == Some(&':') && chars.get(*i + 1) != Some(&':') {
        if chars.get(*i + 1) == Some(&'*') {
            *i += 2;
            return Token::Name(NameToken::NamespaceAny(name));
        }
        let (local, next) = read_ncname(chars, *i + 1);
        if !local.is_empty() {
            *i = next;
            let after = skip_ws(chars, *i);
            if chars.get(after) == Some(&'(') {
                return Token::FunctionName(format!("{name}:{local}"));
            }
            return Token::Name(NameToken::QName {
                prefix: Some(name),
                local,
            });
        }
    }
    let after = skip_ws(chars, *i);
    if chars.get(after) == Some(&'(') {
        return match name.as_str() {
            "comment" | "text" | "processing-instruction" | "node" => Token::NodeType(name),
            _ => Token::FunctionName(name),
        };
    }
    Token::Name(NameToken::QName {
        prefix: None,
        local: name,
    })
}

fn skip_ws(chars: &[char], mut i: usize) -> usize {
    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
        i += 1;
    }
    i
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn read_ncname(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    if !chars.get(i).is_some_and(|c| is_name_start(*c)) {
        return (String::new(), start);
    }
    while chars.get(i).is_some_and(|c| is_name_char(*c)) {
        i += 1;
    }
    (chars[start..i].iter().collect(), i)
}

fn read_number(chars: &[char], start: usize) -> (f64, usize) {
    let mut i = start;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
    }
    let text: String = chars[start..i].iter().collect();
    (text.parse().unwrap_or(f64::NAN), i)
}
