use std::fmt;
use std::str::Chars;

use crate::error::ParseError;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Keyword(Keyword),

    NumericLiteral(f64),
    StringLiteral(String),

    // Template literal, already split into cooked chunks and the raw
    // source of each `${...}` expression (parsed later by the parser).
    Template(Vec<TemplatePiece>),

    // Punctuators
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Dot,
    Ellipsis,
    Semicolon,
    Comma,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Exponent,
    Increment,
    Decrement,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    Ampersand,
    Pipe,
    Caret,
    Bang,
    Tilde,
    LogicalAnd,
    LogicalOr,
    NullishCoalescing,
    Question,
    Colon,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    ExponentAssign,
    LeftShiftAssign,
    RightShiftAssign,
    UnsignedRightShiftAssign,
    AmpersandAssign,
    PipeAssign,
    CaretAssign,
    Arrow,

    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TemplatePiece {
    Chunk(String),
    Expr(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    Async,
    Await,
    Break,
    Case,
    Catch,
    Const,
    Continue,
    Default,
    Delete,
    Do,
    Else,
    False,
    Finally,
    For,
    Function,
    If,
    Instanceof,
    Let,
    New,
    Null,
    Return,
    Switch,
    This,
    Throw,
    True,
    Try,
    Typeof,
    Var,
    Void,
    While,
}

impl Keyword {
    pub fn from_str(s: &str) -> Option<Keyword> {
        match s {
            "async" => Some(Keyword::Async),
            "await" => Some(Keyword::Await),
            "break" => Some(Keyword::Break),
            "case" => Some(Keyword::Case),
            "catch" => Some(Keyword::Catch),
            "const" => Some(Keyword::Const),
            "continue" => Some(Keyword::Continue),
            "default" => Some(Keyword::Default),
            "delete" => Some(Keyword::Delete),
            "do" => Some(Keyword::Do),
            "else" => Some(Keyword::Else),
            "false" => Some(Keyword::False),
            "finally" => Some(Keyword::Finally),
            "for" => Some(Keyword::For),
            "function" => Some(Keyword::Function),
            "if" => Some(Keyword::If),
            "instanceof" => Some(Keyword::Instanceof),
            "let" => Some(Keyword::Let),
            "new" => Some(Keyword::New),
            "null" => Some(Keyword::Null),
            "return" => Some(Keyword::Return),
            "switch" => Some(Keyword::Switch),
            "this" => Some(Keyword::This),
            "throw" => Some(Keyword::Throw),
            "true" => Some(Keyword::True),
            "try" => Some(Keyword::Try),
            "typeof" => Some(Keyword::Typeof),
            "var" => Some(Keyword::Var),
            "void" => Some(Keyword::Void),
            "while" => Some(Keyword::While),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Identifier(name) => write!(f, "{name}"),
            TokenKind::Keyword(k) => write!(f, "{k:?}"),
            TokenKind::NumericLiteral(n) => write!(f, "{n}"),
            TokenKind::StringLiteral(s) => write!(f, "\"{s}\""),
            TokenKind::Template(_) => write!(f, "template literal"),
            TokenKind::Eof => write!(f, "end of input"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

pub struct Lexer<'a> {
    chars: Chars<'a>,
    current: Option<char>,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut chars = source.chars();
        let current = chars.next();
        Lexer {
            chars,
            current,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(source: &'a str) -> Result<Vec<Token>, ParseError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = matches!(token.kind, TokenKind::Eof);
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current;
        if let Some(c) = ch {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.current = self.chars.next();
        ch
    }

    fn peek(&self) -> Option<char> {
        self.current
    }

    fn peek2(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line,
            column: self.column,
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek2() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek2() == Some('*') => {
                    let (line, column) = (self.line, self.column);
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            Some('*') if self.peek2() == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => {
                                self.advance();
                            }
                            None => {
                                return Err(ParseError {
                                    message: "Unterminated block comment".into(),
                                    line,
                                    column,
                                });
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace_and_comments()?;
        let (line, column) = (self.line, self.column);
        let kind = self.read_token_kind()?;
        Ok(Token { kind, line, column })
    }

    fn read_token_kind(&mut self) -> Result<TokenKind, ParseError> {
        let ch = match self.peek() {
            Some(c) => c,
            None => return Ok(TokenKind::Eof),
        };

        if ch.is_ascii_digit() || (ch == '.' && self.peek2().is_some_and(|c| c.is_ascii_digit())) {
            return self.read_number();
        }
        if ch == '"' || ch == '\'' {
            return self.read_string(ch);
        }
        if ch == '`' {
            return self.read_template();
        }
        if is_ident_start(ch) {
            return Ok(self.read_identifier());
        }

        self.advance();
        let kind = match ch {
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '~' => TokenKind::Tilde,
            '.' => {
                if self.peek() == Some('.') && self.peek2() == Some('.') {
                    self.advance();
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            '+' => match self.peek() {
                Some('+') => {
                    self.advance();
                    TokenKind::Increment
                }
                Some('=') => {
                    self.advance();
                    TokenKind::PlusAssign
                }
                _ => TokenKind::Plus,
            },
            '-' => match self.peek() {
                Some('-') => {
                    self.advance();
                    TokenKind::Decrement
                }
                Some('=') => {
                    self.advance();
                    TokenKind::MinusAssign
                }
                _ => TokenKind::Minus,
            },
            '*' => match self.peek() {
                Some('*') => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::ExponentAssign
                    } else {
                        TokenKind::Exponent
                    }
                }
                Some('=') => {
                    self.advance();
                    TokenKind::StarAssign
                }
                _ => TokenKind::Star,
            },
            '/' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }
            '=' => match self.peek() {
                Some('=') => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::StrictEqual
                    } else {
                        TokenKind::Equal
                    }
                }
                Some('>') => {
                    self.advance();
                    TokenKind::Arrow
                }
                _ => TokenKind::Assign,
            },
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::StrictNotEqual
                    } else {
                        TokenKind::NotEqual
                    }
                } else {
                    TokenKind::Bang
                }
            }
            '<' => match self.peek() {
                Some('=') => {
                    self.advance();
                    TokenKind::LessThanEqual
                }
                Some('<') => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::LeftShiftAssign
                    } else {
                        TokenKind::LeftShift
                    }
                }
                _ => TokenKind::LessThan,
            },
            '>' => match self.peek() {
                Some('=') => {
                    self.advance();
                    TokenKind::GreaterThanEqual
                }
                Some('>') => {
                    self.advance();
                    match self.peek() {
                        Some('>') => {
                            self.advance();
                            if self.peek() == Some('=') {
                                self.advance();
                                TokenKind::UnsignedRightShiftAssign
                            } else {
                                TokenKind::UnsignedRightShift
                            }
                        }
                        Some('=') => {
                            self.advance();
                            TokenKind::RightShiftAssign
                        }
                        _ => TokenKind::RightShift,
                    }
                }
                _ => TokenKind::GreaterThan,
            },
            '&' => match self.peek() {
                Some('&') => {
                    self.advance();
                    TokenKind::LogicalAnd
                }
                Some('=') => {
                    self.advance();
                    TokenKind::AmpersandAssign
                }
                _ => TokenKind::Ampersand,
            },
            '|' => match self.peek() {
                Some('|') => {
                    self.advance();
                    TokenKind::LogicalOr
                }
                Some('=') => {
                    self.advance();
                    TokenKind::PipeAssign
                }
                _ => TokenKind::Pipe,
            },
            '^' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::CaretAssign
                } else {
                    TokenKind::Caret
                }
            }
            '?' => {
                if self.peek() == Some('?') {
                    self.advance();
                    TokenKind::NullishCoalescing
                } else {
                    TokenKind::Question
                }
            }
            other => return Err(self.error(format!("Unexpected character '{other}'"))),
        };
        Ok(kind)
    }

    fn read_identifier(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match Keyword::from_str(&name) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Identifier(name),
        }
    }

    fn read_number(&mut self) -> Result<TokenKind, ParseError> {
        // Hex literals
        if self.peek() == Some('0') && matches!(self.peek2(), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    digits.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            if digits.is_empty() {
                return Err(self.error("Missing hexadecimal digits"));
            }
            let value = u64::from_str_radix(&digits, 16)
                .map_err(|_| self.error("Invalid hexadecimal literal"))?;
            return Ok(TokenKind::NumericLiteral(value as f64));
        }

        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') {
            let next_is_digit = self.peek2().is_some_and(|c| c.is_ascii_digit());
            if next_is_digit || text.is_empty() {
                text.push('.');
                self.advance();
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut lookahead = self.chars.clone();
            let mut first = lookahead.next();
            let mut signed = false;
            if matches!(first, Some('+') | Some('-')) {
                signed = true;
                first = lookahead.next();
            }
            if first.is_some_and(|c| c.is_ascii_digit()) {
                text.push('e');
                self.advance(); // e
                if signed {
                    text.push(self.peek().unwrap_or('+'));
                    self.advance();
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }
        let value: f64 = text
            .parse()
            .map_err(|_| self.error(format!("Invalid numeric literal '{text}'")))?;
        Ok(TokenKind::NumericLiteral(value))
    }

    fn read_string(&mut self, quote: char) -> Result<TokenKind, ParseError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.advance() {
                Some(c) if c == quote => return Ok(TokenKind::StringLiteral(value)),
                Some('\\') => value.push(self.read_escape()?),
                Some('\n') | None => {
                    return Err(ParseError {
                        message: "Unterminated string literal".into(),
                        line,
                        column,
                    });
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn read_escape(&mut self) -> Result<char, ParseError> {
        match self.advance() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('b') => Ok('\u{8}'),
            Some('f') => Ok('\u{c}'),
            Some('v') => Ok('\u{b}'),
            Some('0') => Ok('\0'),
            Some('u') => {
                if self.peek() != Some('{') {
                    let mut code = 0u32;
                    for _ in 0..4 {
                        let d = self
                            .advance()
                            .and_then(|c| c.to_digit(16))
                            .ok_or_else(|| self.error("Invalid unicode escape"))?;
                        code = code * 16 + d;
                    }
                    return char::from_u32(code)
                        .ok_or_else(|| self.error("Invalid unicode escape"));
                }
                self.advance(); // {
                let mut code = 0u32;
                loop {
                    match self.advance() {
                        Some('}') => break,
                        Some(c) => {
                            let d = c
                                .to_digit(16)
                                .ok_or_else(|| self.error("Invalid unicode escape"))?;
                            code = code * 16 + d;
                        }
                        None => return Err(self.error("Unterminated unicode escape")),
                    }
                }
                char::from_u32(code).ok_or_else(|| self.error("Invalid unicode escape"))
            }
            Some(c) => Ok(c),
            None => Err(self.error("Unterminated escape sequence")),
        }
    }

    fn read_template(&mut self) -> Result<TokenKind, ParseError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // backtick
        let mut pieces = Vec::new();
        let mut chunk = String::new();
        loop {
            match self.advance() {
                Some('`') => {
                    pieces.push(TemplatePiece::Chunk(chunk));
                    return Ok(TokenKind::Template(pieces));
                }
                Some('\\') => chunk.push(self.read_escape()?),
                Some('$') if self.peek() == Some('{') => {
                    self.advance(); // {
                    pieces.push(TemplatePiece::Chunk(std::mem::take(&mut chunk)));
                    let mut expr = String::new();
                    let mut depth = 1usize;
                    loop {
                        match self.advance() {
                            Some('{') => {
                                depth += 1;
                                expr.push('{');
                            }
                            Some('}') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                                expr.push('}');
                            }
                            Some(c) => expr.push(c),
                            None => {
                                return Err(ParseError {
                                    message: "Unterminated template expression".into(),
                                    line,
                                    column,
                                });
                            }
                        }
                    }
                    pieces.push(TemplatePiece::Expr(expr));
                }
                Some(c) => chunk.push(c),
                None => {
                    return Err(ParseError {
                        message: "Unterminated template literal".into(),
                        line,
                        column,
                    });
                }
            }
        }
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn identifiers_and_keywords() {
        assert_eq!(
            lex("var x = 42;"),
            vec![
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Identifier("x".into()),
                TokenKind::Assign,
                TokenKind::NumericLiteral(42.0),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_literals() {
        assert_eq!(
            lex(r#""hello""#),
            vec![TokenKind::StringLiteral("hello".into()), TokenKind::Eof]
        );
        assert_eq!(
            lex(r"'he\nllo'"),
            vec![TokenKind::StringLiteral("he\nllo".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(
            lex("0xff"),
            vec![TokenKind::NumericLiteral(255.0), TokenKind::Eof]
        );
        assert_eq!(
            lex("1.5e2"),
            vec![TokenKind::NumericLiteral(150.0), TokenKind::Eof]
        );
        assert_eq!(
            lex(".25"),
            vec![TokenKind::NumericLiteral(0.25), TokenKind::Eof]
        );
    }

    #[test]
    fn multi_char_punctuators() {
        assert_eq!(
            lex("a === b ?? c => d"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::StrictEqual,
                TokenKind::Identifier("b".into()),
                TokenKind::NullishCoalescing,
                TokenKind::Identifier("c".into()),
                TokenKind::Arrow,
                TokenKind::Identifier("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            lex("1 // one\n/* two\nlines */ 2"),
            vec![
                TokenKind::NumericLiteral(1.0),
                TokenKind::NumericLiteral(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn template_pieces() {
        let kinds = lex("`a${x + 1}b`");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Template(vec![
                    TemplatePiece::Chunk("a".into()),
                    TemplatePiece::Expr("x + 1".into()),
                    TemplatePiece::Chunk("b".into()),
                ]),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn line_and_column_tracking() {
        let tokens = Lexer::tokenize("let a;\n  a = 1;").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        let a_assign = &tokens[3];
        assert_eq!((a_assign.line, a_assign.column), (2, 3));
    }

    #[test]
    fn unterminated_string_reports_position() {
        let err = Lexer::tokenize("\n  'oops").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("Unterminated"));
    }
}
