//! 词法分析
//!
//! 单遍扫描，直接产出 token 列表。非法字符与未闭合字符串记录为
//! ParseError 并继续扫描。

use super::error::ParseError;
use tern_config::targets;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // 字面量
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    // 关键字
    Var,
    If,
    Else,
    Effect,
    Handle,
    With,
    True,
    False,
    None,
    Record,
    And,
    Or,
    Not,

    // 符号
    LeftParen,
    RightParen,
    LeftCurly,
    RightCurly,
    LeftSquare,
    RightSquare,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Pipe,
    FatArrow,
    Equal,
    DoubleEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    Eof,
}

impl TokenKind {
    fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "var" => TokenKind::Var,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "effect" => TokenKind::Effect,
            "handle" => TokenKind::Handle,
            "with" => TokenKind::With,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "none" => TokenKind::None,
            "record" => TokenKind::Record,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            _ => return None,
        };
        Some(kind)
    }

    /// 给错误信息用的简短描述
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Int(n) => n.to_string(),
            TokenKind::Float(n) => n.to_string(),
            TokenKind::Str(s) => format!("{:?}", s),
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    errors: Vec<ParseError>,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// 下一个字符等于 expected 时消费它
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: TokenKind, line: usize, column: usize) {
        self.tokens.push(Token { kind, line, column });
    }

    fn error(&mut self, message: impl Into<String>, line: usize, column: usize) {
        self.errors.push(ParseError::at(message, line, column));
    }

    fn run(mut self) -> (Vec<Token>, Vec<ParseError>) {
        while let Some(c) = self.peek() {
            let (line, column) = (self.line, self.column);
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '/' => {
                    self.bump();
                    if self.eat('/') {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    } else {
                        self.push(TokenKind::Slash, line, column);
                    }
                }
                '"' => self.string(line, column),
                c if c.is_ascii_digit() => self.number(line, column),
                c if c.is_alphabetic() || c == '_' => self.identifier(line, column),
                _ => {
                    self.bump();
                    let kind = match c {
                        '(' => TokenKind::LeftParen,
                        ')' => TokenKind::RightParen,
                        '{' => TokenKind::LeftCurly,
                        '}' => TokenKind::RightCurly,
                        '[' => TokenKind::LeftSquare,
                        ']' => TokenKind::RightSquare,
                        ',' => TokenKind::Comma,
                        ';' => TokenKind::Semicolon,
                        ':' => TokenKind::Colon,
                        '.' => TokenKind::Dot,
                        '|' => TokenKind::Pipe,
                        '+' => TokenKind::Plus,
                        '-' => TokenKind::Minus,
                        '*' => TokenKind::Star,
                        '%' => TokenKind::Percent,
                        '=' if self.eat('>') => TokenKind::FatArrow,
                        '=' if self.eat('=') => TokenKind::DoubleEqual,
                        '=' => TokenKind::Equal,
                        '!' if self.eat('=') => TokenKind::BangEqual,
                        '<' if self.eat('=') => TokenKind::LessEqual,
                        '<' => TokenKind::Less,
                        '>' if self.eat('=') => TokenKind::GreaterEqual,
                        '>' => TokenKind::Greater,
                        other => {
                            self.error(format!("unexpected character '{}'", other), line, column);
                            continue;
                        }
                    };
                    self.push(kind, line, column);
                }
            }
        }
        let (line, column) = (self.line, self.column);
        self.push(TokenKind::Eof, line, column);
        (self.tokens, self.errors)
    }

    fn string(&mut self, line: usize, column: usize) {
        self.bump(); // 开头的引号
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some(other) => {
                        let (l, c) = (self.line, self.column);
                        self.error(format!("unknown escape '\\{}'", other), l, c);
                    }
                    None => {
                        self.error("unterminated string", line, column);
                        return;
                    }
                },
                Some(c) => text.push(c),
                None => {
                    self.error("unterminated string", line, column);
                    return;
                }
            }
        }
        self.push(TokenKind::Str(text), line, column);
    }

    fn number(&mut self, line: usize, column: usize) {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.bump();
                if c != '_' {
                    text.push(c);
                }
            } else {
                break;
            }
        }

        // 小数点后必须紧跟数字，否则 `.` 留给字段访问
        let mut lookahead = self.chars.clone();
        let is_float = lookahead.next() == Some('.')
            && lookahead.next().map(|c| c.is_ascii_digit()).unwrap_or(false);
        if is_float {
            self.bump();
            text.push('.');
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.bump();
                    text.push(c);
                } else {
                    break;
                }
            }
            match text.parse::<f64>() {
                Ok(n) => self.push(TokenKind::Float(n), line, column),
                Err(_) => self.error(format!("invalid float literal '{}'", text), line, column),
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => self.push(TokenKind::Int(n), line, column),
                Err(_) => self.error(format!("integer literal '{}' out of range", text), line, column),
            }
        }
    }

    fn identifier(&mut self, line: usize, column: usize) {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
                text.push(c);
            } else {
                break;
            }
        }
        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Ident(text));
        self.push(kind, line, column);
    }
}

/// 扫描整段源码；末尾总有一个 Eof token
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<ParseError>) {
    let (tokens, errors) = Scanner::new(source).run();
    debug!(
        target: targets::LEXER,
        tokens = tokens.len(),
        errors = errors.len(),
        "tokenized source"
    );
    (tokens, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, errors) = tokenize(source);
        assert!(errors.is_empty(), "{:?}", errors);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("var x = 1 + 2.5;"),
            vec![
                TokenKind::Var,
                TokenKind::Ident("x".into()),
                TokenKind::Equal,
                TokenKind::Int(1),
                TokenKind::Plus,
                TokenKind::Float(2.5),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(
            kinds("== != <= >= =>"),
            vec![
                TokenKind::DoubleEqual,
                TokenKind::BangEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::FatArrow,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_int_followed_by_field() {
        assert_eq!(
            kinds("1.x"),
            vec![
                TokenKind::Int(1),
                TokenKind::Dot,
                TokenKind::Ident("x".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\n\"b\"""#),
            vec![TokenKind::Str("a\n\"b\"".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_comments_and_lines() {
        let (tokens, _) = tokenize("// hello\nfoo");
        assert_eq!(tokens[0].kind, TokenKind::Ident("foo".into()));
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[0].column, 1);
    }

    #[test]
    fn test_errors_are_collected() {
        let (tokens, errors) = tokenize("1 @ 2 # 3");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].column, 3);
        assert_eq!(tokens.len(), 4); // 1 2 3 Eof
    }

    #[test]
    fn test_unterminated_string() {
        let (_, errors) = tokenize("\"abc");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "unterminated string");
    }
}
