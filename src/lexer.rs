//! Lexer for the template language
//!
//! Tokenizes Smarty-like template syntax with precise span tracking. Two
//! modes: raw text, and expressions inside a `{...}` directive. A `{`
//! followed by whitespace stays literal text.

use crate::ast::Span;
use std::sync::Arc;

/// A token with its span
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, offset: usize, len: usize) -> Self {
        Self {
            kind,
            span: Span::new(offset.into(), len),
        }
    }
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Text(String),     // Raw template text
    String(String),   // "string" or 'string'
    Int(i64),         // 123
    Double(f64),      // 1.23
    Variable(String), // $name
    Ident(String),    // member or modifier name

    // Keywords
    If,
    Else,
    ElseIf,
    EndIf,
    Foreach,
    EndForeach,
    ForeachElse,
    In,
    As,
    Assign,
    To,
    Is,
    True,
    False,
    Mode,
    Escape,

    // Delimiters
    Open,  // { starting a directive
    Close, // } ending a directive

    // Operators
    Arrow,    // =>
    Eq,       // ==
    Ne,       // !=
    Le,       // <=
    Ge,       // >=
    Lt,       // <
    Gt,       // >
    And,      // &&
    Or,       // ||
    Not,      // !
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    Pipe,     // |
    Colon,    // :
    Dot,      // .
    LBracket, // [
    RBracket, // ]
    LParen,   // (
    RParen,   // )

    // Special
    Eof,
    Error(String),
}

impl TokenKind {
    /// Map an identifier to its keyword, if it is one
    pub fn from_ident(s: &str) -> TokenKind {
        match s {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "elseif" => TokenKind::ElseIf,
            "endif" => TokenKind::EndIf,
            "foreach" => TokenKind::Foreach,
            "endforeach" => TokenKind::EndForeach,
            "foreachelse" => TokenKind::ForeachElse,
            "in" => TokenKind::In,
            "as" => TokenKind::As,
            "assign" => TokenKind::Assign,
            "to" => TokenKind::To,
            "is" => TokenKind::Is,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "mode" => TokenKind::Mode,
            "escape" => TokenKind::Escape,
            _ => TokenKind::Ident(s.to_string()),
        }
    }
}

/// Lexer state (owns the source string via Arc for cheap cloning)
pub struct Lexer {
    source: Arc<String>,
    /// Current byte position in source
    pos: usize,
    /// Are we inside a directive (vs raw text)?
    in_directive: bool,
    /// Pending tokens (for lookahead/pushback)
    pending: Vec<Token>,
}

impl Lexer {
    pub fn new(source: Arc<String>) -> Self {
        Self {
            source,
            pos: 0,
            in_directive: false,
            pending: Vec::new(),
        }
    }

    /// Peek at the next character without consuming
    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    /// Advance by one character and return it
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skip whitespace (only meaningful in directive mode)
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.pending.pop() {
            return token;
        }

        if self.in_directive {
            self.lex_directive()
        } else {
            self.lex_text()
        }
    }

    /// Does the `{` at the current position open a directive? Only when the
    /// next character exists and is not whitespace (Smarty compatibility).
    fn opens_directive(&self) -> bool {
        match self.source[self.pos + 1..].chars().next() {
            Some(c) => !c.is_whitespace(),
            None => false,
        }
    }

    /// Lex raw template text until a directive opens
    fn lex_text(&mut self) -> Token {
        let start = self.pos;
        let mut text = String::new();

        while let Some(c) = self.peek() {
            if c == '{' && self.opens_directive() {
                break;
            }
            text.push(self.advance().unwrap());
        }

        if text.is_empty() {
            self.lex_open_or_eof()
        } else {
            Token::new(TokenKind::Text(text), start, self.pos - start)
        }
    }

    /// Lex the `{` that opens a directive, or EOF
    fn lex_open_or_eof(&mut self) -> Token {
        let start = self.pos;
        if self.peek().is_none() {
            return Token::new(TokenKind::Eof, start, 0);
        }

        self.advance(); // consume '{'

        // {literal} ... {/literal} passes the enclosed bytes through
        if self.source[self.pos..].starts_with("literal}") {
            self.pos += "literal}".len();
            return self.lex_literal_block(start);
        }

        // end tags: {/if} {/foreach}
        if self.peek() == Some('/') {
            let tag_start = self.pos;
            self.advance();
            let ident = self.take_ident();
            let kind = match ident.as_str() {
                "if" => TokenKind::EndIf,
                "foreach" => TokenKind::EndForeach,
                _ => TokenKind::Error(format!("unknown end tag: {{/{ident}}}")),
            };
            self.in_directive = true;
            self.pending
                .push(Token::new(kind, tag_start, self.pos - tag_start));
            return Token::new(TokenKind::Open, start, 1);
        }

        self.in_directive = true;
        Token::new(TokenKind::Open, start, 1)
    }

    /// Consume everything up to `{/literal}` as raw text
    fn lex_literal_block(&mut self, start: usize) -> Token {
        match self.source[self.pos..].find("{/literal}") {
            Some(offset) => {
                let text = self.source[self.pos..self.pos + offset].to_string();
                self.pos += offset + "{/literal}".len();
                Token::new(TokenKind::Text(text), start, self.pos - start)
            }
            None => {
                self.pos = self.source.len();
                Token::new(
                    TokenKind::Error("unterminated {literal} block".to_string()),
                    start,
                    self.pos - start,
                )
            }
        }
    }

    /// Lex inside a `{...}` directive
    fn lex_directive(&mut self) -> Token {
        self.skip_whitespace();

        let start = self.pos;

        // two-character operators first
        if let Some(pair) = self.source.get(self.pos..self.pos + 2) {
            let kind = match pair {
                "==" => Some(TokenKind::Eq),
                "!=" => Some(TokenKind::Ne),
                "<=" => Some(TokenKind::Le),
                ">=" => Some(TokenKind::Ge),
                "&&" => Some(TokenKind::And),
                "||" => Some(TokenKind::Or),
                "=>" => Some(TokenKind::Arrow),
                _ => None,
            };
            if let Some(kind) = kind {
                self.pos += 2;
                return Token::new(kind, start, 2);
            }
        }

        match self.peek() {
            None => {
                self.in_directive = false;
                Token::new(
                    TokenKind::Error("unterminated directive".to_string()),
                    start,
                    0,
                )
            }
            Some(c) => match c {
                '}' => {
                    self.advance();
                    self.in_directive = false;
                    Token::new(TokenKind::Close, start, 1)
                }
                '$' => {
                    self.advance();
                    let name = self.take_ident();
                    if name.is_empty() {
                        Token::new(
                            TokenKind::Error("expected a variable name after $".to_string()),
                            start,
                            1,
                        )
                    } else {
                        Token::new(TokenKind::Variable(name), start, self.pos - start)
                    }
                }
                '<' => {
                    self.advance();
                    Token::new(TokenKind::Lt, start, 1)
                }
                '>' => {
                    self.advance();
                    Token::new(TokenKind::Gt, start, 1)
                }
                '=' => {
                    self.advance();
                    Token::new(TokenKind::Is, start, 1)
                }
                '!' => {
                    self.advance();
                    Token::new(TokenKind::Not, start, 1)
                }
                '+' => {
                    self.advance();
                    Token::new(TokenKind::Plus, start, 1)
                }
                '-' => {
                    self.advance();
                    Token::new(TokenKind::Minus, start, 1)
                }
                '*' => {
                    self.advance();
                    Token::new(TokenKind::Star, start, 1)
                }
                '/' => {
                    self.advance();
                    Token::new(TokenKind::Slash, start, 1)
                }
                '%' => {
                    self.advance();
                    Token::new(TokenKind::Percent, start, 1)
                }
                '|' => {
                    self.advance();
                    Token::new(TokenKind::Pipe, start, 1)
                }
                ':' => {
                    self.advance();
                    Token::new(TokenKind::Colon, start, 1)
                }
                '.' => {
                    self.advance();
                    Token::new(TokenKind::Dot, start, 1)
                }
                '[' => {
                    self.advance();
                    Token::new(TokenKind::LBracket, start, 1)
                }
                ']' => {
                    self.advance();
                    Token::new(TokenKind::RBracket, start, 1)
                }
                '(' => {
                    self.advance();
                    Token::new(TokenKind::LParen, start, 1)
                }
                ')' => {
                    self.advance();
                    Token::new(TokenKind::RParen, start, 1)
                }
                '"' | '\'' => self.lex_string(c),
                '0'..='9' => self.lex_number(),
                c if c.is_alphabetic() || c == '_' => {
                    let ident = self.take_ident();
                    Token::new(TokenKind::from_ident(&ident), start, self.pos - start)
                }
                c => {
                    self.advance();
                    Token::new(
                        TokenKind::Error(format!("unexpected character: {c}")),
                        start,
                        c.len_utf8(),
                    )
                }
            },
        }
    }

    /// Lex a string literal with backslash escapes
    fn lex_string(&mut self, quote: char) -> Token {
        let start = self.pos;
        self.advance(); // consume opening quote

        let mut value = String::new();

        loop {
            match self.advance() {
                None => {
                    return Token::new(
                        TokenKind::Error("unterminated string".to_string()),
                        start,
                        self.pos - start,
                    );
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('\\') => value.push('\\'),
                    Some(c) if c == quote => value.push(c),
                    Some(c) => {
                        value.push('\\');
                        value.push(c);
                    }
                    None => {
                        return Token::new(
                            TokenKind::Error("unterminated string".to_string()),
                            start,
                            self.pos - start,
                        );
                    }
                },
                Some(c) => value.push(c),
            }
        }

        Token::new(TokenKind::String(value), start, self.pos - start)
    }

    /// Lex an integer or floating literal
    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        let mut s = String::new();
        let mut is_double = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                s.push(self.advance().unwrap());
            } else if c == '.' && !is_double {
                // float, or a dot that belongs to the next token
                let dot_pos = self.pos;
                self.advance();

                if let Some(next) = self.peek() {
                    if next.is_ascii_digit() {
                        is_double = true;
                        s.push('.');
                        continue;
                    }
                }

                let value: i64 = s.parse().unwrap_or(0);
                self.pending.push(Token::new(TokenKind::Dot, dot_pos, 1));
                return Token::new(TokenKind::Int(value), start, dot_pos - start);
            } else {
                break;
            }
        }

        if is_double {
            let value: f64 = s.parse().unwrap_or(0.0);
            Token::new(TokenKind::Double(value), start, self.pos - start)
        } else {
            let value: i64 = s.parse().unwrap_or(0);
            Token::new(TokenKind::Int(value), start, self.pos - start)
        }
    }

    /// Consume an identifier ([A-Za-z0-9_]*) and return it
    fn take_ident(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(self.advance().unwrap());
            } else {
                break;
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(s: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(Arc::new(s.to_string()));
        let mut kinds = Vec::new();
        loop {
            let token = lexer.next_token();
            if matches!(token.kind, TokenKind::Eof) {
                break;
            }
            kinds.push(token.kind);
        }
        kinds
    }

    #[test]
    fn test_text_only() {
        assert_eq!(
            lex("hello world"),
            vec![TokenKind::Text("hello world".to_string())]
        );
    }

    #[test]
    fn test_output_directive() {
        assert_eq!(
            lex("{$name}"),
            vec![
                TokenKind::Open,
                TokenKind::Variable("name".to_string()),
                TokenKind::Close,
            ]
        );
    }

    #[test]
    fn test_brace_before_whitespace_is_literal() {
        assert_eq!(
            lex("a { b } c"),
            vec![TokenKind::Text("a { b } c".to_string())]
        );
    }

    #[test]
    fn test_newlines_preserved() {
        assert_eq!(
            lex("a\n{$x}\nb"),
            vec![
                TokenKind::Text("a\n".to_string()),
                TokenKind::Open,
                TokenKind::Variable("x".to_string()),
                TokenKind::Close,
                TokenKind::Text("\nb".to_string()),
            ]
        );
    }

    #[test]
    fn test_if_and_end_tag() {
        assert_eq!(
            lex("{if true}x{/if}"),
            vec![
                TokenKind::Open,
                TokenKind::If,
                TokenKind::True,
                TokenKind::Close,
                TokenKind::Text("x".to_string()),
                TokenKind::Open,
                TokenKind::EndIf,
                TokenKind::Close,
            ]
        );
    }

    #[test]
    fn test_endif_word_form() {
        assert_eq!(
            lex("{endif}"),
            vec![TokenKind::Open, TokenKind::EndIf, TokenKind::Close]
        );
    }

    #[test]
    fn test_foreach_tokens() {
        assert_eq!(
            lex("{foreach $map as $v => $k}"),
            vec![
                TokenKind::Open,
                TokenKind::Foreach,
                TokenKind::Variable("map".to_string()),
                TokenKind::As,
                TokenKind::Variable("v".to_string()),
                TokenKind::Arrow,
                TokenKind::Variable("k".to_string()),
                TokenKind::Close,
            ]
        );
    }

    #[test]
    fn test_member_and_filter() {
        assert_eq!(
            lex("{$a.b|toupper:1}"),
            vec![
                TokenKind::Open,
                TokenKind::Variable("a".to_string()),
                TokenKind::Dot,
                TokenKind::Ident("b".to_string()),
                TokenKind::Pipe,
                TokenKind::Ident("toupper".to_string()),
                TokenKind::Colon,
                TokenKind::Int(1),
                TokenKind::Close,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("{1 <= 2 && 3 != 4}"),
            vec![
                TokenKind::Open,
                TokenKind::Int(1),
                TokenKind::Le,
                TokenKind::Int(2),
                TokenKind::And,
                TokenKind::Int(3),
                TokenKind::Ne,
                TokenKind::Int(4),
                TokenKind::Close,
            ]
        );
    }

    #[test]
    fn test_assign_shorthand() {
        assert_eq!(
            lex("{$v=1}"),
            vec![
                TokenKind::Open,
                TokenKind::Variable("v".to_string()),
                TokenKind::Is,
                TokenKind::Int(1),
                TokenKind::Close,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            lex("{1.5 + 2}"),
            vec![
                TokenKind::Open,
                TokenKind::Double(1.5),
                TokenKind::Plus,
                TokenKind::Int(2),
                TokenKind::Close,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            lex(r#"{"a\nb" 'c\'d'}"#),
            vec![
                TokenKind::Open,
                TokenKind::String("a\nb".to_string()),
                TokenKind::String("c'd".to_string()),
                TokenKind::Close,
            ]
        );
    }

    #[test]
    fn test_literal_block() {
        assert_eq!(
            lex("a{literal}{$x}{/literal}b"),
            vec![
                TokenKind::Text("a".to_string()),
                TokenKind::Text("{$x}".to_string()),
                TokenKind::Text("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_unterminated_literal_block() {
        let kinds = lex("{literal}oops");
        assert!(matches!(kinds.last(), Some(TokenKind::Error(_))));
    }

    #[test]
    fn test_unterminated_string() {
        let kinds = lex("{\"oops}");
        assert!(kinds.iter().any(|k| matches!(k, TokenKind::Error(_))));
    }

    #[test]
    fn test_unterminated_directive() {
        let kinds = lex("{$x");
        assert!(matches!(kinds.last(), Some(TokenKind::Error(_))));
    }

    #[test]
    fn test_mode_directive() {
        assert_eq!(
            lex("{mode html}"),
            vec![
                TokenKind::Open,
                TokenKind::Mode,
                TokenKind::Ident("html".to_string()),
                TokenKind::Close,
            ]
        );
    }
}
