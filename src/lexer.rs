//! Lexical analysis: raw source text into a flat, positioned token stream.
//!
//! The stream the parser sees is final (no preprocessor); it always ends
//! with an explicit `EndOfFile` token.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

/// Token kinds for the lexical analyzer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // === LITERALS ===
    IntegerConstant(i64),
    FloatConstant(f64),
    CharacterConstant(u8),
    StringLiteral(String),

    // === IDENTIFIERS ===
    Identifier(String),

    // === KEYWORDS ===
    // Storage class specifiers
    Extern,
    Static,
    Typedef,

    // Type qualifiers
    Const,

    // Type specifiers
    Bool,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Void,

    // Complex type specifiers
    Struct,
    Union,
    Enum,

    // Control flow
    Break,
    Case,
    Continue,
    Default,
    Do,
    Else,
    For,
    Goto,
    If,
    Return,
    Switch,
    While,

    // Other keywords
    Sizeof,

    // === OPERATORS ===
    // Arithmetic operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Increment,
    Decrement,

    // Bitwise operators
    And,
    Or,
    Xor,
    Tilde,
    LeftShift,
    RightShift,

    // Logical / comparison operators
    Not,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    LogicAnd,
    LogicOr,

    // Assignment operators
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    DivAssign,
    ModAssign,

    // Member access
    Arrow,
    Dot,

    // Ternary operator
    Question,
    Colon,

    // === PUNCTUATION ===
    Comma,
    Semicolon,
    Ellipsis,

    // Brackets and parentheses
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,

    // === SPECIAL TOKENS ===
    EndOfFile,
}

impl TokenKind {
    /// Check if the token can begin a type in a declaration.
    pub fn is_type_specifier(&self) -> bool {
        matches!(
            self,
            TokenKind::Void
                | TokenKind::Bool
                | TokenKind::Char
                | TokenKind::Short
                | TokenKind::Int
                | TokenKind::Long
                | TokenKind::Float
                | TokenKind::Double
                | TokenKind::Struct
                | TokenKind::Union
                | TokenKind::Enum
        )
    }

    /// Check if the token is a storage class specifier.
    pub fn is_storage_class_specifier(&self) -> bool {
        matches!(
            self,
            TokenKind::Typedef | TokenKind::Extern | TokenKind::Static
        )
    }

    /// Check if the token can start a declaration, given typedef knowledge
    /// supplied by the parser.
    pub fn is_declaration_start(&self, is_typedef_name: bool) -> bool {
        if self.is_type_specifier() || self.is_storage_class_specifier() || *self == TokenKind::Const
        {
            return true;
        }
        if let TokenKind::Identifier(_) = self {
            return is_typedef_name;
        }
        false
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::IntegerConstant(v) => write!(f, "{}", v),
            TokenKind::FloatConstant(v) => write!(f, "{}", v),
            TokenKind::CharacterConstant(c) => write!(f, "'{}'", *c as char),
            TokenKind::StringLiteral(s) => write!(f, "\"{}\"", s),
            TokenKind::Identifier(name) => write!(f, "{}", name),
            TokenKind::Extern => write!(f, "extern"),
            TokenKind::Static => write!(f, "static"),
            TokenKind::Typedef => write!(f, "typedef"),
            TokenKind::Const => write!(f, "const"),
            TokenKind::Bool => write!(f, "_Bool"),
            TokenKind::Char => write!(f, "char"),
            TokenKind::Double => write!(f, "double"),
            TokenKind::Float => write!(f, "float"),
            TokenKind::Int => write!(f, "int"),
            TokenKind::Long => write!(f, "long"),
            TokenKind::Short => write!(f, "short"),
            TokenKind::Void => write!(f, "void"),
            TokenKind::Struct => write!(f, "struct"),
            TokenKind::Union => write!(f, "union"),
            TokenKind::Enum => write!(f, "enum"),
            TokenKind::Break => write!(f, "break"),
            TokenKind::Case => write!(f, "case"),
            TokenKind::Continue => write!(f, "continue"),
            TokenKind::Default => write!(f, "default"),
            TokenKind::Do => write!(f, "do"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::For => write!(f, "for"),
            TokenKind::Goto => write!(f, "goto"),
            TokenKind::If => write!(f, "if"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::Switch => write!(f, "switch"),
            TokenKind::While => write!(f, "while"),
            TokenKind::Sizeof => write!(f, "sizeof"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Increment => write!(f, "++"),
            TokenKind::Decrement => write!(f, "--"),
            TokenKind::And => write!(f, "&"),
            TokenKind::Or => write!(f, "|"),
            TokenKind::Xor => write!(f, "^"),
            TokenKind::Tilde => write!(f, "~"),
            TokenKind::LeftShift => write!(f, "<<"),
            TokenKind::RightShift => write!(f, ">>"),
            TokenKind::Not => write!(f, "!"),
            TokenKind::Less => write!(f, "<"),
            TokenKind::Greater => write!(f, ">"),
            TokenKind::LessEqual => write!(f, "<="),
            TokenKind::GreaterEqual => write!(f, ">="),
            TokenKind::Equal => write!(f, "=="),
            TokenKind::NotEqual => write!(f, "!="),
            TokenKind::LogicAnd => write!(f, "&&"),
            TokenKind::LogicOr => write!(f, "||"),
            TokenKind::Assign => write!(f, "="),
            TokenKind::PlusAssign => write!(f, "+="),
            TokenKind::MinusAssign => write!(f, "-="),
            TokenKind::StarAssign => write!(f, "*="),
            TokenKind::DivAssign => write!(f, "/="),
            TokenKind::ModAssign => write!(f, "%="),
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Question => write!(f, "?"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Ellipsis => write!(f, "..."),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::LeftBrace => write!(f, "{{"),
            TokenKind::RightBrace => write!(f, "}}"),
            TokenKind::EndOfFile => write!(f, "<eof>"),
        }
    }
}

/// Token with its source position (1-based line and column).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub col: u32,
}

impl Token {
    pub fn new(kind: TokenKind, line: u32, col: u32) -> Self {
        Token { kind, line, col }
    }
}

#[derive(Debug, Error)]
pub enum LexerError {
    #[error("unexpected character '{ch}'")]
    UnexpectedCharacter { ch: char, line: u32, col: u32 },
    #[error("invalid number literal '{text}'")]
    InvalidNumber { text: String, line: u32, col: u32 },
    #[error("unterminated string literal")]
    UnterminatedString { line: u32, col: u32 },
    #[error("invalid character literal")]
    InvalidCharacter { line: u32, col: u32 },
    #[error("unterminated block comment")]
    UnterminatedComment { line: u32, col: u32 },
}

impl LexerError {
    pub fn location(&self) -> (u32, u32) {
        match *self {
            LexerError::UnexpectedCharacter { line, col, .. }
            | LexerError::InvalidNumber { line, col, .. }
            | LexerError::UnterminatedString { line, col }
            | LexerError::InvalidCharacter { line, col }
            | LexerError::UnterminatedComment { line, col } => (line, col),
        }
    }
}

fn keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "_Bool" => TokenKind::Bool,
        "break" => TokenKind::Break,
        "case" => TokenKind::Case,
        "char" => TokenKind::Char,
        "const" => TokenKind::Const,
        "continue" => TokenKind::Continue,
        "default" => TokenKind::Default,
        "do" => TokenKind::Do,
        "double" => TokenKind::Double,
        "else" => TokenKind::Else,
        "enum" => TokenKind::Enum,
        "extern" => TokenKind::Extern,
        "float" => TokenKind::Float,
        "for" => TokenKind::For,
        "goto" => TokenKind::Goto,
        "if" => TokenKind::If,
        "int" => TokenKind::Int,
        "long" => TokenKind::Long,
        "return" => TokenKind::Return,
        "short" => TokenKind::Short,
        "sizeof" => TokenKind::Sizeof,
        "static" => TokenKind::Static,
        "struct" => TokenKind::Struct,
        "switch" => TokenKind::Switch,
        "typedef" => TokenKind::Typedef,
        "union" => TokenKind::Union,
        "void" => TokenKind::Void,
        "while" => TokenKind::While,
        _ => return None,
    };
    Some(kind)
}

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    /// Lexes the whole input. The returned stream always ends with an
    /// `EndOfFile` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::EndOfFile;
            tokens.push(token);
            if done {
                break;
            }
        }
        log::debug!("lexed {} tokens", tokens.len());
        Ok(tokens)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.input.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn eat_if(&mut self, expected: char) -> bool {
        if self.input.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexerError> {
        loop {
            match self.input.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let (line, col) = (self.line, self.col);
                    let mut lookahead = self.input.clone();
                    lookahead.next();
                    match lookahead.peek() {
                        Some('/') => {
                            while let Some(&c) = self.input.peek() {
                                if c == '\n' {
                                    break;
                                }
                                self.bump();
                            }
                        }
                        Some('*') => {
                            self.bump();
                            self.bump();
                            let mut closed = false;
                            while let Some(c) = self.bump() {
                                if c == '*' && self.eat_if('/') {
                                    closed = true;
                                    break;
                                }
                            }
                            if !closed {
                                return Err(LexerError::UnterminatedComment { line, col });
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace_and_comments()?;

        let line = self.line;
        let col = self.col;
        let token = |kind| Ok(Token::new(kind, line, col));

        let c = match self.bump() {
            Some(c) => c,
            None => return token(TokenKind::EndOfFile),
        };

        match c {
            _ if c.is_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(&c) = self.input.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                match keyword(&ident) {
                    Some(kind) => token(kind),
                    None => token(TokenKind::Identifier(ident)),
                }
            }
            _ if c.is_ascii_digit() => self.lex_number(c, line, col),
            '"' => {
                let mut s = String::new();
                loop {
                    match self.bump() {
                        Some('"') => break,
                        Some('\\') => {
                            let esc = self
                                .bump()
                                .ok_or(LexerError::UnterminatedString { line, col })?;
                            s.push(unescape(esc));
                        }
                        Some('\n') | None => {
                            return Err(LexerError::UnterminatedString { line, col });
                        }
                        Some(c) => s.push(c),
                    }
                }
                token(TokenKind::StringLiteral(s))
            }
            '\'' => {
                let value = match self.bump() {
                    Some('\\') => {
                        let esc = self
                            .bump()
                            .ok_or(LexerError::InvalidCharacter { line, col })?;
                        if !esc.is_ascii() {
                            return Err(LexerError::InvalidCharacter { line, col });
                        }
                        unescape(esc) as u8
                    }
                    Some('\'') | Some('\n') | None => {
                        return Err(LexerError::InvalidCharacter { line, col });
                    }
                    // A multibyte character does not fit the one-byte
                    // constant; truncating its scalar value would make
                    // up a different character.
                    Some(c) if !c.is_ascii() => {
                        return Err(LexerError::InvalidCharacter { line, col });
                    }
                    Some(c) => c as u8,
                };
                if !self.eat_if('\'') {
                    return Err(LexerError::InvalidCharacter { line, col });
                }
                token(TokenKind::CharacterConstant(value))
            }
            '+' => {
                if self.eat_if('+') {
                    token(TokenKind::Increment)
                } else if self.eat_if('=') {
                    token(TokenKind::PlusAssign)
                } else {
                    token(TokenKind::Plus)
                }
            }
            '-' => {
                if self.eat_if('-') {
                    token(TokenKind::Decrement)
                } else if self.eat_if('=') {
                    token(TokenKind::MinusAssign)
                } else if self.eat_if('>') {
                    token(TokenKind::Arrow)
                } else {
                    token(TokenKind::Minus)
                }
            }
            '*' => {
                if self.eat_if('=') {
                    token(TokenKind::StarAssign)
                } else {
                    token(TokenKind::Star)
                }
            }
            '/' => {
                if self.eat_if('=') {
                    token(TokenKind::DivAssign)
                } else {
                    token(TokenKind::Slash)
                }
            }
            '%' => {
                if self.eat_if('=') {
                    token(TokenKind::ModAssign)
                } else {
                    token(TokenKind::Percent)
                }
            }
            '&' => {
                if self.eat_if('&') {
                    token(TokenKind::LogicAnd)
                } else {
                    token(TokenKind::And)
                }
            }
            '|' => {
                if self.eat_if('|') {
                    token(TokenKind::LogicOr)
                } else {
                    token(TokenKind::Or)
                }
            }
            '^' => token(TokenKind::Xor),
            '~' => token(TokenKind::Tilde),
            '!' => {
                if self.eat_if('=') {
                    token(TokenKind::NotEqual)
                } else {
                    token(TokenKind::Not)
                }
            }
            '<' => {
                if self.eat_if('=') {
                    token(TokenKind::LessEqual)
                } else if self.eat_if('<') {
                    token(TokenKind::LeftShift)
                } else {
                    token(TokenKind::Less)
                }
            }
            '>' => {
                if self.eat_if('=') {
                    token(TokenKind::GreaterEqual)
                } else if self.eat_if('>') {
                    token(TokenKind::RightShift)
                } else {
                    token(TokenKind::Greater)
                }
            }
            '=' => {
                if self.eat_if('=') {
                    token(TokenKind::Equal)
                } else {
                    token(TokenKind::Assign)
                }
            }
            '.' => {
                // A leading dot can begin a float literal like `.5`.
                if matches!(self.input.peek(), Some(c) if c.is_ascii_digit()) {
                    return self.lex_number('.', line, col);
                }
                let mut lookahead = self.input.clone();
                if lookahead.next() == Some('.') && lookahead.next() == Some('.') {
                    self.bump();
                    self.bump();
                    token(TokenKind::Ellipsis)
                } else {
                    token(TokenKind::Dot)
                }
            }
            '?' => token(TokenKind::Question),
            ':' => token(TokenKind::Colon),
            ',' => token(TokenKind::Comma),
            ';' => token(TokenKind::Semicolon),
            '(' => token(TokenKind::LeftParen),
            ')' => token(TokenKind::RightParen),
            '[' => token(TokenKind::LeftBracket),
            ']' => token(TokenKind::RightBracket),
            '{' => token(TokenKind::LeftBrace),
            '}' => token(TokenKind::RightBrace),
            _ => Err(LexerError::UnexpectedCharacter { ch: c, line, col }),
        }
    }

    fn lex_number(&mut self, first: char, line: u32, col: u32) -> Result<Token, LexerError> {
        let mut text = String::from(first);
        let mut is_float = first == '.';
        while let Some(&c) = self.input.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else if c == '.' && !is_float {
                is_float = true;
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        // Long suffix adds nothing; the payload is already 64-bit.
        let _ = self.eat_if('l') || self.eat_if('L');

        let kind = if is_float {
            match text.parse::<f64>() {
                Ok(v) => TokenKind::FloatConstant(v),
                Err(_) => return Err(LexerError::InvalidNumber { text, line, col }),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => TokenKind::IntegerConstant(v),
                Err(_) => return Err(LexerError::InvalidNumber { text, line, col }),
            }
        };
        Ok(Token::new(kind, line, col))
    }
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        _ => c,
    }
}
