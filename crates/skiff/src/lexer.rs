//! Pull lexer over a UTF-8 source buffer.
//!
//! Tokens are produced on demand; a single-token peek cache plus cloneable
//! [`Checkpoint`]s give the parser arbitrary backtracking (used for
//! arrow-function disambiguation). All positions are byte offsets into the
//! source; the per-module [`LineTable`] converts them to line/column for
//! error reporting.
//!
//! Template literals are lexed as a token stream: `` ` `` opens template
//! mode, then raw-text chunks ([`TokenKind::TemplateElement`]) alternate
//! with `${ ... }` interpolations. A stack of template frames tracks nesting
//! so `` `a${`b${c}`}d` `` resumes the outer template after the inner one
//! closes.

use num_bigint::BigInt;

use crate::{
    error::SyntaxError,
    token::{RegexFlags, Token, TokenKind, TokenValue, keyword_kind},
};

/// Result alias for lexer operations.
pub(crate) type LexResult<T> = Result<T, SyntaxError>;

/// Maps byte positions to 1-based (line, column) pairs.
///
/// Built once per module from the source text. Columns count characters,
/// not bytes, so multibyte sources report sensible positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTable {
    /// Byte offset of the first character of each line.
    line_starts: Vec<u32>,
}

impl LineTable {
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(u32::try_from(i + 1).unwrap_or(u32::MAX));
            }
        }
        Self { line_starts }
    }

    /// Returns the 1-based (line, column) of a byte position.
    #[must_use]
    pub fn line_col(&self, source: &str, pos: u32) -> (u32, u32) {
        let line_idx = match self.line_starts.binary_search(&pos) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[line_idx] as usize;
        let end = (pos as usize).min(source.len());
        let column = source[line_start..end].chars().count();
        (
            u32::try_from(line_idx + 1).unwrap_or(u32::MAX),
            u32::try_from(column + 1).unwrap_or(u32::MAX),
        )
    }
}

/// Nesting state for one template literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TemplateFrame {
    /// Scanning a raw-text chunk (between structural tokens).
    in_text: bool,
    /// Inside a `${ ... }` interpolation.
    in_interp: bool,
    /// Open `{` count inside the current interpolation, so object literals
    /// don't terminate it early.
    brace_depth: u32,
}

/// A restorable snapshot of the full lexer state.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    pos: usize,
    current: Token,
    peeked: Option<Token>,
    templates: Vec<TemplateFrame>,
}

pub(crate) struct Lexer<'src> {
    source: &'src str,
    /// Byte offset of the next unscanned character.
    pos: usize,
    /// Most recently consumed token; drives the regex-vs-divide rule.
    current: Token,
    peeked: Option<Token>,
    templates: Vec<TemplateFrame>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            pos: 0,
            current: Token::default(),
            peeked: None,
            templates: Vec::new(),
        }
    }

    /// Returns the next token without consuming it. The scan is cached.
    pub fn peek(&mut self) -> LexResult<&Token> {
        if self.peeked.is_none() {
            let token = self.read_token()?;
            self.peeked = Some(token);
        }
        Ok(self.peeked.as_ref().expect("peek cache just filled"))
    }

    /// Returns the kind of the next token without consuming it.
    pub fn peek_kind(&mut self) -> LexResult<TokenKind> {
        Ok(self.peek()?.kind)
    }

    /// Looks ahead `n` tokens (1 == `peek`) via checkpoint-restore.
    pub fn peek_n(&mut self, n: usize) -> LexResult<Token> {
        debug_assert!(n >= 1, "peek_n is 1-based");
        let checkpoint = self.checkpoint();
        let mut token = self.next()?;
        for _ in 1..n {
            token = self.next()?;
        }
        self.rewind(checkpoint);
        Ok(token)
    }

    /// Consumes and returns the next token.
    pub fn next(&mut self) -> LexResult<Token> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.read_token()?,
        };
        self.current = token.clone();
        Ok(token)
    }

    /// Consumes the next token, failing if it is not of the expected kind.
    pub fn expect(&mut self, kind: TokenKind) -> LexResult<Token> {
        let token = self.next()?;
        if token.kind == kind {
            Ok(token)
        } else {
            let expected: &'static str = kind.into();
            let found: &'static str = token.kind.into();
            Err(SyntaxError::new(
                format!("expected {expected}, found {found}"),
                token.pos,
            ))
        }
    }

    /// Consumes the next token if it has the given kind.
    pub fn eat(&mut self, kind: TokenKind) -> LexResult<bool> {
        if self.peek_kind()? == kind {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Byte position of the next token (whitespace and comments skipped).
    pub fn token_pos(&mut self) -> LexResult<u32> {
        Ok(self.peek()?.pos)
    }

    /// Byte position the scanner has advanced to. This is the end of the
    /// most recently scanned token when the peek cache is full.
    pub fn scan_pos(&self) -> u32 {
        u32::try_from(self.pos).unwrap_or(u32::MAX)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            current: self.current.clone(),
            peeked: self.peeked.clone(),
            templates: self.templates.clone(),
        }
    }

    pub fn rewind(&mut self, checkpoint: Checkpoint) {
        self.pos = checkpoint.pos;
        self.current = checkpoint.current;
        self.peeked = checkpoint.peeked;
        self.templates = checkpoint.templates;
    }

    // --- character helpers ---

    fn peek_char(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_char_at(&self, byte_offset: usize) -> Option<char> {
        self.source.get(self.pos + byte_offset..)?.chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.source[self.pos..].starts_with(s)
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    // --- scanning ---

    /// Scans one token and stamps its end position.
    fn read_token(&mut self) -> LexResult<Token> {
        let mut token = self.read_token_inner()?;
        token.end = self.scan_pos();
        Ok(token)
    }

    fn read_token_inner(&mut self) -> LexResult<Token> {
        if let Some(frame) = self.templates.last()
            && frame.in_text
        {
            return self.read_template_element();
        }

        self.skip_whitespace_and_comments()?;
        let start = self.scan_pos();
        let Some(c) = self.peek_char() else {
            return Ok(Token::new(TokenKind::Eof, start));
        };

        if c == '`' {
            self.bump();
            return Ok(self.handle_backtick(start));
        }
        if self.at_interp_boundary() {
            if c == '$' && self.starts_with("${") {
                self.pos += 2;
                let frame = self.templates.last_mut().expect("template frame present");
                frame.in_interp = true;
                frame.brace_depth = 0;
                return Ok(Token::new(TokenKind::TemplateInterpStart, start));
            }
            // A structural point only ever sees '`' or '${'; anything else
            // is a scanning bug upstream.
            return Err(SyntaxError::new("unterminated template literal", start));
        }

        if c.is_ascii_digit() {
            return self.read_number(start);
        }
        if c == '.' && self.peek_char_at(1).is_some_and(|d| d.is_ascii_digit()) {
            return self.read_number(start);
        }
        if is_ident_start(c) {
            return Ok(self.read_identifier(start));
        }
        if c == '"' || c == '\'' {
            return self.read_string(start, c);
        }
        if c == '/' && self.can_start_regex() {
            return self.read_regex(start);
        }

        self.read_operator(start)
    }

    /// True when the scanner sits between template chunks, expecting either
    /// `${` or the closing backtick.
    fn at_interp_boundary(&self) -> bool {
        self.templates
            .last()
            .is_some_and(|frame| !frame.in_text && !frame.in_interp)
    }

    fn handle_backtick(&mut self, start: u32) -> Token {
        if self.at_interp_boundary() {
            // Closing backtick of the current template.
            self.templates.pop();
        } else {
            // Opening backtick (possibly nested inside an interpolation).
            self.templates.push(TemplateFrame {
                in_text: true,
                in_interp: false,
                brace_depth: 0,
            });
        }
        Token::new(TokenKind::Backtick, start)
    }

    fn skip_whitespace_and_comments(&mut self) -> LexResult<()> {
        loop {
            match self.peek_char() {
                Some(c) if is_js_whitespace(c) => {
                    self.bump();
                }
                Some('/') if self.starts_with("//") => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.starts_with("/*") => {
                    let start = self.scan_pos();
                    self.pos += 2;
                    let mut closed = false;
                    while !self.at_eof() {
                        if self.eat_str("*/") {
                            closed = true;
                            break;
                        }
                        self.bump();
                    }
                    if !closed {
                        return Err(SyntaxError::new("unterminated block comment", start));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_identifier(&mut self, start: u32) -> Token {
        let begin = self.pos;
        while let Some(c) = self.peek_char() {
            if is_ident_part(c) {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.source[begin..self.pos];
        match keyword_kind(text) {
            Some(kind) => Token::new(kind, start),
            None => Token::with_value(TokenKind::Identifier, start, TokenValue::Str(text.to_owned())),
        }
    }

    // --- numbers ---

    fn read_number(&mut self, start: u32) -> LexResult<Token> {
        let token = if self.starts_with("0x") || self.starts_with("0X") {
            self.pos += 2;
            self.read_radix_number(start, 16)?
        } else if self.starts_with("0b") || self.starts_with("0B") {
            self.pos += 2;
            self.read_radix_number(start, 2)?
        } else if self.starts_with("0o") || self.starts_with("0O") {
            self.pos += 2;
            self.read_radix_number(start, 8)?
        } else {
            self.read_decimal_number(start)?
        };
        // `3abc` is not a number followed by an identifier.
        if self.peek_char().is_some_and(is_ident_start) {
            return Err(SyntaxError::new(
                "identifier starts immediately after numeric literal",
                start,
            ));
        }
        Ok(token)
    }

    fn read_radix_number(&mut self, start: u32, radix: u32) -> LexResult<Token> {
        let digits = self.scan_digits(start, radix)?;
        if digits.is_empty() {
            return Err(SyntaxError::new("missing digits after radix prefix", start));
        }
        if self.peek_char() == Some('n') {
            self.bump();
            let value = BigInt::parse_bytes(digits.as_bytes(), radix)
                .ok_or_else(|| SyntaxError::new("invalid BigInt literal", start))?;
            return Ok(Token::with_value(TokenKind::BigIntLiteral, start, TokenValue::BigInt(value)));
        }
        match u64::from_str_radix(&digits, radix) {
            Ok(v) => match i64::try_from(v) {
                Ok(i) => Ok(Token::with_value(TokenKind::IntLiteral, start, TokenValue::Int(i))),
                Err(_) => Ok(Token::with_value(
                    TokenKind::FloatLiteral,
                    start,
                    TokenValue::Float(v as f64),
                )),
            },
            // Wider than u64: approximate through BigInt like JS does for
            // oversized integer literals.
            Err(_) => {
                let value = BigInt::parse_bytes(digits.as_bytes(), radix)
                    .ok_or_else(|| SyntaxError::new("invalid numeric literal", start))?;
                Ok(Token::with_value(
                    TokenKind::FloatLiteral,
                    start,
                    TokenValue::Float(bigint_to_f64(&value)),
                ))
            }
        }
    }

    fn read_decimal_number(&mut self, start: u32) -> LexResult<Token> {
        let mut text = String::new();
        let mut is_float = false;

        if self.peek_char() != Some('.') {
            text.push_str(&self.scan_digits(start, 10)?);
        }
        if self.peek_char() == Some('.') && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            is_float = true;
            text.push('.');
            text.push_str(&self.scan_digits(start, 10)?);
        } else if self.peek_char() == Some('.') && !text.is_empty() {
            // `1.` is a valid float literal.
            self.bump();
            is_float = true;
            text.push('.');
            text.push('0');
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            self.bump();
            is_float = true;
            text.push('e');
            if matches!(self.peek_char(), Some('+' | '-')) {
                text.push(self.bump().expect("sign char present"));
            }
            let exp_digits = self.scan_digits(start, 10)?;
            if exp_digits.is_empty() {
                return Err(SyntaxError::new("missing digits in exponent", start));
            }
            text.push_str(&exp_digits);
        }

        if self.peek_char() == Some('n') {
            if is_float {
                return Err(SyntaxError::new(
                    "BigInt literal cannot have a fraction or exponent",
                    start,
                ));
            }
            self.bump();
            let value = BigInt::parse_bytes(text.as_bytes(), 10)
                .ok_or_else(|| SyntaxError::new("invalid BigInt literal", start))?;
            return Ok(Token::with_value(TokenKind::BigIntLiteral, start, TokenValue::BigInt(value)));
        }

        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| SyntaxError::new("invalid numeric literal", start))?;
            return Ok(Token::with_value(TokenKind::FloatLiteral, start, TokenValue::Float(value)));
        }

        // Integer literal: i64 if it fits, else the closest f64.
        match text.parse::<i64>() {
            Ok(v) => Ok(Token::with_value(TokenKind::IntLiteral, start, TokenValue::Int(v))),
            Err(_) => {
                let value: f64 = text
                    .parse()
                    .map_err(|_| SyntaxError::new("invalid numeric literal", start))?;
                Ok(Token::with_value(TokenKind::FloatLiteral, start, TokenValue::Float(value)))
            }
        }
    }

    /// Scans digits of the given radix, allowing `_` separators between
    /// digits. Returns the digits with separators removed.
    fn scan_digits(&mut self, start: u32, radix: u32) -> LexResult<String> {
        let mut digits = String::new();
        let mut last_was_separator = false;
        while let Some(c) = self.peek_char() {
            if c.is_digit(radix) {
                digits.push(c);
                last_was_separator = false;
                self.bump();
            } else if c == '_' {
                if digits.is_empty() || last_was_separator {
                    return Err(SyntaxError::new("misplaced digit separator", start));
                }
                last_was_separator = true;
                self.bump();
            } else {
                break;
            }
        }
        if last_was_separator {
            return Err(SyntaxError::new("misplaced digit separator", start));
        }
        Ok(digits)
    }

    // --- strings and templates ---

    fn read_string(&mut self, start: u32, quote: char) -> LexResult<Token> {
        self.bump();
        let mut value = String::new();
        loop {
            let Some(c) = self.peek_char() else {
                return Err(SyntaxError::new("unterminated string literal", start));
            };
            match c {
                _ if c == quote => {
                    self.bump();
                    return Ok(Token::with_value(TokenKind::StringLiteral, start, TokenValue::Str(value)));
                }
                '\n' | '\r' => {
                    return Err(SyntaxError::new("unterminated string literal", start));
                }
                '\\' => {
                    self.bump();
                    self.read_escape(start, &mut value)?;
                }
                _ => {
                    value.push(c);
                    self.bump();
                }
            }
        }
    }

    fn read_template_element(&mut self) -> LexResult<Token> {
        let start = self.scan_pos();
        let mut value = String::new();
        loop {
            if self.at_eof() {
                return Err(SyntaxError::new("unterminated template literal", start));
            }
            if self.starts_with("`") || self.starts_with("${") {
                let frame = self.templates.last_mut().expect("in template text mode");
                frame.in_text = false;
                return Ok(Token::with_value(TokenKind::TemplateElement, start, TokenValue::Str(value)));
            }
            let c = self.bump().expect("not at EOF");
            if c == '\\' {
                self.read_escape(start, &mut value)?;
            } else {
                value.push(c);
            }
        }
    }

    /// Reads one escape sequence (the leading `\` already consumed).
    fn read_escape(&mut self, literal_start: u32, out: &mut String) -> LexResult<()> {
        let Some(c) = self.bump() else {
            return Err(SyntaxError::new("unterminated escape sequence", literal_start));
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{0008}'),
            'f' => out.push('\u{000C}'),
            'v' => out.push('\u{000B}'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '`' => out.push('`'),
            // Line continuation: backslash before a newline elides both.
            '\n' => {}
            '\r' => {
                if self.peek_char() == Some('\n') {
                    self.bump();
                }
            }
            'x' => {
                let value = self.read_hex_digits(literal_start, 2)?;
                let c = char::from_u32(value)
                    .ok_or_else(|| SyntaxError::new("invalid escape sequence", literal_start))?;
                out.push(c);
            }
            'u' => {
                let code_point = if self.peek_char() == Some('{') {
                    self.bump();
                    let mut value: u32 = 0;
                    let mut digits = 0;
                    while let Some(c) = self.peek_char() {
                        if c == '}' {
                            break;
                        }
                        let digit = c
                            .to_digit(16)
                            .ok_or_else(|| SyntaxError::new("invalid Unicode escape", literal_start))?;
                        value = value
                            .checked_mul(16)
                            .and_then(|v| v.checked_add(digit))
                            .ok_or_else(|| SyntaxError::new("Unicode code point out of range", literal_start))?;
                        digits += 1;
                        self.bump();
                    }
                    if digits == 0 || self.bump() != Some('}') {
                        return Err(SyntaxError::new("invalid Unicode escape", literal_start));
                    }
                    if value > 0x10_FFFF {
                        return Err(SyntaxError::new("Unicode code point out of range", literal_start));
                    }
                    value
                } else {
                    let unit = self.read_hex_digits(literal_start, 4)?;
                    if (0xD800..=0xDBFF).contains(&unit) {
                        // High surrogate: reassemble with a following \uDC00..\uDFFF.
                        if self.eat_str("\\u") {
                            let low = self.read_hex_digits(literal_start, 4)?;
                            if !(0xDC00..=0xDFFF).contains(&low) {
                                return Err(SyntaxError::new("lone surrogate in string literal", literal_start));
                            }
                            0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00)
                        } else {
                            return Err(SyntaxError::new("lone surrogate in string literal", literal_start));
                        }
                    } else if (0xDC00..=0xDFFF).contains(&unit) {
                        return Err(SyntaxError::new("lone surrogate in string literal", literal_start));
                    } else {
                        unit
                    }
                };
                let c = char::from_u32(code_point)
                    .ok_or_else(|| SyntaxError::new("invalid Unicode escape", literal_start))?;
                out.push(c);
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn read_hex_digits(&mut self, literal_start: u32, count: u32) -> LexResult<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| SyntaxError::new("invalid hex escape", literal_start))?;
            value = value * 16 + digit;
        }
        Ok(value)
    }

    // --- regex ---

    /// A `/` starts a regex when the previous token cannot end an expression.
    fn can_start_regex(&self) -> bool {
        !self.current.kind.can_end_expression() && !self.starts_with("//") && !self.starts_with("/*")
    }

    fn read_regex(&mut self, start: u32) -> LexResult<Token> {
        self.bump();
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            let Some(c) = self.peek_char() else {
                return Err(SyntaxError::new("unterminated regular expression", start));
            };
            match c {
                '\n' | '\r' | '\u{2028}' | '\u{2029}' => {
                    return Err(SyntaxError::new("unterminated regular expression", start));
                }
                '\\' => {
                    self.bump();
                    let Some(escaped) = self.bump() else {
                        return Err(SyntaxError::new("unterminated regular expression", start));
                    };
                    pattern.push('\\');
                    pattern.push(escaped);
                }
                '[' => {
                    in_class = true;
                    pattern.push(c);
                    self.bump();
                }
                ']' => {
                    in_class = false;
                    pattern.push(c);
                    self.bump();
                }
                '/' if !in_class => {
                    self.bump();
                    break;
                }
                _ => {
                    pattern.push(c);
                    self.bump();
                }
            }
        }
        let mut flags = RegexFlags::default();
        while let Some(c) = self.peek_char() {
            if !is_ident_part(c) {
                break;
            }
            if !flags.set(c) {
                return Err(SyntaxError::new(format!("invalid regular expression flag '{c}'"), start));
            }
            self.bump();
        }
        Ok(Token::with_value(
            TokenKind::RegexLiteral,
            start,
            TokenValue::Regex { pattern, flags },
        ))
    }

    // --- operators and separators ---

    fn read_operator(&mut self, start: u32) -> LexResult<Token> {
        let c = self.bump().expect("caller checked non-EOF");
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBrack,
            ']' => TokenKind::RBrack,
            '{' => {
                if let Some(frame) = self.templates.last_mut()
                    && frame.in_interp
                {
                    frame.brace_depth += 1;
                }
                TokenKind::LBrace
            }
            '}' => {
                if let Some(frame) = self.templates.last_mut()
                    && frame.in_interp
                {
                    if frame.brace_depth == 0 {
                        frame.in_interp = false;
                        frame.in_text = true;
                        return Ok(Token::new(TokenKind::TemplateInterpEnd, start));
                    }
                    frame.brace_depth -= 1;
                }
                TokenKind::RBrace
            }
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '~' => TokenKind::BitNot,
            '.' => {
                if self.eat_str("..") {
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            '+' => {
                if self.eat_str("+") {
                    TokenKind::PlusPlus
                } else if self.eat_str("=") {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat_str("-") {
                    TokenKind::MinusMinus
                } else if self.eat_str("=") {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.eat_str("*=") {
                    TokenKind::StarStarAssign
                } else if self.eat_str("*") {
                    TokenKind::StarStar
                } else if self.eat_str("=") {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.eat_str("=") {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.eat_str("=") {
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }
            '=' => {
                if self.eat_str("==") {
                    TokenKind::EqStrict
                } else if self.eat_str("=") {
                    TokenKind::Eq
                } else if self.eat_str(">") {
                    TokenKind::Arrow
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.eat_str("==") {
                    TokenKind::NeStrict
                } else if self.eat_str("=") {
                    TokenKind::Ne
                } else {
                    TokenKind::Not
                }
            }
            '<' => {
                if self.eat_str("<=") {
                    TokenKind::ShlAssign
                } else if self.eat_str("<") {
                    TokenKind::Shl
                } else if self.eat_str("=") {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.eat_str(">>=") {
                    TokenKind::UShrAssign
                } else if self.eat_str(">>") {
                    TokenKind::UShr
                } else if self.eat_str(">=") {
                    TokenKind::ShrAssign
                } else if self.eat_str(">") {
                    TokenKind::Shr
                } else if self.eat_str("=") {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.eat_str("&") {
                    TokenKind::AndAnd
                } else if self.eat_str("=") {
                    TokenKind::BitAndAssign
                } else {
                    TokenKind::BitAnd
                }
            }
            '|' => {
                if self.eat_str("|") {
                    TokenKind::OrOr
                } else if self.eat_str("=") {
                    TokenKind::BitOrAssign
                } else {
                    TokenKind::BitOr
                }
            }
            '^' => {
                if self.eat_str("=") {
                    TokenKind::BitXorAssign
                } else {
                    TokenKind::BitXor
                }
            }
            '?' => {
                if self.eat_str("?") {
                    TokenKind::QuestionQuestion
                } else if self.eat_str(".") {
                    TokenKind::QuestionDot
                } else {
                    TokenKind::Question
                }
            }
            other => {
                return Err(SyntaxError::new(format!("unexpected character '{other}'"), start));
            }
        };
        Ok(Token::new(kind, start))
    }
}

fn is_js_whitespace(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t' | '\r' | '\n' | '\u{000B}' | '\u{000C}' | '\u{00A0}' | '\u{FEFF}' | '\u{2028}' | '\u{2029}'
    )
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

fn is_ident_part(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphanumeric()
}

/// Lossy BigInt -> f64 conversion for oversized integer literals.
fn bigint_to_f64(value: &BigInt) -> f64 {
    use num_traits::ToPrimitive;
    value.to_f64().unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next().expect("lex failure");
            if token.kind == TokenKind::Eof {
                return out;
            }
            out.push(token.kind);
        }
    }

    fn single(source: &str) -> Token {
        let mut lexer = Lexer::new(source);
        let token = lexer.next().expect("lex failure");
        assert_eq!(lexer.next().expect("lex failure").kind, TokenKind::Eof);
        token
    }

    #[test]
    fn identifiers_and_keywords() {
        assert_eq!(single("foo").kind, TokenKind::Identifier);
        assert_eq!(single("foo").value, TokenValue::Str("foo".to_owned()));
        assert_eq!(single("let").kind, TokenKind::Let);
        assert_eq!(single("instanceof").kind, TokenKind::Instanceof);
        // Contextual keywords stay identifiers.
        assert!(single("of").is_ident("of"));
        assert!(single("async").is_ident("async"));
    }

    #[test]
    fn numbers() {
        assert_eq!(single("42").value, TokenValue::Int(42));
        assert_eq!(single("1_000_000").value, TokenValue::Int(1_000_000));
        assert_eq!(single("0xff").value, TokenValue::Int(255));
        assert_eq!(single("0b1010").value, TokenValue::Int(10));
        assert_eq!(single("0o755").value, TokenValue::Int(493));
        assert_eq!(single("1.5").value, TokenValue::Float(1.5));
        assert_eq!(single("1e3").value, TokenValue::Float(1000.0));
        assert_eq!(single("2.5e-1").value, TokenValue::Float(0.25));
        assert_eq!(single(".5").value, TokenValue::Float(0.5));
        assert_eq!(single("42n").kind, TokenKind::BigIntLiteral);
    }

    #[test]
    fn number_errors() {
        assert!(Lexer::new("0x").next().is_err());
        assert!(Lexer::new("1__0").next().is_err());
        assert!(Lexer::new("_1").next().unwrap().kind == TokenKind::Identifier);
        assert!(Lexer::new("1_").next().is_err());
        assert!(Lexer::new("1.5n").next().is_err());
        assert!(Lexer::new("1e3n").next().is_err());
        assert!(Lexer::new("3abc").next().is_err());
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(single(r#""hi""#).value, TokenValue::Str("hi".to_owned()));
        assert_eq!(single(r#"'a\nb'"#).value, TokenValue::Str("a\nb".to_owned()));
        assert_eq!(single(r#"'\x41'"#).value, TokenValue::Str("A".to_owned()));
        assert_eq!(single(r#"'A'"#).value, TokenValue::Str("A".to_owned()));
        assert_eq!(single(r#"'\u{1F600}'"#).value, TokenValue::Str("\u{1F600}".to_owned()));
        // Surrogate pair reassembly.
        assert_eq!(single(r"'\uD83D\uDE00'").value, TokenValue::Str("\u{1F600}".to_owned()));
        // Line continuation.
        assert_eq!(single("'a\\\nb'").value, TokenValue::Str("ab".to_owned()));
    }

    #[test]
    fn string_errors_report_literal_start() {
        let mut lexer = Lexer::new("  'abc");
        let err = lexer.next().expect_err("unterminated string must fail");
        assert_eq!(err.pos, 2);

        let err = Lexer::new("'\\uDC00'").next().expect_err("lone surrogate must fail");
        assert_eq!(err.pos, 0);

        let err = Lexer::new("'a\nb'").next().expect_err("newline in string must fail");
        assert_eq!(err.pos, 0);
    }

    #[test]
    fn unterminated_block_comment() {
        let err = Lexer::new("1 /* comment").nth_error(2);
        assert_eq!(err.pos, 2);
    }

    #[test]
    fn operators_maximal_munch() {
        assert_eq!(
            kinds("a >>>= b >>> c >> d > e"),
            vec![
                TokenKind::Identifier,
                TokenKind::UShrAssign,
                TokenKind::Identifier,
                TokenKind::UShr,
                TokenKind::Identifier,
                TokenKind::Shr,
                TokenKind::Identifier,
                TokenKind::Gt,
                TokenKind::Identifier,
            ]
        );
        assert_eq!(
            kinds("a === b !== c ?? d?.e => ..."),
            vec![
                TokenKind::Identifier,
                TokenKind::EqStrict,
                TokenKind::Identifier,
                TokenKind::NeStrict,
                TokenKind::Identifier,
                TokenKind::QuestionQuestion,
                TokenKind::Identifier,
                TokenKind::QuestionDot,
                TokenKind::Identifier,
                TokenKind::Arrow,
                TokenKind::Ellipsis,
            ]
        );
    }

    #[test]
    fn regex_vs_divide() {
        // Expression-continuing context: both slashes are division.
        assert_eq!(
            kinds("a/b/g"),
            vec![
                TokenKind::Identifier,
                TokenKind::Slash,
                TokenKind::Identifier,
                TokenKind::Slash,
                TokenKind::Identifier,
            ]
        );
        // After `return`, a slash begins a regex.
        let mut lexer = Lexer::new("return /a/g");
        assert_eq!(lexer.next().unwrap().kind, TokenKind::Return);
        let regex = lexer.next().unwrap();
        assert_eq!(regex.kind, TokenKind::RegexLiteral);
        match regex.value {
            TokenValue::Regex { pattern, flags } => {
                assert_eq!(pattern, "a");
                assert!(flags.global);
            }
            other => panic!("expected regex value, got {other:?}"),
        }
    }

    #[test]
    fn regex_char_class_and_errors() {
        let token = single("/[/]/");
        match token.value {
            TokenValue::Regex { pattern, .. } => assert_eq!(pattern, "[/]"),
            other => panic!("expected regex value, got {other:?}"),
        }
        let err = Lexer::new("/ab\ncd/").next().expect_err("newline in regex must fail");
        assert_eq!(err.pos, 0);
        assert!(Lexer::new("/a/gg").next().is_err());
    }

    #[test]
    fn template_token_stream() {
        assert_eq!(
            kinds("`a${b}c`"),
            vec![
                TokenKind::Backtick,
                TokenKind::TemplateElement,
                TokenKind::TemplateInterpStart,
                TokenKind::Identifier,
                TokenKind::TemplateInterpEnd,
                TokenKind::TemplateElement,
                TokenKind::Backtick,
            ]
        );
    }

    #[test]
    fn template_two_level_nesting() {
        assert_eq!(
            kinds("`a${`b${c}`}d`"),
            vec![
                TokenKind::Backtick,
                TokenKind::TemplateElement,
                TokenKind::TemplateInterpStart,
                TokenKind::Backtick,
                TokenKind::TemplateElement,
                TokenKind::TemplateInterpStart,
                TokenKind::Identifier,
                TokenKind::TemplateInterpEnd,
                TokenKind::TemplateElement,
                TokenKind::Backtick,
                TokenKind::TemplateInterpEnd,
                TokenKind::TemplateElement,
                TokenKind::Backtick,
            ]
        );
    }

    #[test]
    fn template_interpolation_with_object_literal() {
        // The `}` of the object literal must not close the interpolation.
        assert_eq!(
            kinds("`${ {a: 1} }`"),
            vec![
                TokenKind::Backtick,
                TokenKind::TemplateElement,
                TokenKind::TemplateInterpStart,
                TokenKind::LBrace,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::IntLiteral,
                TokenKind::RBrace,
                TokenKind::TemplateInterpEnd,
                TokenKind::TemplateElement,
                TokenKind::Backtick,
            ]
        );
    }

    #[test]
    fn checkpoint_restores_template_state() {
        let mut lexer = Lexer::new("`x${y}z`");
        assert_eq!(lexer.next().unwrap().kind, TokenKind::Backtick);
        let checkpoint = lexer.checkpoint();
        assert_eq!(lexer.next().unwrap().kind, TokenKind::TemplateElement);
        assert_eq!(lexer.next().unwrap().kind, TokenKind::TemplateInterpStart);
        lexer.rewind(checkpoint);
        // After rewind the element and interpolation come back unchanged.
        assert_eq!(lexer.next().unwrap().kind, TokenKind::TemplateElement);
        assert_eq!(lexer.next().unwrap().kind, TokenKind::TemplateInterpStart);
        assert_eq!(lexer.next().unwrap().kind, TokenKind::Identifier);
        assert_eq!(lexer.next().unwrap().kind, TokenKind::TemplateInterpEnd);
    }

    #[test]
    fn peek_and_peek_n() {
        let mut lexer = Lexer::new("a + b");
        assert_eq!(lexer.peek().unwrap().kind, TokenKind::Identifier);
        assert_eq!(lexer.peek_n(2).unwrap().kind, TokenKind::Plus);
        assert_eq!(lexer.peek_n(3).unwrap().kind, TokenKind::Identifier);
        // Peeks consumed nothing.
        assert!(lexer.next().unwrap().is_ident("a"));
    }

    #[test]
    fn line_table() {
        let source = "ab\ncdé\nf";
        let table = LineTable::new(source);
        assert_eq!(table.line_col(source, 0), (1, 1));
        assert_eq!(table.line_col(source, 1), (1, 2));
        assert_eq!(table.line_col(source, 3), (2, 1));
        // é is 2 bytes; the column after it counts characters.
        assert_eq!(table.line_col(source, 7), (2, 4));
        assert_eq!(table.line_col(source, 8), (3, 1));
    }

    impl Lexer<'_> {
        /// Test helper: returns the error produced by the n-th `next` call.
        fn nth_error(&mut self, n: usize) -> SyntaxError {
            for _ in 0..n - 1 {
                self.next().expect("tokens before the error must lex");
            }
            self.next().expect_err("expected a lex error")
        }
    }
}
