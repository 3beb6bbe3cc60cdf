//! Token definitions for the lexer.
//!
//! Tokens are cheap value types: a kind, a source byte position, and an
//! optional payload (identifier text, literal value, regex flags). The parser
//! consumes them by value; the lexer can snapshot and replay them via
//! checkpoints.

use num_bigint::BigInt;
use strum::IntoStaticStr;

/// Lexical token kinds: keywords, operators, literals, and separators.
///
/// Contextual keywords (`of`, `from`, `as`, `get`, `set`, `static`, `async`)
/// are lexed as [`TokenKind::Identifier`]; the parser inspects the lexeme
/// where grammar positions give them meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum TokenKind {
    /// End of input. Also the "no previous token" state used by the
    /// regex-vs-divide rule.
    Eof,

    // Literals and names
    Identifier,
    IntLiteral,
    FloatLiteral,
    BigIntLiteral,
    StringLiteral,
    RegexLiteral,
    /// A raw text chunk inside a template literal.
    TemplateElement,

    // Keywords
    Let,
    Const,
    Var,
    Function,
    Return,
    If,
    Else,
    While,
    Do,
    For,
    Break,
    Continue,
    Switch,
    Case,
    Default,
    Try,
    Catch,
    Finally,
    Throw,
    New,
    Delete,
    Typeof,
    Instanceof,
    In,
    Void,
    This,
    Super,
    Class,
    Extends,
    Import,
    Export,
    Yield,
    Await,
    Null,
    True,
    False,
    Undefined,

    // Separators
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBrack,
    RBrack,
    Semicolon,
    Comma,
    Dot,
    Ellipsis,
    Colon,
    Question,
    QuestionDot,
    Arrow,
    /// Opens and closes a template literal.
    Backtick,
    /// `${` inside a template literal.
    TemplateInterpStart,
    /// The `}` closing a template interpolation.
    TemplateInterpEnd,

    // Operators
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    PlusPlus,
    MinusMinus,
    Eq,
    Ne,
    EqStrict,
    NeStrict,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    QuestionQuestion,
    Not,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Shl,
    Shr,
    UShr,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    StarStarAssign,
    ShlAssign,
    ShrAssign,
    UShrAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
}

impl TokenKind {
    /// Returns true if this token can end an expression.
    ///
    /// Drives the regex-vs-divide rule: a `/` after one of these tokens is
    /// division, otherwise it begins a regex literal.
    #[must_use]
    pub fn can_end_expression(self) -> bool {
        matches!(
            self,
            Self::Identifier
                | Self::IntLiteral
                | Self::FloatLiteral
                | Self::BigIntLiteral
                | Self::StringLiteral
                | Self::RegexLiteral
                | Self::TemplateElement
                | Self::RParen
                | Self::RBrack
                | Self::Backtick
                | Self::This
                | Self::Super
                | Self::Null
                | Self::True
                | Self::False
                | Self::Undefined
                | Self::PlusPlus
                | Self::MinusMinus
        )
    }

    /// Returns true for any compound assignment operator (`+=` .. `^=`).
    #[must_use]
    pub fn is_compound_assign(self) -> bool {
        matches!(
            self,
            Self::PlusAssign
                | Self::MinusAssign
                | Self::StarAssign
                | Self::SlashAssign
                | Self::PercentAssign
                | Self::StarStarAssign
                | Self::ShlAssign
                | Self::ShrAssign
                | Self::UShrAssign
                | Self::BitAndAssign
                | Self::BitOrAssign
                | Self::BitXorAssign
        )
    }
}

/// Maps a scanned identifier to its keyword kind, if it is one.
#[must_use]
pub fn keyword_kind(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "let" => TokenKind::Let,
        "const" => TokenKind::Const,
        "var" => TokenKind::Var,
        "function" => TokenKind::Function,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "do" => TokenKind::Do,
        "for" => TokenKind::For,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "try" => TokenKind::Try,
        "catch" => TokenKind::Catch,
        "finally" => TokenKind::Finally,
        "throw" => TokenKind::Throw,
        "new" => TokenKind::New,
        "delete" => TokenKind::Delete,
        "typeof" => TokenKind::Typeof,
        "instanceof" => TokenKind::Instanceof,
        "in" => TokenKind::In,
        "void" => TokenKind::Void,
        "this" => TokenKind::This,
        "super" => TokenKind::Super,
        "class" => TokenKind::Class,
        "extends" => TokenKind::Extends,
        "import" => TokenKind::Import,
        "export" => TokenKind::Export,
        "yield" => TokenKind::Yield,
        "await" => TokenKind::Await,
        "null" => TokenKind::Null,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "undefined" => TokenKind::Undefined,
        _ => return None,
    };
    Some(kind)
}

/// Regex literal flags collected after the closing `/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegexFlags {
    pub global: bool,
    pub ignore_case: bool,
    pub multiline: bool,
    pub dot_all: bool,
    pub unicode: bool,
    pub sticky: bool,
    pub has_indices: bool,
}

impl RegexFlags {
    /// Sets the flag for `c`, returning false if `c` is not a valid flag or
    /// was already set.
    pub fn set(&mut self, c: char) -> bool {
        let slot = match c {
            'g' => &mut self.global,
            'i' => &mut self.ignore_case,
            'm' => &mut self.multiline,
            's' => &mut self.dot_all,
            'u' => &mut self.unicode,
            'y' => &mut self.sticky,
            'd' => &mut self.has_indices,
            _ => return false,
        };
        if *slot {
            return false;
        }
        *slot = true;
        true
    }
}

/// Payload attached to a token, when its kind carries one.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TokenValue {
    #[default]
    None,
    /// Identifier text, string literal contents, or template chunk.
    Str(String),
    Int(i64),
    Float(f64),
    BigInt(BigInt),
    Regex { pattern: String, flags: RegexFlags },
}

impl TokenValue {
    /// Returns the string payload, panicking on kind mismatch.
    ///
    /// Only called by the parser on token kinds that always carry a string.
    #[must_use]
    pub fn expect_str(&self) -> &str {
        match self {
            Self::Str(s) => s,
            other => panic!("token value is not a string: {other:?}"),
        }
    }
}

/// A single lexical token with its source byte span.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first character in the source.
    pub pos: u32,
    /// Byte offset one past the token's last character.
    pub end: u32,
    pub value: TokenValue,
}

impl Default for TokenKind {
    fn default() -> Self {
        Self::Eof
    }
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, pos: u32) -> Self {
        Self {
            kind,
            pos,
            end: pos,
            value: TokenValue::None,
        }
    }

    #[must_use]
    pub fn with_value(kind: TokenKind, pos: u32, value: TokenValue) -> Self {
        Self {
            kind,
            pos,
            end: pos,
            value,
        }
    }

    #[must_use]
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Returns true if this is an identifier with exactly the given text.
    ///
    /// Used for contextual keywords (`of`, `from`, `as`, `get`, `set`,
    /// `static`, `async`).
    #[must_use]
    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Identifier
            && matches!(&self.value, TokenValue::Str(s) if s == text)
    }
}
