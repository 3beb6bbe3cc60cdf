//! String interning for identifiers, property names, and string constants.
//!
//! Interned strings are stored once and referenced by [`StringId`], giving
//! O(1) equality for property lookup and constant-pool dedup. Ids are laid
//! out as follows:
//! * 0 to 127 — single-character strings for all ASCII characters
//! * 1000 to 1000+count(StaticStrings) — engine-known names
//! * 10_000+ — strings interned per context

use std::{str::FromStr, sync::LazyLock};

use ahash::AHashMap;
use strum::{EnumString, FromRepr, IntoStaticStr};

/// Index into the string interner's storage.
///
/// Uses `u32` to save space; bytecode operands carry the low 16 or full 32
/// bits depending on the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StringId(u32);

impl StringId {
    /// Reconstructs a StringId from a bytecode operand.
    #[inline]
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw id for encoding into bytecode.
    #[inline]
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Returns the StringId for a single ASCII character.
    #[must_use]
    pub fn from_ascii(byte: u8) -> Self {
        debug_assert!(byte < 128);
        Self(u32::from(byte))
    }
}

/// Unique identity for a `Symbol` value. Symbols compare by id; the optional
/// description is interned separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// StringId offsets
const STATIC_STRING_ID_OFFSET: u32 = 1000;
const DYNAMIC_STRING_ID_OFFSET: u32 = 10_000;

/// Static strings for all 128 ASCII characters, built once on first access.
static ASCII_STRS: LazyLock<[&'static str; 128]> = LazyLock::new(|| {
    std::array::from_fn(|i| {
        let s = char::from(u8::try_from(i).expect("index out of u8 range")).to_string();
        // Leak to get 'static lifetime - intentional and bounded (128 bytes total)
        &*Box::leak(s.into_boxed_str())
    })
});

/// Names the engine itself reads or writes, pre-interned so the VM never
/// allocates to look them up.
#[repr(u16)]
#[derive(Debug, Clone, Copy, FromRepr, EnumString, IntoStaticStr, PartialEq, Eq, Hash)]
#[strum(serialize_all = "camelCase")]
pub enum StaticStrings {
    #[strum(serialize = "")]
    EmptyString,
    #[strum(serialize = "<module>")]
    Module,
    #[strum(serialize = "<anonymous>")]
    Anonymous,

    // Object protocol
    Prototype,
    Constructor,
    #[strum(serialize = "__proto__")]
    DunderProto,
    ToString,
    ValueOf,
    HasOwnProperty,
    Keys,

    // Common slots the engine materialises
    Length,
    Name,
    Message,
    Stack,
    Value,
    Done,
    Default,

    // Array methods
    Push,
    Pop,
    Shift,
    Unshift,
    IndexOf,
    Join,
    Slice,
    Concat,
    Map,
    Filter,
    ForEach,
    Includes,

    // String methods
    CharAt,
    CharCodeAt,
    Split,
    Substring,
    ToUpperCase,
    ToLowerCase,
    Trim,
    StartsWith,
    EndsWith,
    Repeat,
    PadStart,
    PadEnd,

    // Generator protocol
    Next,
    Return,
    Throw,

    // Promise protocol
    Then,
    Catch,
    Finally,
    Resolve,
    Reject,
    All,

    // Error classes
    #[strum(serialize = "Error")]
    Error,
    #[strum(serialize = "TypeError")]
    TypeError,
    #[strum(serialize = "RangeError")]
    RangeError,
    #[strum(serialize = "ReferenceError")]
    ReferenceError,
    #[strum(serialize = "SyntaxError")]
    SyntaxError,

    // Global objects the runtime seeds
    #[strum(serialize = "Object")]
    Object,
    #[strum(serialize = "Array")]
    Array,
    #[strum(serialize = "Function")]
    Function,
    #[strum(serialize = "Promise")]
    Promise,
    #[strum(serialize = "Symbol")]
    Symbol,
    #[strum(serialize = "Math")]
    Math,
    #[strum(serialize = "JSON")]
    Json,
    Console,
    Log,
    GlobalThis,
    #[strum(serialize = "NaN")]
    NaN,
    #[strum(serialize = "Infinity")]
    Infinity,
    IsNaN,
    IsFinite,
    ParseInt,
    ParseFloat,

    // Math members
    Floor,
    Ceil,
    Round,
    Abs,
    Sqrt,
    Min,
    Max,
    Pow,
    Random,
    #[strum(serialize = "PI")]
    Pi,
    #[strum(serialize = "E")]
    Euler,

    // Object statics
    Assign,
    Freeze,
    Entries,
    Values,
    GetPrototypeOf,
    SetPrototypeOf,
    Create,
    DefineProperty,

    // Array statics
    IsArray,
    From,
    Of,
}

impl From<StaticStrings> for StringId {
    fn from(s: StaticStrings) -> Self {
        Self(STATIC_STRING_ID_OFFSET + s as u32)
    }
}

/// Per-context string interner.
///
/// ASCII single characters and [`StaticStrings`] resolve without touching
/// the dynamic table; everything else is deduplicated through an ahash map.
#[derive(Debug, Default)]
pub(crate) struct Interns {
    /// Dynamically interned strings, indexed from `DYNAMIC_STRING_ID_OFFSET`.
    strings: Vec<Box<str>>,
    /// Dedup map over `strings`.
    map: AHashMap<Box<str>, StringId>,
}

impl Interns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning an existing id when possible.
    pub fn intern(&mut self, s: &str) -> StringId {
        if s.len() == 1 && s.as_bytes()[0] < 128 {
            return StringId::from_ascii(s.as_bytes()[0]);
        }
        if s.is_empty() {
            return StaticStrings::EmptyString.into();
        }
        if let Ok(known) = StaticStrings::from_str(s) {
            return known.into();
        }
        if let Some(&id) = self.map.get(s) {
            return id;
        }
        let id = StringId(
            DYNAMIC_STRING_ID_OFFSET
                + u32::try_from(self.strings.len()).expect("intern table exceeds u32 range"),
        );
        let boxed: Box<str> = s.into();
        self.strings.push(boxed.clone());
        self.map.insert(boxed, id);
        id
    }

    /// Resolves an id back to its string.
    pub fn get(&self, id: StringId) -> &str {
        let raw = id.0;
        if raw < 128 {
            return ASCII_STRS[raw as usize];
        }
        if raw >= DYNAMIC_STRING_ID_OFFSET {
            return &self.strings[(raw - DYNAMIC_STRING_ID_OFFSET) as usize];
        }
        StaticStrings::from_repr(u16::try_from(raw - STATIC_STRING_ID_OFFSET).expect("static id in u16 range"))
            .expect("invalid static string id")
            .into()
    }

    /// Number of dynamically interned strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn ascii_and_static_ids_are_stable() {
        let mut interns = Interns::new();
        assert_eq!(interns.intern("a"), StringId::from_ascii(b'a'));
        assert_eq!(interns.intern("prototype"), StaticStrings::Prototype.into());
        assert_eq!(interns.intern(""), StaticStrings::EmptyString.into());
        assert_eq!(interns.get(StaticStrings::Module.into()), "<module>");
        assert_eq!(interns.get(StaticStrings::NaN.into()), "NaN");
    }

    #[test]
    fn dynamic_interning_dedups() {
        let mut interns = Interns::new();
        let id1 = interns.intern("someLongPropertyName");
        let id2 = interns.intern("someLongPropertyName");
        assert_eq!(id1, id2);
        assert_eq!(interns.get(id1), "someLongPropertyName");
        assert_eq!(interns.len(), 1);
    }

    #[test]
    fn static_strings_round_trip() {
        let mut interns = Interns::new();
        for s in ["toString", "length", "then", "next", "done", "JSON", "hasOwnProperty"] {
            let id = interns.intern(s);
            assert_eq!(interns.get(id), s);
        }
        // Nothing above hit the dynamic table.
        assert_eq!(interns.len(), 0);
    }
}
