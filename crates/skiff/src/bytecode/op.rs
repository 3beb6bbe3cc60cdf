//! Opcode definitions for the bytecode VM.
//!
//! Bytecode is variable-length and byte-coded: one opcode byte followed by
//! that opcode's fixed operand bytes (see [`Opcode::operand_width`]). Jump
//! operands are signed 16-bit deltas measured from the byte after the
//! operand.

use strum::FromRepr;

/// All opcodes understood by the VM.
///
/// The discriminant is the encoded byte. `FromRepr` gives the VM its decode
/// step; an unknown byte decodes to `None` and surfaces as an internal error.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub enum Opcode {
    Nop = 0,

    // --- constants ---
    /// Push constant-pool entry 0..5 (short forms).
    CLoad0,
    CLoad1,
    CLoad2,
    CLoad3,
    CLoad4,
    CLoad5,
    /// Push constant; u16 pool index.
    CLoad,
    /// Push constant; u32 pool index (wide form).
    CLoadW,
    /// Push a constant function (no captures); u32 pool index of the
    /// FunctionDef constant.
    CLoadD,
    /// Like `CLoadD`, but materialises a closure environment from the
    /// current frame; u32 pool index.
    Closure,
    /// Push `undefined`.
    Undefined,

    // --- locals ---
    /// Push local slot; u16 slot index. Slots holding a capture cell load
    /// through the cell.
    VarLoad,
    /// Pop into local slot; u16 slot index. Stores through capture cells.
    VarStore,

    // --- globals ---
    /// Push a global by interned name; u32 string id.
    GetGlobal,
    /// Like `GetGlobal`, but pushes undefined for a missing name
    /// (`typeof x` on undeclared identifiers); u32 string id.
    GetGlobalSoft,
    /// Pop into a global by interned name; u32 string id.
    SetGlobal,

    // --- properties ---
    /// `[obj] -> [obj.name]`; u32 string id.
    PropertyLoad,
    /// `[obj, value] -> []`; u32 string id.
    PropertyStore,
    /// `[obj, key] -> [obj[key]]`.
    IndexedLoad,
    /// `[obj, key, value] -> []`.
    IndexedStore,
    /// Import binding read: `[module] -> [export-or-hole]`; u32 string id.
    /// Unlike `PropertyLoad`, an uninitialised export binds as a hole (the
    /// TDZ error fires at use, not at bind) — cyclic imports depend on it.
    BindImport,
    /// `[obj] -> [bool]`; u32 string id.
    DeleteProperty,
    /// `[obj, key] -> [bool]`.
    DeleteIndexed,

    // --- arithmetic ---
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Neg,
    /// Unary `+`: coerce to number.
    ToNumber,
    Inc,
    Dec,

    // --- comparison ---
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    /// `key in obj`.
    InOp,
    InstanceOf,

    // --- bitwise / shift ---
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Shl,
    Shr,
    UShr,

    // --- logic / stack ---
    Not,
    Pop,
    Dup,
    /// Duplicate the top two operands.
    Dup2,
    Swap,
    ToString,
    TypeOf,

    // --- control flow; i16 pc delta ---
    Goto,
    /// Pop; jump when falsy.
    IfEq,
    /// Pop; jump when truthy.
    IfTrue,
    /// Jump keeping the operand when truthy, else pop (for `||`).
    JumpIfTrueOrPop,
    /// Jump keeping the operand when falsy, else pop (for `&&`).
    JumpIfFalseOrPop,
    /// Jump keeping the operand when it is not null/undefined, else pop
    /// (for `??`).
    JumpNotNullishOrPop,
    /// If the operand is null/undefined: replace it with undefined and jump
    /// (one `?.` step).
    OptionalJump,

    // --- literals ---
    /// Pop n elements into a new array; u16 count.
    ArrayNew,
    /// `[arr, v] -> [arr]`: append.
    ArrayPush,
    /// `[arr, iterable] -> [arr]`: append all elements.
    ArraySpread,
    /// Pop n (key, value) pairs into a new object; u16 pair count.
    ObjectNew,
    /// `[obj, key, fn] -> [obj]`: define a getter (flag 0) or setter
    /// (flag 1); u8 flag.
    DefineAccessor,

    // --- iteration ---
    /// `[value] -> [iterator]`.
    GetIterator,
    /// `[it] -> [value, done]`.
    IteratorNext,
    /// `[obj] -> [array of own enumerable keys]` (for-in snapshot).
    EnumKeys,

    // --- calls; stack layout: args..., argc, callee, this ---
    FunctionCall,
    /// `args-array, argc-ignored?` — spread call: `[argsArray, callee, this]`.
    CallSpread,
    /// `args..., argc, callee` — construct.
    New,
    /// `[argsArray, callee]` — construct with spread arguments.
    NewSpread,
    Return,

    // --- classes ---
    /// `[superclass-or-undefined, ctor-fn] -> [constructor]`; u32 string id
    /// of the class name.
    MakeClass,
    /// `[class, fn] -> [class]`; u32 string id + u8 flags
    /// (bit0 static, bit1 getter, bit2 setter).
    DefineMethod,
    /// `[class, key, fn] -> [class]`; u8 flags as `DefineMethod`.
    DefineMethodComputed,

    // --- exceptions ---
    /// No-op marker: start of a try region (exception table holds the pcs).
    TryBegin,
    /// No-op marker: end of a protected region.
    TryEnd,
    Throw,
    /// Like `Goto`, but runs intervening finally blocks first; i16 delta.
    FinallyGoto,
    /// Return through enclosing finally blocks.
    FinallyReturn,

    // --- coroutines ---
    Yield,
    Await,

    // --- modules ---
    /// `[specifier] -> [module]`; synchronous, module fully evaluated.
    GetModule,
    /// `[specifier] -> [promise of module]`.
    GetModuleAsync,

    // --- meta ---
    GetThis,
    /// `this` captured lexically by an arrow function.
    GetOuterThis,
    /// The superclass constructor of the current method's home class.
    GetSuper,
}

impl Opcode {
    /// Number of operand bytes following the opcode byte.
    #[must_use]
    pub fn operand_width(self) -> usize {
        match self {
            Self::CLoad | Self::VarLoad | Self::VarStore | Self::ArrayNew | Self::ObjectNew => 2,
            Self::CLoadW
            | Self::CLoadD
            | Self::Closure
            | Self::GetGlobal
            | Self::GetGlobalSoft
            | Self::SetGlobal
            | Self::PropertyLoad
            | Self::PropertyStore
            | Self::BindImport
            | Self::DeleteProperty
            | Self::MakeClass => 4,
            Self::DefineMethod => 5,
            Self::DefineAccessor | Self::DefineMethodComputed => 1,
            Self::Goto
            | Self::IfEq
            | Self::IfTrue
            | Self::JumpIfTrueOrPop
            | Self::JumpIfFalseOrPop
            | Self::JumpNotNullishOrPop
            | Self::OptionalJump
            | Self::FinallyGoto => 2,
            _ => 0,
        }
    }

    /// Fixed stack effect, when one exists.
    ///
    /// Opcodes whose effect depends on an operand (calls, literal
    /// constructors) return `None`; the builder computes those at emit time.
    #[must_use]
    pub fn stack_effect(self) -> Option<i16> {
        let effect = match self {
            Self::Nop | Self::TryBegin | Self::TryEnd => 0,
            Self::CLoad0
            | Self::CLoad1
            | Self::CLoad2
            | Self::CLoad3
            | Self::CLoad4
            | Self::CLoad5
            | Self::CLoad
            | Self::CLoadW
            | Self::CLoadD
            | Self::Closure
            | Self::Undefined
            | Self::VarLoad
            | Self::GetGlobal
            | Self::GetGlobalSoft
            | Self::GetThis
            | Self::GetOuterThis
            | Self::GetSuper => 1,
            Self::VarStore | Self::SetGlobal | Self::Pop | Self::IfEq | Self::IfTrue => -1,
            Self::PropertyLoad
            | Self::BindImport
            | Self::DeleteProperty
            | Self::Neg
            | Self::ToNumber
            | Self::Inc
            | Self::Dec
            | Self::BitNot
            | Self::Not
            | Self::ToString
            | Self::TypeOf
            | Self::GetIterator
            | Self::EnumKeys
            | Self::GetModule
            | Self::GetModuleAsync
            | Self::Yield
            | Self::Await => 0,
            Self::PropertyStore => -2,
            Self::IndexedLoad
            | Self::DeleteIndexed
            | Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Rem
            | Self::Exp
            | Self::Eq
            | Self::Ne
            | Self::StrictEq
            | Self::StrictNe
            | Self::Lt
            | Self::Le
            | Self::Gt
            | Self::Ge
            | Self::InOp
            | Self::InstanceOf
            | Self::BitAnd
            | Self::BitOr
            | Self::BitXor
            | Self::Shl
            | Self::Shr
            | Self::UShr
            | Self::ArrayPush
            | Self::ArraySpread => -1,
            Self::IndexedStore => -3,
            Self::Dup => 1,
            Self::Dup2 => 2,
            Self::Swap | Self::Goto | Self::FinallyGoto | Self::OptionalJump => 0,
            Self::IteratorNext => 1,
            Self::Return | Self::FinallyReturn | Self::Throw => -1,
            Self::MakeClass => -1,
            Self::DefineMethod => -1,
            Self::DefineMethodComputed | Self::DefineAccessor => -2,
            // Variable effects.
            Self::JumpIfTrueOrPop
            | Self::JumpIfFalseOrPop
            | Self::JumpNotNullishOrPop
            | Self::ArrayNew
            | Self::ObjectNew
            | Self::FunctionCall
            | Self::CallSpread
            | Self::New
            | Self::NewSpread => return None,
        };
        Some(effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips_through_repr() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_repr(byte) {
                assert_eq!(op as u8, byte);
            }
        }
        assert_eq!(Opcode::from_repr(Opcode::Nop as u8), Some(Opcode::Nop));
        assert_eq!(Opcode::from_repr(Opcode::GetSuper as u8), Some(Opcode::GetSuper));
    }

    #[test]
    fn jump_opcodes_have_two_byte_operands() {
        for op in [
            Opcode::Goto,
            Opcode::IfEq,
            Opcode::IfTrue,
            Opcode::JumpIfTrueOrPop,
            Opcode::JumpIfFalseOrPop,
            Opcode::JumpNotNullishOrPop,
            Opcode::OptionalJump,
            Opcode::FinallyGoto,
        ] {
            assert_eq!(op.operand_width(), 2);
        }
    }
}
