//! Builder for emitting bytecode during compilation.
//!
//! `CodeBuilder` encodes opcodes and operands into raw bytes, manages
//! forward jumps that need patching, records debug-table entries, and
//! tracks operand-stack depth so the code generator can assert balance at
//! control-flow joins.

use crate::{
    ast::Span,
    bytecode::{
        code::{DebugEntry, ExceptionEntry},
        op::Opcode,
    },
};

/// Label for a forward jump that needs patching.
///
/// Stores the bytecode offset of the jump's opcode byte. Pass it to
/// [`CodeBuilder::patch_jump`] once the target is known.
#[derive(Debug, Clone, Copy)]
pub struct JumpLabel(usize);

impl JumpLabel {
    /// Offset of the jump's opcode byte. Used by the code generator to
    /// defer break/continue repairs through the jump manager.
    #[must_use]
    pub fn pc(self) -> u32 {
        u32::try_from(self.0).expect("bytecode offset exceeds u32")
    }

    /// Rebuilds a label from a recorded pc (jump-manager repair entries).
    #[must_use]
    pub fn from_pc(pc: u32) -> Self {
        Self(pc as usize)
    }
}

/// Byte emission for one function under compilation.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    bytecode: Vec<u8>,
    /// Debug entries in emission order (pc ascending).
    debug_table: Vec<DebugEntry>,
    exception_table: Vec<ExceptionEntry>,
    /// Source span attributed to subsequently emitted instructions.
    current_span: Option<Span>,
    current_stack_depth: u16,
    max_stack_depth: u16,
}

impl CodeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source span recorded for the next emitted instructions.
    pub fn set_span(&mut self, span: Span) {
        if self.current_span != Some(span) {
            self.current_span = Some(span);
        }
    }

    /// Emits a no-operand instruction.
    pub fn emit(&mut self, op: Opcode) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    /// Emits an instruction with a u8 operand.
    pub fn emit_u8(&mut self, op: Opcode, operand: u8) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        self.bytecode.push(operand);
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    /// Emits an instruction with a u16 operand (little-endian).
    pub fn emit_u16(&mut self, op: Opcode, operand: u16) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
        self.track_variable_effect(op, i16::try_from(operand).unwrap_or(i16::MAX));
    }

    /// Emits an instruction with a u32 operand (little-endian).
    pub fn emit_u32(&mut self, op: Opcode, operand: u32) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    /// Emits an instruction with a u32 operand followed by a u8 operand
    /// (`DefineMethod`: name id + flags).
    pub fn emit_u32_u8(&mut self, op: Opcode, operand1: u32, operand2: u8) {
        self.start_instruction();
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&operand1.to_le_bytes());
        self.bytecode.push(operand2);
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    /// Emits a constant load, choosing the shortest encoding for the index.
    pub fn emit_const_load(&mut self, index: u32) {
        match index {
            0 => self.emit(Opcode::CLoad0),
            1 => self.emit(Opcode::CLoad1),
            2 => self.emit(Opcode::CLoad2),
            3 => self.emit(Opcode::CLoad3),
            4 => self.emit(Opcode::CLoad4),
            5 => self.emit(Opcode::CLoad5),
            _ => {
                if let Ok(short) = u16::try_from(index) {
                    self.emit_u16(Opcode::CLoad, short);
                } else {
                    self.emit_u32(Opcode::CLoadW, index);
                }
            }
        }
    }

    /// Emits a forward jump, returning a label to patch later.
    ///
    /// The i16 offset placeholder is zero until [`Self::patch_jump`] runs.
    #[must_use]
    pub fn emit_jump(&mut self, op: Opcode) -> JumpLabel {
        self.start_instruction();
        let label = JumpLabel(self.bytecode.len());
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&0i16.to_le_bytes());
        match op {
            Opcode::JumpIfTrueOrPop | Opcode::JumpIfFalseOrPop | Opcode::JumpNotNullishOrPop => {
                // Fallthrough pops the operand.
                self.adjust_stack(-1);
            }
            _ => {
                if let Some(effect) = op.stack_effect() {
                    self.adjust_stack(effect);
                }
            }
        }
        label
    }

    /// Patches a forward jump to land at the current offset.
    ///
    /// # Panics
    ///
    /// Panics when the delta exceeds the signed 16-bit range; functions that
    /// large are a compile error, not a silent truncation.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let target = self.bytecode.len();
        self.patch_jump_to(label, target);
    }

    /// Patches a forward jump to land at an explicit target offset.
    pub fn patch_jump_to(&mut self, label: JumpLabel, target: usize) {
        let target_i64 = i64::try_from(target).expect("bytecode target exceeds i64");
        let label_i64 = i64::try_from(label.0).expect("bytecode label exceeds i64");
        // Offset is relative to the byte after the opcode + i16 operand.
        let raw_offset = target_i64 - label_i64 - 3;
        let offset = i16::try_from(raw_offset).expect("jump offset exceeds i16 range; function too large");
        let bytes = offset.to_le_bytes();
        self.bytecode[label.0 + 1] = bytes[0];
        self.bytecode[label.0 + 2] = bytes[1];
    }

    /// Emits a backward jump to a known target offset.
    pub fn emit_jump_to(&mut self, op: Opcode, target: usize) {
        self.start_instruction();
        let current = self.bytecode.len();
        let target_i64 = i64::try_from(target).expect("bytecode target exceeds i64");
        let current_i64 = i64::try_from(current).expect("bytecode offset exceeds i64");
        let raw_offset = target_i64 - (current_i64 + 3);
        let offset = i16::try_from(raw_offset).expect("jump offset exceeds i16 range; function too large");
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&offset.to_le_bytes());
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(effect);
        }
    }

    /// Current bytecode offset; used to record loop tops and try spans.
    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.bytecode.len()
    }

    /// Current bytecode offset as a pc value.
    #[must_use]
    pub fn current_pc(&self) -> u32 {
        u32::try_from(self.bytecode.len()).expect("bytecode length exceeds u32")
    }

    /// Appends an exception-table entry. Outer try blocks are appended
    /// before inner ones finish, so the innermost covering entry is last.
    pub fn add_exception_entry(&mut self, entry: ExceptionEntry) {
        self.exception_table.push(entry);
    }

    #[must_use]
    pub fn stack_depth(&self) -> u16 {
        self.current_stack_depth
    }

    /// Sets the depth to an absolute value at branch joins (the two arms of
    /// a conditional reconverge with the same depth).
    pub fn set_stack_depth(&mut self, depth: u16) {
        self.current_stack_depth = depth;
        self.max_stack_depth = self.max_stack_depth.max(depth);
    }

    /// Manually adjusts the tracked depth for effects the opcode table
    /// cannot know (e.g. the catch handler entering with one pushed value).
    pub fn adjust_stack_depth(&mut self, delta: i16) {
        self.adjust_stack(delta);
    }

    /// Consumes the builder, returning its tables.
    #[must_use]
    pub fn finish(self) -> BuiltCode {
        BuiltCode {
            bytecode: self.bytecode,
            debug_table: self.debug_table,
            exception_table: self.exception_table,
            max_stack: self.max_stack_depth,
        }
    }

    fn start_instruction(&mut self) {
        if let Some(span) = self.current_span {
            let pc = self.current_pc();
            // Collapse runs of instructions sharing a span into one entry.
            if self.debug_table.last().is_none_or(|entry| entry.span != span) {
                self.debug_table.push(DebugEntry { pc, span });
            }
        }
    }

    fn adjust_stack(&mut self, delta: i16) {
        let new_depth = i32::from(self.current_stack_depth) + i32::from(delta);
        debug_assert!(new_depth >= 0, "stack depth went negative: {new_depth}");
        self.current_stack_depth = u16::try_from(new_depth.max(0)).unwrap_or(u16::MAX);
        self.max_stack_depth = self.max_stack_depth.max(self.current_stack_depth);
    }

    /// Computes operand-dependent stack effects for u16-operand opcodes.
    fn track_variable_effect(&mut self, op: Opcode, operand: i16) {
        let effect: i16 = match op {
            // Pop n elements, push the array.
            Opcode::ArrayNew => 1 - operand,
            // Pop 2n key/value operands, push the object.
            Opcode::ObjectNew => 1 - 2 * operand,
            _ => op.stack_effect().unwrap_or(0),
        };
        self.adjust_stack(effect);
    }
}

/// The raw artefacts of one compiled function body.
#[derive(Debug)]
pub struct BuiltCode {
    pub bytecode: Vec<u8>,
    pub debug_table: Vec<DebugEntry>,
    pub exception_table: Vec<ExceptionEntry>,
    pub max_stack: u16,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn emit_basic() {
        let mut builder = CodeBuilder::new();
        builder.emit(Opcode::Undefined);
        builder.emit(Opcode::Pop);
        let code = builder.finish();
        assert_eq!(code.bytecode, vec![Opcode::Undefined as u8, Opcode::Pop as u8]);
    }

    #[test]
    fn emit_u16_little_endian() {
        let mut builder = CodeBuilder::new();
        builder.emit_u16(Opcode::CLoad, 0x1234);
        let code = builder.finish();
        assert_eq!(code.bytecode, vec![Opcode::CLoad as u8, 0x34, 0x12]);
    }

    #[test]
    fn const_load_specialisation() {
        let mut builder = CodeBuilder::new();
        builder.emit_const_load(0);
        builder.emit_const_load(5);
        builder.emit_const_load(6);
        builder.emit_const_load(70_000);
        let code = builder.finish();
        assert_eq!(
            code.bytecode,
            vec![
                Opcode::CLoad0 as u8,
                Opcode::CLoad5 as u8,
                Opcode::CLoad as u8,
                6,
                0,
                Opcode::CLoadW as u8,
                0x70,
                0x11,
                0x01,
                0x00,
            ]
        );
    }

    #[test]
    fn forward_jump_patch() {
        let mut builder = CodeBuilder::new();
        let jump = builder.emit_jump(Opcode::Goto);
        builder.emit(Opcode::Undefined);
        builder.emit(Opcode::Pop);
        builder.patch_jump(jump);
        builder.emit(Opcode::Undefined);
        builder.emit(Opcode::Return);
        let code = builder.finish();
        // Jump at 0, target at 5: offset = 5 - 0 - 3 = 2.
        assert_eq!(
            code.bytecode,
            vec![
                Opcode::Goto as u8,
                2,
                0,
                Opcode::Undefined as u8,
                Opcode::Pop as u8,
                Opcode::Undefined as u8,
                Opcode::Return as u8,
            ]
        );
    }

    #[test]
    fn backward_jump() {
        let mut builder = CodeBuilder::new();
        let top = builder.current_offset();
        builder.emit(Opcode::Undefined);
        builder.emit(Opcode::Pop);
        builder.emit_jump_to(Opcode::Goto, top);
        let code = builder.finish();
        let expected = (-5i16).to_le_bytes();
        assert_eq!(
            code.bytecode,
            vec![
                Opcode::Undefined as u8,
                Opcode::Pop as u8,
                Opcode::Goto as u8,
                expected[0],
                expected[1],
            ]
        );
    }

    #[test]
    fn stack_depth_tracking() {
        let mut builder = CodeBuilder::new();
        builder.emit(Opcode::Undefined);
        builder.emit(Opcode::Undefined);
        assert_eq!(builder.stack_depth(), 2);
        builder.emit(Opcode::Add);
        assert_eq!(builder.stack_depth(), 1);
        builder.emit_u16(Opcode::ArrayNew, 1);
        assert_eq!(builder.stack_depth(), 1);
        builder.emit(Opcode::Pop);
        assert_eq!(builder.stack_depth(), 0);
        let code = builder.finish();
        assert_eq!(code.max_stack, 2);
    }

    #[test]
    fn debug_entries_collapse_shared_spans() {
        let mut builder = CodeBuilder::new();
        builder.set_span(Span::new(0, 4));
        builder.emit(Opcode::Undefined);
        builder.emit(Opcode::Pop);
        builder.set_span(Span::new(5, 9));
        builder.emit(Opcode::Undefined);
        let code = builder.finish();
        assert_eq!(code.debug_table.len(), 2);
        assert_eq!(code.debug_table[0].pc, 0);
        assert_eq!(code.debug_table[1].pc, 2);
    }
}
