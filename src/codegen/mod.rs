//! x86-64 assembly generation in AT&T syntax.
//!
//! The generator walks the typed AST once and emits text into three
//! buffers: `.text` for code, `.data` for initialized globals and
//! statics, and `.rodata` for string literals. [`CodegenContext::finish`]
//! concatenates them in that order.
//!
//! Lowering follows an accumulator discipline. Integer and pointer
//! values live sign-extended in `%rax`, floating values in `%xmm0`.
//! Record and array expressions evaluate to the address of their
//! storage instead of a value. Binary operators evaluate the right
//! operand, park it on the machine stack, evaluate the left operand
//! and pop the right into a scratch register, so no register allocator
//! is needed.

pub mod abi;
pub mod error;

mod data;
mod expr;
mod stmt;

use hashbrown::HashMap;
use log::debug;

use crate::parser::ast::{Function, TranslationUnit};
use crate::symbol_table::{ScopeId, SymbolTable};
use crate::types::{Type, align_to};

use abi::{ParamClass, RetClass};
use error::CodegenError;

/// Lower a translation unit to one assembly listing.
pub fn generate(
    unit: &TranslationUnit,
    table: &SymbolTable,
    annotate: bool,
) -> Result<String, CodegenError> {
    let mut ctx = CodegenContext::new(table, annotate);
    for function in &unit.functions {
        ctx.gen_function(function)?;
    }
    ctx.emit_data_sections();
    Ok(ctx.finish())
}

/// Everything the emitter threads through a translation unit.
///
/// All state is owned here. The label counter and the string literal
/// map make repeated runs over the same input byte-identical.
pub struct CodegenContext<'a> {
    table: &'a SymbolTable,
    text: String,
    data: String,
    rodata: String,
    /// Unit-wide counter behind every synthesized jump label.
    next_label: u32,
    /// Innermost-first jump targets for `break` and `continue`.
    break_labels: Vec<String>,
    continue_labels: Vec<String>,
    /// Label prefix of each enclosing switch, innermost last.
    switch_prefixes: Vec<u32>,
    /// Interned string literals, keyed by content.
    strings: HashMap<String, u32>,
    /// Function being lowered; `return` jumps to its epilogue label.
    current_fn: String,
    /// Return classification of the current function.
    current_ret: RetClass,
    /// Frame slot holding the incoming hidden return pointer, if any.
    sret_save: Option<i32>,
    /// Number of temporary quadwords pushed since the frame was set up.
    /// `%rsp` is 16-byte aligned exactly when this is even.
    depth: u32,
    annotate: bool,
}

impl<'a> CodegenContext<'a> {
    fn new(table: &'a SymbolTable, annotate: bool) -> Self {
        CodegenContext {
            table,
            text: String::new(),
            data: String::new(),
            rodata: String::new(),
            next_label: 0,
            break_labels: Vec::new(),
            continue_labels: Vec::new(),
            switch_prefixes: Vec::new(),
            strings: HashMap::new(),
            current_fn: String::new(),
            current_ret: RetClass::Void,
            sret_save: None,
            depth: 0,
            annotate,
        }
    }

    /// Concatenate the section buffers into the final listing.
    fn finish(self) -> String {
        let mut out = String::with_capacity(
            self.text.len() + self.data.len() + self.rodata.len() + 64,
        );
        out.push_str("    .text\n");
        out.push_str(&self.text);
        if !self.data.is_empty() {
            out.push_str("    .data\n");
            out.push_str(&self.data);
        }
        if !self.rodata.is_empty() {
            out.push_str("    .section .rodata\n");
            out.push_str(&self.rodata);
        }
        out
    }

    fn emit(&mut self, line: impl AsRef<str>) {
        self.text.push_str("    ");
        self.text.push_str(line.as_ref());
        self.text.push('\n');
    }

    fn emit_label(&mut self, label: impl AsRef<str>) {
        self.text.push_str(label.as_ref());
        self.text.push_str(":\n");
    }

    fn comment(&mut self, note: impl AsRef<str>) {
        if self.annotate {
            self.text.push_str("    # ");
            self.text.push_str(note.as_ref());
            self.text.push('\n');
        }
    }

    fn new_label(&mut self) -> u32 {
        self.next_label += 1;
        self.next_label
    }

    fn push(&mut self, reg: &str) {
        self.emit(format!("pushq {reg}"));
        self.depth += 1;
    }

    fn pop(&mut self, reg: &str) {
        self.emit(format!("popq {reg}"));
        self.depth -= 1;
    }

    /// Park `%xmm0` on the machine stack.
    fn push_float(&mut self) {
        self.emit("subq $8, %rsp");
        self.emit("movsd %xmm0, (%rsp)");
        self.depth += 1;
    }

    /// Pop a parked floating value into `reg`.
    fn pop_float(&mut self, reg: &str) {
        self.emit(format!("movsd (%rsp), {reg}"));
        self.emit("addq $8, %rsp");
        self.depth -= 1;
    }

    /// Add the literal to `.rodata` once and return its label index.
    fn intern_string(&mut self, value: &str) -> u32 {
        if let Some(&id) = self.strings.get(value) {
            return id;
        }
        let id = self.strings.len() as u32;
        self.strings.insert(value.to_owned(), id);
        self.rodata.push_str(&format!(".LC{id}:\n"));
        self.rodata
            .push_str(&format!("    .string \"{}\"\n", escape_string(value)));
        id
    }

    fn gen_function(&mut self, function: &Function) -> Result<(), CodegenError> {
        let Some(meta) = self.table.find_func(ScopeId::GLOBAL, &function.name) else {
            return Err(CodegenError::MissingFunction(function.name.clone()));
        };
        debug!("lowering function '{}'", function.name);

        self.current_fn = function.name.clone();
        self.current_ret = abi::classify_return(&meta.return_type);
        let has_sret = self.current_ret == RetClass::RecordSret;
        let param_types: Vec<Type> = meta.params.iter().map(|p| p.ty.clone()).collect();
        let param_slots: Vec<i32> = meta.params.iter().map(|p| p.stack_offset).collect();
        let classes = abi::classify_params(&param_types, has_sret);

        // The hidden return pointer has to survive the body, so it gets
        // a frame slot just past the locals.
        let locals = align_to(meta.stack_space_used, 8);
        self.sret_save = has_sret.then_some(-((locals + 8) as i32));
        let frame = if has_sret {
            align_to(locals + 8, 16)
        } else {
            align_to(meta.stack_space_used, 16)
        };

        self.emit(format!(".globl {}", function.name));
        self.emit_label(&function.name);
        self.emit("pushq %rbp");
        self.emit("movq %rsp, %rbp");
        if frame > 0 {
            self.emit(format!("subq ${frame}, %rsp"));
        }
        self.depth = 0;

        if let Some(slot) = self.sret_save {
            self.emit(format!("movq %rdi, {slot}(%rbp)"));
        }
        for (class, (slot, ty)) in classes
            .iter()
            .zip(param_slots.iter().zip(param_types.iter()))
        {
            self.spill_param(class, *slot, ty);
        }

        for stmt in &function.body {
            self.gen_stmt(stmt)?;
        }

        self.emit_label(format!(".L.return.{}", function.name));
        if let Some(slot) = self.sret_save {
            self.emit(format!("movq {slot}(%rbp), %rax"));
        }
        self.emit("movq %rbp, %rsp");
        self.emit("popq %rbp");
        self.emit("ret");
        Ok(())
    }

    /// Store one incoming parameter into its frame slot.
    fn spill_param(&mut self, class: &ParamClass, slot: i32, ty: &Type) {
        match *class {
            ParamClass::IntReg(r) => self.store_gp(r, slot, ty.size()),
            ParamClass::FloatReg(r) => {
                let op = if ty.size() == 4 { "movss" } else { "movsd" };
                self.emit(format!("{op} %xmm{r}, {slot}(%rbp)"));
            }
            ParamClass::RecordReg(r) => self.store_gp(r, slot, ty.size()),
            ParamClass::RecordRegPair(r) => {
                self.store_gp(r, slot, 8);
                self.store_gp(r + 1, slot + 8, ty.size() - 8);
            }
            ParamClass::RecordByRefReg(r) => {
                self.emit(format!("movq {}, %rax", abi::ARG_REGS64[r]));
                self.copy_to_frame("%rax", slot, ty.size());
            }
            ParamClass::RecordByRefStack(off) => {
                self.emit(format!("movq {}(%rbp), %rax", 16 + off));
                self.copy_to_frame("%rax", slot, ty.size());
            }
            ParamClass::Stack(off) => {
                if ty.is_floating() {
                    let op = if ty.size() == 4 { "movss" } else { "movsd" };
                    self.emit(format!("{op} {}(%rbp), %xmm0", 16 + off));
                    self.emit(format!("{op} %xmm0, {slot}(%rbp)"));
                } else {
                    self.emit(format!("movq {}(%rbp), %rax", 16 + off));
                    self.store_gp_rax(slot, ty.size());
                }
            }
            ParamClass::StackRecord(off) => {
                self.emit(format!("leaq {}(%rbp), %rax", 16 + off));
                self.copy_to_frame("%rax", slot, ty.size());
            }
        }
    }

    /// Store the low `size` bytes of argument register `r` at `slot(%rbp)`.
    fn store_gp(&mut self, r: usize, slot: i32, size: u32) {
        match size {
            1 => self.emit(format!("movb {}, {slot}(%rbp)", abi::ARG_REGS8[r])),
            2 => self.emit(format!("movw {}, {slot}(%rbp)", abi::ARG_REGS16[r])),
            4 => self.emit(format!("movl {}, {slot}(%rbp)", abi::ARG_REGS32[r])),
            8 => self.emit(format!("movq {}, {slot}(%rbp)", abi::ARG_REGS64[r])),
            _ => {
                // Odd record tail: spill byte by byte so the slots of
                // neighbouring locals are never touched.
                for i in 0..size as i32 {
                    self.emit(format!("movb {}, {}(%rbp)", abi::ARG_REGS8[r], slot + i));
                    self.emit(format!("shrq $8, {}", abi::ARG_REGS64[r]));
                }
            }
        }
    }

    /// Store the low `size` bytes of `%rax` at `slot(%rbp)`.
    fn store_gp_rax(&mut self, slot: i32, size: u32) {
        match size {
            1 => self.emit(format!("movb %al, {slot}(%rbp)")),
            2 => self.emit(format!("movw %ax, {slot}(%rbp)")),
            4 => self.emit(format!("movl %eax, {slot}(%rbp)")),
            _ => self.emit(format!("movq %rax, {slot}(%rbp)")),
        }
    }

    /// Copy `size` bytes from the address in `src` to `slot(%rbp)`
    /// through `%r10`, widest chunks first.
    fn copy_to_frame(&mut self, src: &str, slot: i32, size: u32) {
        let mut off = 0i32;
        let mut rest = size as i32;
        while rest >= 8 {
            self.emit(format!("movq {off}({src}), %r10"));
            self.emit(format!("movq %r10, {}(%rbp)", slot + off));
            off += 8;
            rest -= 8;
        }
        if rest >= 4 {
            self.emit(format!("movl {off}({src}), %r10d"));
            self.emit(format!("movl %r10d, {}(%rbp)", slot + off));
            off += 4;
            rest -= 4;
        }
        if rest >= 2 {
            self.emit(format!("movw {off}({src}), %r10w"));
            self.emit(format!("movw %r10w, {}(%rbp)", slot + off));
            off += 2;
            rest -= 2;
        }
        if rest >= 1 {
            self.emit(format!("movb {off}({src}), %r10b"));
            self.emit(format!("movb %r10b, {}(%rbp)", slot + off));
        }
    }

    /// Copy `size` bytes from the address in `%rax` to the address in
    /// `%rdi`. Both registers survive.
    fn copy_between(&mut self, size: u32) {
        let mut off = 0i32;
        let mut rest = size as i32;
        while rest >= 8 {
            self.emit(format!("movq {off}(%rax), %r10"));
            self.emit(format!("movq %r10, {off}(%rdi)"));
            off += 8;
            rest -= 8;
        }
        if rest >= 4 {
            self.emit(format!("movl {off}(%rax), %r10d"));
            self.emit(format!("movl %r10d, {off}(%rdi)"));
            off += 4;
            rest -= 4;
        }
        if rest >= 2 {
            self.emit(format!("movw {off}(%rax), %r10w"));
            self.emit(format!("movw %r10w, {off}(%rdi)"));
            off += 2;
            rest -= 2;
        }
        if rest >= 1 {
            self.emit(format!("movb {off}(%rax), %r10b"));
            self.emit(format!("movb %r10b, {off}(%rdi)"));
        }
    }
}

/// Escape a literal for a gas `.string` directive.
fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{byte:03o}")),
        }
    }
    out
}
