//! Data section emission for globals and statics.
//!
//! The symbol table is the single source of truth here: every global
//! and every function-local static sits in some scope's variable list
//! with its storage flags and optional constant initializer. Emission
//! order follows scope creation order, so the listing is deterministic.

use log::debug;

use crate::symbol_table::{ConstValue, VarFlags, Variable};
use crate::types::TyKind;

use super::CodegenContext;

impl CodegenContext<'_> {
    pub(super) fn emit_data_sections(&mut self) {
        let emittable: Vec<Variable> = self
            .table
            .all_vars()
            .filter(|(scope, var)| {
                (scope.is_global || var.is_static())
                    && !var.flags.contains(VarFlags::EXTERN)
                    && !var.flags.contains(VarFlags::ARGUMENT)
            })
            .map(|(_, var)| var.clone())
            .collect();

        for var in emittable {
            self.emit_variable(&var);
        }
    }

    fn emit_variable(&mut self, var: &Variable) {
        let label = var.data_label();
        debug!("emitting data object '{label}' ({} bytes)", var.ty.size());

        // Statics keep internal linkage; everything else is visible to
        // the linker.
        if !var.is_static() {
            self.data.push_str(&format!("    .globl {label}\n"));
        }
        self.data
            .push_str(&format!("    .align {}\n", var.ty.align()));
        self.data.push_str(&format!("{label}:\n"));

        match &var.init {
            None => {
                self.data
                    .push_str(&format!("    .zero {}\n", var.ty.size()));
            }
            Some(ConstValue::Int(v)) => self.emit_int_directive(*v, var),
            Some(ConstValue::Float(v)) => {
                if var.ty.size() == 4 {
                    let bits = (*v as f32).to_bits();
                    self.data.push_str(&format!("    .long 0x{bits:x}\n"));
                } else {
                    let bits = v.to_bits();
                    self.data.push_str(&format!("    .quad 0x{bits:x}\n"));
                }
            }
            Some(ConstValue::Str(s)) => self.emit_string_init(s, var),
        }
    }

    fn emit_int_directive(&mut self, v: i64, var: &Variable) {
        let directive = if var.ty.is_pointer() {
            ".quad"
        } else {
            match var.ty.size() {
                1 => ".byte",
                2 => ".short",
                4 => ".long",
                _ => ".quad",
            }
        };
        self.data.push_str(&format!("    {directive} {v}\n"));
    }

    /// `char buf[N] = "..."` embeds the bytes; `char *p = "..."` points
    /// into `.rodata`.
    fn emit_string_init(&mut self, s: &str, var: &Variable) {
        if var.ty.is_array() && var.ty.kind == TyKind::Char {
            self.data
                .push_str(&format!("    .string \"{}\"\n", super::escape_string(s)));
            let used = s.len() as u32 + 1;
            let total = var.ty.size();
            if total > used {
                self.data.push_str(&format!("    .zero {}\n", total - used));
            }
        } else {
            let id = self.intern_string(s);
            self.data.push_str(&format!("    .quad .LC{id}\n"));
        }
    }
}
