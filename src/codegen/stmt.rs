//! Statement lowering.
//!
//! Control flow is label based. Every construct draws one number from
//! the unit-wide counter and derives its jump targets from it, so
//! nested constructs never collide. `break` and `continue` jump to the
//! innermost entry of their target stacks; `case` labels combine the
//! owning switch's scope prefix with the parse-time case id.

use crate::parser::ast::{Expr, Stmt};
use crate::symbol_table::ScopeId;

use super::CodegenContext;
use super::abi::RetClass;
use super::error::CodegenError;

impl CodegenContext<'_> {
    pub(super) fn gen_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Expr(expr) => self.gen_expr(expr),
            Stmt::Return(value) => self.gen_return(value.as_ref()),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.comment("if");
                let c = self.new_label();
                self.gen_branch_if_zero(cond, &format!(".L.else.{c}"))?;
                self.gen_stmt(then_branch)?;
                self.emit(format!("jmp .L.end.{c}"));
                self.emit_label(format!(".L.else.{c}"));
                if let Some(else_branch) = else_branch {
                    self.gen_stmt(else_branch)?;
                }
                self.emit_label(format!(".L.end.{c}"));
                Ok(())
            }
            Stmt::Loop {
                init,
                cond,
                step,
                body,
            } => {
                self.comment("loop");
                let c = self.new_label();
                for stmt in init {
                    self.gen_stmt(stmt)?;
                }
                self.emit_label(format!(".L.begin.{c}"));
                if let Some(cond) = cond {
                    self.gen_branch_if_zero(cond, &format!(".L.end.{c}"))?;
                }
                self.break_labels.push(format!(".L.end.{c}"));
                self.continue_labels.push(format!(".L.step.{c}"));
                self.gen_stmt(body)?;
                self.break_labels.pop();
                self.continue_labels.pop();
                self.emit_label(format!(".L.step.{c}"));
                if let Some(step) = step {
                    self.gen_expr(step)?;
                }
                self.emit(format!("jmp .L.begin.{c}"));
                self.emit_label(format!(".L.end.{c}"));
                Ok(())
            }
            Stmt::DoWhile { body, cond } => {
                self.comment("do-while");
                let c = self.new_label();
                self.emit_label(format!(".L.begin.{c}"));
                self.break_labels.push(format!(".L.end.{c}"));
                self.continue_labels.push(format!(".L.cond.{c}"));
                self.gen_stmt(body)?;
                self.break_labels.pop();
                self.continue_labels.pop();
                self.emit_label(format!(".L.cond.{c}"));
                self.gen_expr(cond)?;
                self.emit("cmpq $0, %rax");
                self.emit(format!("jne .L.begin.{c}"));
                self.emit_label(format!(".L.end.{c}"));
                Ok(())
            }
            Stmt::Switch { cond, body, scope } => self.gen_switch(cond, body, *scope),
            Stmt::Case { id, stmt } => {
                let Some(prefix) = self.switch_prefixes.last().copied() else {
                    return Err(CodegenError::OrphanControl("case"));
                };
                self.emit_label(format!(".L.case.{prefix}.{id}"));
                self.gen_stmt(stmt)
            }
            Stmt::Break => {
                let Some(target) = self.break_labels.last().cloned() else {
                    return Err(CodegenError::OrphanControl("break"));
                };
                self.emit(format!("jmp {target}"));
                Ok(())
            }
            Stmt::Continue => {
                let Some(target) = self.continue_labels.last().cloned() else {
                    return Err(CodegenError::OrphanControl("continue"));
                };
                self.emit(format!("jmp {target}"));
                Ok(())
            }
            Stmt::Goto(name) => {
                self.comment(format!("goto {name}"));
                self.emit(format!("jmp .L.label.{}.{name}", self.current_fn));
                Ok(())
            }
            Stmt::Label { name, stmt } => {
                self.emit_label(format!(".L.label.{}.{name}", self.current_fn));
                self.gen_stmt(stmt)
            }
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    self.gen_stmt(stmt)?;
                }
                Ok(())
            }
            Stmt::Empty => Ok(()),
        }
    }

    /// Evaluate an integer condition and jump to `target` when it is zero.
    fn gen_branch_if_zero(&mut self, cond: &Expr, target: &str) -> Result<(), CodegenError> {
        self.gen_expr(cond)?;
        self.emit("cmpq $0, %rax");
        self.emit(format!("je {target}"));
        Ok(())
    }

    /// Linear compare-and-branch dispatch over the collected case labels,
    /// falling through to `default` or past the switch entirely.
    fn gen_switch(&mut self, cond: &Expr, body: &Stmt, scope: ScopeId) -> Result<(), CodegenError> {
        self.comment("switch");
        let c = self.new_label();
        let end = format!(".L.end.{c}");
        let prefix = self.table.get_scope(scope).label_prefix;
        let labels = self.table.collect_switch_case_labels(scope);

        self.gen_expr(cond)?;
        let mut default_id = None;
        for label in &labels {
            match label.value {
                Some(v) => {
                    if i32::try_from(v).is_ok() {
                        self.emit(format!("cmpq ${v}, %rax"));
                    } else {
                        self.load_int_immediate(v, "%rdi");
                        self.emit("cmpq %rdi, %rax");
                    }
                    self.emit(format!("je .L.case.{prefix}.{}", label.id));
                }
                None => default_id = Some(label.id),
            }
        }
        match default_id {
            Some(id) => self.emit(format!("jmp .L.case.{prefix}.{id}")),
            None => self.emit(format!("jmp {end}")),
        }

        self.break_labels.push(end.clone());
        self.switch_prefixes.push(prefix);
        self.gen_stmt(body)?;
        self.switch_prefixes.pop();
        self.break_labels.pop();
        self.emit_label(end);
        Ok(())
    }

    fn gen_return(&mut self, value: Option<&Expr>) -> Result<(), CodegenError> {
        self.comment("return");
        if let Some(expr) = value {
            self.gen_expr(expr)?;
            match self.current_ret {
                RetClass::RecordSret => {
                    // The record's address is in %rax; copy it through
                    // the pointer saved at function entry.
                    let Some(slot) = self.sret_save else {
                        return Err(CodegenError::OrphanControl("return"));
                    };
                    self.emit(format!("movq {slot}(%rbp), %rdi"));
                    self.copy_between(expr.ty.size());
                }
                RetClass::RecordReg => {
                    self.emit("movq %rax, %rdi");
                    self.pack_low_qword(expr.ty.size());
                }
                RetClass::RecordRegPair => {
                    self.emit("movq %rax, %rdi");
                    self.pack_high_qword(expr.ty.size() - 8);
                    self.pack_low_qword(8);
                }
                _ => {}
            }
        }
        self.emit(format!("jmp .L.return.{}", self.current_fn));
        Ok(())
    }

    /// Pack the first eight bytes of the record at the address in `%rdi`
    /// into `%rax`, touching only `size` bytes of memory.
    fn pack_low_qword(&mut self, size: u32) {
        match size {
            1 => self.emit("movzbq (%rdi), %rax"),
            2 => self.emit("movzwq (%rdi), %rax"),
            4 => self.emit("movl (%rdi), %eax"),
            8 => self.emit("movq (%rdi), %rax"),
            _ => {
                self.emit("movq $0, %rax");
                for i in (0..size).rev() {
                    self.emit("shlq $8, %rax");
                    self.emit(format!("movb {i}(%rdi), %al"));
                }
            }
        }
    }

    /// Pack bytes eight and up into `%rdx` the same way.
    fn pack_high_qword(&mut self, size: u32) {
        match size {
            1 => self.emit("movzbq 8(%rdi), %rdx"),
            2 => self.emit("movzwq 8(%rdi), %rdx"),
            4 => self.emit("movl 8(%rdi), %edx"),
            8 => self.emit("movq 8(%rdi), %rdx"),
            _ => {
                self.emit("movq $0, %rdx");
                for i in (0..size).rev() {
                    self.emit("shlq $8, %rdx");
                    self.emit(format!("movb {}(%rdi), %dl", 8 + i));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn lower(source: &str) -> String {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let (unit, table) = Parser::new(tokens).parse().unwrap();
        super::super::generate(&unit, &table, false).unwrap()
    }

    #[test]
    fn if_else_branches_through_labels() {
        let asm = lower(
            "int main() { int x; x = 1; if (x) return 2; else return 3; }",
        );
        assert!(asm.contains("je .L.else.1"), "{asm}");
        assert!(asm.contains(".L.else.1:"), "{asm}");
        assert!(asm.contains(".L.end.1:"), "{asm}");
    }

    #[test]
    fn while_loop_tests_before_the_body() {
        let asm = lower(
            "int main() { int i; i = 0; while (i < 10) i = i + 1; return i; }",
        );
        assert!(asm.contains(".L.begin.1:"), "{asm}");
        assert!(asm.contains("je .L.end.1"), "{asm}");
        assert!(asm.contains("jmp .L.begin.1"), "{asm}");
    }

    #[test]
    fn do_while_tests_after_the_body() {
        let asm = lower("int main() { int i; i = 0; do i = i + 1; while (i < 3); return i; }");
        assert!(asm.contains("jne .L.begin.1"), "{asm}");
    }

    #[test]
    fn continue_jumps_to_the_step_label() {
        let asm = lower(
            "int main() {\n\
               int s; s = 0;\n\
               for (int i = 0; i < 10; i = i + 1) { if (i == 2) continue; s = s + i; }\n\
               return s;\n\
             }",
        );
        assert!(asm.contains("jmp .L.step.1"), "{asm}");
        assert!(asm.contains(".L.step.1:"), "{asm}");
    }

    #[test]
    fn break_leaves_the_innermost_loop() {
        let asm = lower(
            "int main() { while (1) { while (1) break; break; } return 0; }",
        );
        // Inner loop is the second label drawn.
        assert!(asm.contains("jmp .L.end.2"), "{asm}");
        assert!(asm.contains("jmp .L.end.1"), "{asm}");
    }

    #[test]
    fn switch_compares_and_branches_to_case_labels() {
        let asm = lower(
            "int main(int argc, char **argv) {\n\
               switch (argc) {\n\
               case 1: return 10;\n\
               case 2: return 20;\n\
               default: return 30;\n\
               }\n\
             }",
        );
        assert!(asm.contains("cmpq $1, %rax"), "{asm}");
        assert!(asm.contains("je .L.case.1.1"), "{asm}");
        assert!(asm.contains("cmpq $2, %rax"), "{asm}");
        assert!(asm.contains("je .L.case.1.2"), "{asm}");
        // default is an unconditional fallback.
        assert!(asm.contains("jmp .L.case.1.3"), "{asm}");
        assert!(asm.contains(".L.case.1.1:"), "{asm}");
    }

    #[test]
    fn switch_without_default_skips_the_body() {
        let asm = lower(
            "int main() { switch (9) { case 1: return 1; } return 0; }",
        );
        assert!(asm.contains("jmp .L.end.1"), "{asm}");
    }

    #[test]
    fn nested_switches_use_distinct_prefixes() {
        let asm = lower(
            "int main(int argc, char **argv) {\n\
               switch (argc) {\n\
               case 1:\n\
                 switch (argc + 1) { case 2: return 5; }\n\
                 return 6;\n\
               }\n\
               return 0;\n\
             }",
        );
        assert!(asm.contains(".L.case.1.1:"), "{asm}");
        assert!(asm.contains(".L.case.2.2:"), "{asm}");
    }

    #[test]
    fn goto_targets_a_function_local_label() {
        let asm = lower(
            "int main() { int x; x = 0; goto done; x = 1; done: return x; }",
        );
        assert!(asm.contains("jmp .L.label.main.done"), "{asm}");
        assert!(asm.contains(".L.label.main.done:"), "{asm}");
    }

    #[test]
    fn return_jumps_to_the_shared_epilogue() {
        let asm = lower("int main() { return 4; }");
        assert!(asm.contains("jmp .L.return.main"), "{asm}");
        let pos_jmp = asm.find("jmp .L.return.main").unwrap();
        let pos_label = asm.find(".L.return.main:").unwrap();
        assert!(pos_jmp < pos_label);
    }

    #[test]
    fn record_return_packs_registers() {
        let asm = lower(
            "struct pair { int x; int y; };\n\
             struct pair make() { struct pair p; p.x = 1; p.y = 2; return p; }",
        );
        assert!(asm.contains("movq (%rdi), %rax"), "{asm}");
    }

    #[test]
    fn sixteen_byte_record_return_fills_rax_and_rdx() {
        let asm = lower(
            "struct two { long a; long b; };\n\
             struct two make() { struct two t; t.a = 1; t.b = 2; return t; }",
        );
        assert!(asm.contains("movq 8(%rdi), %rdx"), "{asm}");
        assert!(asm.contains("movq (%rdi), %rax"), "{asm}");
    }
}
