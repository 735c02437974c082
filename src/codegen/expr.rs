//! Expression lowering.
//!
//! `gen_expr` leaves integer and pointer results sign-extended in
//! `%rax` and floating results in `%xmm0`. Record and array typed
//! expressions leave the address of their storage in `%rax`; loads and
//! stores through those addresses are always explicit. `gen_addr`
//! produces the address of any lvalue.

use crate::parser::ast::{BinOp, CallArg, Expr, ExprKind, UnOp, VarRef};
use crate::symbol_table::ScopeId;
use crate::types::{TyKind, Type, align_to};

use super::CodegenContext;
use super::abi::{self, ParamClass, RetClass};
use super::error::CodegenError;

impl CodegenContext<'_> {
    pub(super) fn gen_expr(&mut self, expr: &Expr) -> Result<(), CodegenError> {
        match &expr.kind {
            ExprKind::IntLiteral(v) => {
                self.load_int_immediate(*v, "%rax");
                Ok(())
            }
            ExprKind::FloatLiteral(v) => {
                self.load_float_immediate(*v, &expr.ty);
                Ok(())
            }
            ExprKind::StrLiteral(s) => {
                let id = self.intern_string(s);
                self.emit(format!("leaq .LC{id}(%rip), %rax"));
                Ok(())
            }
            ExprKind::Var(_) | ExprKind::Member { .. } => {
                self.gen_addr(expr)?;
                if !expr.ty.is_aggregate() {
                    self.load(&expr.ty);
                }
                Ok(())
            }
            ExprKind::Deref(ptr) => {
                self.gen_expr(ptr)?;
                if !expr.ty.is_aggregate() {
                    self.load(&expr.ty);
                }
                Ok(())
            }
            ExprKind::AddrOf(place) => self.gen_addr(place),
            ExprKind::Unary { op, operand } => self.gen_unary(*op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.gen_binary(*op, lhs, rhs),
            ExprKind::Assign { target, value } => self.gen_assign(target, value),
            ExprKind::CompoundAssign {
                target,
                op,
                value,
                op_ty,
            } => self.gen_compound_assign(target, *op, value, op_ty),
            ExprKind::Cast { operand } => {
                self.gen_expr(operand)?;
                self.gen_conversion(&operand.ty, &expr.ty)
            }
            ExprKind::PostIncDec { operand, is_inc } => {
                self.gen_post_inc_dec(operand, *is_inc)
            }
            ExprKind::Call {
                name,
                args,
                sret_slot,
            } => self.gen_call(name, args, *sret_slot),
        }
    }

    /// Address of an lvalue into `%rax`.
    pub(super) fn gen_addr(&mut self, expr: &Expr) -> Result<(), CodegenError> {
        match &expr.kind {
            ExprKind::Var(VarRef::Local { offset, .. }) => {
                self.emit(format!("leaq {offset}(%rbp), %rax"));
                Ok(())
            }
            ExprKind::Var(VarRef::Data { label }) => {
                self.emit(format!("leaq {label}(%rip), %rax"));
                Ok(())
            }
            ExprKind::Deref(ptr) => self.gen_expr(ptr),
            ExprKind::Member { base, offset, .. } => {
                // Record expressions evaluate to their address, which
                // also covers call results already spilled to a slot.
                self.gen_expr(base)?;
                if *offset > 0 {
                    self.emit(format!("addq ${offset}, %rax"));
                }
                Ok(())
            }
            _ => Err(CodegenError::UnsupportedOperation {
                op: "address of",
                ty: expr.ty.to_string(),
            }),
        }
    }

    /// Load the scalar at the address in `%rax` into the accumulator.
    fn load(&mut self, ty: &Type) {
        if ty.is_floating() {
            let op = if ty.size() == 4 { "movss" } else { "movsd" };
            self.emit(format!("{op} (%rax), %xmm0"));
            return;
        }
        if ty.kind == TyKind::Bool && !ty.is_pointer() {
            self.emit("movzbq (%rax), %rax");
            return;
        }
        match ty.size() {
            1 => self.emit("movsbq (%rax), %rax"),
            2 => self.emit("movswq (%rax), %rax"),
            4 => self.emit("movslq (%rax), %rax"),
            _ => self.emit("movq (%rax), %rax"),
        }
    }

    /// Store the accumulator into the scalar at the address in `%rdi`.
    fn store(&mut self, ty: &Type) {
        if ty.is_floating() {
            let op = if ty.size() == 4 { "movss" } else { "movsd" };
            self.emit(format!("{op} %xmm0, (%rdi)"));
            return;
        }
        match ty.size() {
            1 => self.emit("movb %al, (%rdi)"),
            2 => self.emit("movw %ax, (%rdi)"),
            4 => self.emit("movl %eax, (%rdi)"),
            _ => self.emit("movq %rax, (%rdi)"),
        }
    }

    pub(super) fn load_int_immediate(&mut self, v: i64, reg: &str) {
        if i32::try_from(v).is_ok() {
            self.emit(format!("movq ${v}, {reg}"));
        } else {
            self.emit(format!("movabsq ${v}, {reg}"));
        }
    }

    /// Materialize a floating constant through its bit pattern.
    fn load_float_immediate(&mut self, v: f64, ty: &Type) {
        if ty.size() == 4 {
            let bits = (v as f32).to_bits();
            self.emit(format!("movl $0x{bits:x}, %eax"));
            self.emit("movd %eax, %xmm0");
        } else {
            let bits = v.to_bits();
            self.emit(format!("movabsq $0x{bits:x}, %rax"));
            self.emit("movq %rax, %xmm0");
        }
    }

    fn gen_unary(&mut self, op: UnOp, operand: &Expr) -> Result<(), CodegenError> {
        self.gen_expr(operand)?;
        match op {
            UnOp::Neg if operand.ty.is_floating() => {
                // Flip the sign bit; negsd does not exist.
                if operand.ty.size() == 4 {
                    self.emit("movl $0x80000000, %eax");
                    self.emit("movd %eax, %xmm1");
                    self.emit("xorps %xmm1, %xmm0");
                } else {
                    self.emit("movabsq $0x8000000000000000, %rax");
                    self.emit("movq %rax, %xmm1");
                    self.emit("xorpd %xmm1, %xmm0");
                }
            }
            UnOp::Neg => self.emit("negq %rax"),
            UnOp::Not => {
                self.emit("cmpq $0, %rax");
                self.emit("sete %al");
                self.emit("movzbq %al, %rax");
            }
            UnOp::BitNot => self.emit("notq %rax"),
        }
        Ok(())
    }

    fn gen_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<(), CodegenError> {
        if op.is_logical() {
            return self.gen_short_circuit(op, lhs, rhs);
        }
        if lhs.ty.is_floating() {
            return self.gen_float_binary(op, lhs, rhs);
        }

        // Right first, parked on the stack; left lands in the
        // accumulator and the right pops into the scratch register.
        self.gen_expr(rhs)?;
        self.push("%rax");
        self.gen_expr(lhs)?;
        self.pop("%rdi");
        self.emit_int_op(op);
        Ok(())
    }

    /// The ALU step of an integer binary operation: combine `%rdi` into
    /// `%rax`, with the fixed-register dances for division and shifts.
    fn emit_int_op(&mut self, op: BinOp) {
        match op {
            BinOp::Add => self.emit("addq %rdi, %rax"),
            BinOp::Sub => self.emit("subq %rdi, %rax"),
            BinOp::Mul => self.emit("imulq %rdi, %rax"),
            BinOp::Div => {
                self.emit("cqto");
                self.emit("idivq %rdi");
            }
            BinOp::Mod => {
                self.emit("cqto");
                self.emit("idivq %rdi");
                self.emit("movq %rdx, %rax");
            }
            BinOp::BitAnd => self.emit("andq %rdi, %rax"),
            BinOp::BitOr => self.emit("orq %rdi, %rax"),
            BinOp::BitXor => self.emit("xorq %rdi, %rax"),
            BinOp::Shl => {
                self.emit("movq %rdi, %rcx");
                self.emit("salq %cl, %rax");
            }
            BinOp::Shr => {
                self.emit("movq %rdi, %rcx");
                self.emit("sarq %cl, %rax");
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
                self.emit("cmpq %rdi, %rax");
                self.emit(format!("{} %al", int_setcc(op)));
                self.emit("movzbq %al, %rax");
            }
            BinOp::LogAnd | BinOp::LogOr => unreachable!("logical operators short-circuit"),
        }
    }

    fn gen_float_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<(), CodegenError> {
        self.gen_expr(rhs)?;
        self.push_float();
        self.gen_expr(lhs)?;
        self.pop_float("%xmm1");
        self.emit_float_op(op, &lhs.ty)
    }

    /// The ALU step of a floating binary operation: combine `%xmm1`
    /// into `%xmm0`, width chosen by `ty`.
    fn emit_float_op(&mut self, op: BinOp, ty: &Type) -> Result<(), CodegenError> {
        let suffix = if ty.size() == 4 { "ss" } else { "sd" };
        match op {
            BinOp::Add => self.emit(format!("add{suffix} %xmm1, %xmm0")),
            BinOp::Sub => self.emit(format!("sub{suffix} %xmm1, %xmm0")),
            BinOp::Mul => self.emit(format!("mul{suffix} %xmm1, %xmm0")),
            BinOp::Div => self.emit(format!("div{suffix} %xmm1, %xmm0")),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
                // Unordered operands fall out of the carry/zero flags
                // however the hardware decides.
                self.emit(format!("ucomi{suffix} %xmm1, %xmm0"));
                self.emit(format!("{} %al", float_setcc(op)));
                self.emit("movzbq %al, %rax");
            }
            _ => {
                return Err(CodegenError::UnsupportedOperation {
                    op: "float arithmetic",
                    ty: ty.to_string(),
                });
            }
        }
        Ok(())
    }

    fn gen_short_circuit(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<(), CodegenError> {
        let c = self.new_label();
        match op {
            BinOp::LogAnd => {
                self.gen_expr(lhs)?;
                self.emit("cmpq $0, %rax");
                self.emit(format!("je .L.false.{c}"));
                self.gen_expr(rhs)?;
                self.emit("cmpq $0, %rax");
                self.emit(format!("je .L.false.{c}"));
                self.emit("movq $1, %rax");
                self.emit(format!("jmp .L.end.{c}"));
                self.emit_label(format!(".L.false.{c}"));
                self.emit("movq $0, %rax");
                self.emit_label(format!(".L.end.{c}"));
            }
            BinOp::LogOr => {
                self.gen_expr(lhs)?;
                self.emit("cmpq $0, %rax");
                self.emit(format!("jne .L.true.{c}"));
                self.gen_expr(rhs)?;
                self.emit("cmpq $0, %rax");
                self.emit(format!("jne .L.true.{c}"));
                self.emit("movq $0, %rax");
                self.emit(format!("jmp .L.end.{c}"));
                self.emit_label(format!(".L.true.{c}"));
                self.emit("movq $1, %rax");
                self.emit_label(format!(".L.end.{c}"));
            }
            _ => unreachable!("only logical operators short-circuit"),
        }
        Ok(())
    }

    fn gen_assign(&mut self, target: &Expr, value: &Expr) -> Result<(), CodegenError> {
        self.gen_addr(target)?;
        self.push("%rax");
        self.gen_expr(value)?;
        self.pop("%rdi");
        if target.ty.is_record() {
            // Value is the source record's address.
            self.copy_between(target.ty.size());
            self.emit("movq %rdi, %rax");
        } else {
            self.store(&target.ty);
        }
        Ok(())
    }

    /// `target op= value` through one address computation, so a side
    /// effect inside the target (a stepped subscript, a call producing
    /// the pointer) fires exactly once. The old value widens into
    /// `op_ty`, the operation runs, and the result narrows back for the
    /// store; the parser already promoted `value` and scaled pointer
    /// steps.
    fn gen_compound_assign(
        &mut self,
        target: &Expr,
        op: BinOp,
        value: &Expr,
        op_ty: &Type,
    ) -> Result<(), CodegenError> {
        self.gen_addr(target)?;
        self.push("%rax");
        self.gen_expr(value)?;

        if op_ty.is_floating() {
            self.emit("movaps %xmm0, %xmm1");
            self.pop("%rdi");
            self.emit("movq %rdi, %rax");
            self.load(&target.ty);
            self.gen_conversion(&target.ty, op_ty)?;
            self.emit_float_op(op, op_ty)?;
            self.gen_conversion(op_ty, &target.ty)?;
            self.store(&target.ty);
            return Ok(());
        }

        self.emit("movq %rax, %rdi");
        self.pop("%rax");
        self.emit("movq %rax, %r11");
        self.load(&target.ty);
        self.gen_conversion(&target.ty, op_ty)?;
        self.emit_int_op(op);
        self.gen_conversion(op_ty, &target.ty)?;
        self.emit("movq %r11, %rdi");
        self.store(&target.ty);
        Ok(())
    }

    /// Conversion between scalar types; the parser emits casts for
    /// every implicit adjustment, so this is the only place widths and
    /// representations change.
    fn gen_conversion(&mut self, from: &Type, to: &Type) -> Result<(), CodegenError> {
        if to.is_void() || from == to {
            return Ok(());
        }
        let from_float = from.is_floating();
        let to_float = to.is_floating();
        let from_int = from.is_integer() || from.is_pointer();
        let to_int = to.is_integer() || to.is_pointer();

        match (from_float, to_float) {
            (false, false) if from_int && to_int => {
                self.truncate_int(to);
                Ok(())
            }
            (false, true) if from_int => {
                let op = if to.size() == 4 { "cvtsi2ssq" } else { "cvtsi2sdq" };
                self.emit(format!("{op} %rax, %xmm0"));
                Ok(())
            }
            (true, false) if to_int => {
                if to.kind == TyKind::Bool && !to.is_pointer() {
                    let (xor, cmp) = if from.size() == 4 {
                        ("xorps", "ucomiss")
                    } else {
                        ("xorpd", "ucomisd")
                    };
                    self.emit(format!("{xor} %xmm1, %xmm1"));
                    self.emit(format!("{cmp} %xmm1, %xmm0"));
                    self.emit("setne %al");
                    self.emit("movzbq %al, %rax");
                } else {
                    let op = if from.size() == 4 { "cvttss2si" } else { "cvttsd2si" };
                    self.emit(format!("{op} %xmm0, %rax"));
                    self.truncate_int(to);
                }
                Ok(())
            }
            (true, true) => {
                match (from.size(), to.size()) {
                    (8, 4) => self.emit("cvtsd2ss %xmm0, %xmm0"),
                    (4, 8) => self.emit("cvtss2sd %xmm0, %xmm0"),
                    _ => {}
                }
                Ok(())
            }
            _ => Err(CodegenError::UnsupportedCast {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    /// Renormalize `%rax` to an integer target's width, keeping the
    /// sign-extended accumulator invariant.
    fn truncate_int(&mut self, to: &Type) {
        if to.is_pointer() {
            return;
        }
        if to.kind == TyKind::Bool {
            self.emit("cmpq $0, %rax");
            self.emit("setne %al");
            self.emit("movzbq %al, %rax");
            return;
        }
        match to.size() {
            1 => self.emit("movsbq %al, %rax"),
            2 => self.emit("movswq %ax, %rax"),
            4 => self.emit("movslq %eax, %rax"),
            _ => {}
        }
    }

    fn gen_post_inc_dec(&mut self, operand: &Expr, is_inc: bool) -> Result<(), CodegenError> {
        self.gen_addr(operand)?;
        self.emit("movq %rax, %rdi");
        self.load(&operand.ty);

        if operand.ty.is_floating() {
            let suffix = if operand.ty.size() == 4 { "ss" } else { "sd" };
            let op = if is_inc { "add" } else { "sub" };
            self.emit("movaps %xmm0, %xmm2");
            if operand.ty.size() == 4 {
                self.emit(format!("movl $0x{:x}, %eax", 1.0f32.to_bits()));
                self.emit("movd %eax, %xmm1");
            } else {
                self.emit(format!("movabsq $0x{:x}, %rax", 1.0f64.to_bits()));
                self.emit("movq %rax, %xmm1");
            }
            self.emit(format!("{op}{suffix} %xmm1, %xmm0"));
            self.store(&operand.ty);
            self.emit("movaps %xmm2, %xmm0");
            return Ok(());
        }

        // Pointers step by the pointee size, everything else by one.
        let step = operand.ty.pointee().map(|p| p.size()).unwrap_or(1);
        let op = if is_inc { "addq" } else { "subq" };
        self.emit("movq %rax, %r11");
        self.emit(format!("{op} ${step}, %rax"));
        self.store(&operand.ty);
        self.emit("movq %r11, %rax");
        Ok(())
    }

    fn gen_call(
        &mut self,
        name: &str,
        args: &[CallArg],
        sret_slot: Option<i32>,
    ) -> Result<(), CodegenError> {
        let Some(callee) = self.table.find_func(ScopeId::GLOBAL, name) else {
            return Err(CodegenError::MissingFunction(name.to_string()));
        };
        self.comment(format!("call {name}"));

        let arg_types: Vec<Type> = args.iter().map(|a| a.expr.ty.clone()).collect();
        let ret = abi::classify_return(&callee.return_type);
        let has_sret = ret == RetClass::RecordSret;
        let classes = abi::classify_params(&arg_types, has_sret);

        // Large record arguments go through their caller-side copies
        // first, so register shuffling below never re-evaluates them.
        for (arg, class) in args.iter().zip(&classes) {
            if matches!(
                class,
                ParamClass::RecordByRefReg(_) | ParamClass::RecordByRefStack(_)
            ) {
                let slot = self.arg_copy_slot(arg)?;
                self.gen_expr(&arg.expr)?;
                self.emit(format!("leaq {slot}(%rbp), %rdi"));
                self.copy_between(arg.expr.ty.size());
            }
        }

        // Pad so that %rsp is 16-byte aligned once the stack-passed
        // arguments are in place.
        let stack_slots = abi::stack_slot_count(&classes, &arg_types);
        let padded = (self.depth + stack_slots) % 2 == 1;
        if padded {
            self.emit("subq $8, %rsp");
            self.depth += 1;
        }

        for (arg, class) in args.iter().zip(&classes).rev() {
            match *class {
                ParamClass::Stack(_) => {
                    self.gen_expr(&arg.expr)?;
                    if arg.expr.ty.is_floating() {
                        self.push_float();
                    } else {
                        self.push("%rax");
                    }
                }
                ParamClass::StackRecord(_) => {
                    self.gen_expr(&arg.expr)?;
                    let slots = align_to(arg.expr.ty.size(), 8) / 8;
                    for i in (0..slots).rev() {
                        self.push(&format!("{}(%rax)", i * 8));
                    }
                }
                ParamClass::RecordByRefStack(_) => {
                    let slot = self.arg_copy_slot(arg)?;
                    self.emit(format!("leaq {slot}(%rbp), %rax"));
                    self.push("%rax");
                }
                _ => {}
            }
        }

        for (arg, class) in args.iter().zip(&classes).rev() {
            match *class {
                ParamClass::IntReg(_) => {
                    self.gen_expr(&arg.expr)?;
                    self.push("%rax");
                }
                ParamClass::FloatReg(_) => {
                    self.gen_expr(&arg.expr)?;
                    self.push_float();
                }
                ParamClass::RecordReg(_) => {
                    self.gen_expr(&arg.expr)?;
                    self.push("(%rax)");
                }
                ParamClass::RecordRegPair(_) => {
                    self.gen_expr(&arg.expr)?;
                    self.push("8(%rax)");
                    self.push("(%rax)");
                }
                ParamClass::RecordByRefReg(_) => {
                    let slot = self.arg_copy_slot(arg)?;
                    self.emit(format!("leaq {slot}(%rbp), %rax"));
                    self.push("%rax");
                }
                _ => {}
            }
        }

        for class in &classes {
            match *class {
                ParamClass::IntReg(r)
                | ParamClass::RecordReg(r)
                | ParamClass::RecordByRefReg(r) => self.pop(abi::ARG_REGS64[r]),
                ParamClass::FloatReg(r) => self.pop_float(&format!("%xmm{r}")),
                ParamClass::RecordRegPair(r) => {
                    self.pop(abi::ARG_REGS64[r]);
                    self.pop(abi::ARG_REGS64[r + 1]);
                }
                _ => {}
            }
        }

        if has_sret {
            let slot = self.require_sret_slot(sret_slot, &callee.return_type)?;
            self.emit(format!("leaq {slot}(%rbp), %rdi"));
        }

        self.emit(format!("movb ${}, %al", abi::float_reg_count(&classes)));
        self.emit(format!("call {name}"));

        let cleanup = stack_slots + u32::from(padded);
        if cleanup > 0 {
            self.emit(format!("addq ${}, %rsp", cleanup * 8));
            self.depth -= cleanup;
        }

        match ret {
            RetClass::Void | RetClass::Float => {}
            RetClass::Int => self.normalize_return(&callee.return_type),
            RetClass::RecordReg => {
                let slot = self.require_sret_slot(sret_slot, &callee.return_type)?;
                self.store_rax_record(slot, callee.return_type.size());
                self.emit(format!("leaq {slot}(%rbp), %rax"));
            }
            RetClass::RecordRegPair => {
                let slot = self.require_sret_slot(sret_slot, &callee.return_type)?;
                self.store_rax_record(slot, 8);
                // %rdx carries the second eight bytes.
                self.store_gp(2, slot + 8, callee.return_type.size() - 8);
                self.emit(format!("leaq {slot}(%rbp), %rax"));
            }
            RetClass::RecordSret => {
                let slot = self.require_sret_slot(sret_slot, &callee.return_type)?;
                self.emit(format!("leaq {slot}(%rbp), %rax"));
            }
        }
        Ok(())
    }

    fn arg_copy_slot(&self, arg: &CallArg) -> Result<i32, CodegenError> {
        arg.copy_slot.ok_or(CodegenError::UnsupportedOperation {
            op: "record argument",
            ty: arg.expr.ty.to_string(),
        })
    }

    fn require_sret_slot(
        &self,
        sret_slot: Option<i32>,
        ret: &Type,
    ) -> Result<i32, CodegenError> {
        sret_slot.ok_or(CodegenError::UnsupportedOperation {
            op: "record return",
            ty: ret.to_string(),
        })
    }

    /// Spill the low `size` bytes of `%rax` to `slot(%rbp)`.
    fn store_rax_record(&mut self, slot: i32, size: u32) {
        match size {
            1 => self.emit(format!("movb %al, {slot}(%rbp)")),
            2 => self.emit(format!("movw %ax, {slot}(%rbp)")),
            4 => self.emit(format!("movl %eax, {slot}(%rbp)")),
            8 => self.emit(format!("movq %rax, {slot}(%rbp)")),
            _ => {
                for i in 0..size as i32 {
                    self.emit(format!("movb %al, {}(%rbp)", slot + i));
                    self.emit("shrq $8, %rax");
                }
            }
        }
    }

    /// Foreign callees only define the low bits of a narrow integer
    /// return; re-extend to keep the accumulator invariant.
    fn normalize_return(&mut self, ty: &Type) {
        if ty.is_pointer() {
            return;
        }
        if ty.kind == TyKind::Bool {
            self.emit("movzbq %al, %rax");
            return;
        }
        match ty.size() {
            1 => self.emit("movsbq %al, %rax"),
            2 => self.emit("movswq %ax, %rax"),
            4 => self.emit("movslq %eax, %rax"),
            _ => {}
        }
    }
}

fn int_setcc(op: BinOp) -> &'static str {
    match op {
        BinOp::Lt => "setl",
        BinOp::Le => "setle",
        BinOp::Gt => "setg",
        BinOp::Ge => "setge",
        BinOp::Eq => "sete",
        BinOp::Ne => "setne",
        _ => unreachable!("not a comparison"),
    }
}

fn float_setcc(op: BinOp) -> &'static str {
    match op {
        BinOp::Lt => "setb",
        BinOp::Le => "setbe",
        BinOp::Gt => "seta",
        BinOp::Ge => "setae",
        BinOp::Eq => "sete",
        BinOp::Ne => "setne",
        _ => unreachable!("not a comparison"),
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
    fn division_uses_sign_extended_idiv() {
        let asm = lower("int main() { int a; a = 7; return a / 2; }");
        assert!(asm.contains("cqto"), "{asm}");
        assert!(asm.contains("idivq %rdi"), "{asm}");
    }

    #[test]
    fn comparison_materializes_a_byte() {
        let asm = lower("int main() { int a; a = 1; return a < 2; }");
        assert!(asm.contains("cmpq %rdi, %rax"), "{asm}");
        assert!(asm.contains("setl %al"), "{asm}");
        assert!(asm.contains("movzbq %al, %rax"), "{asm}");
    }

    #[test]
    fn float_literal_appears_as_bit_pattern() {
        let asm = lower("int main() { double d; d = 1.5; return 0; }");
        // 1.5 is 0x3ff8000000000000.
        assert!(asm.contains("movabsq $0x3ff8000000000000, %rax"), "{asm}");
        assert!(asm.contains("movq %rax, %xmm0"), "{asm}");
    }

    #[test]
    fn float_compare_uses_unordered_compare() {
        let asm = lower(
            "int main() { double a; double b; a = 1.0; b = 2.0; return a < b; }",
        );
        assert!(asm.contains("ucomisd %xmm1, %xmm0"), "{asm}");
        assert!(asm.contains("setb %al"), "{asm}");
    }

    #[test]
    fn large_literals_use_movabs() {
        let asm = lower("int main() { long x; x = 5000000000; return 0; }");
        assert!(asm.contains("movabsq $5000000000, %rax"), "{asm}");
    }

    #[test]
    fn indexing_scales_by_element_size() {
        let asm = lower("int main() { int a[3]; return a[2]; }");
        // The index is multiplied by a materialized element size.
        assert!(asm.contains("movq $4, %rax"), "{asm}");
        assert!(asm.contains("imulq %rdi, %rax"), "{asm}");
    }

    #[test]
    fn char_loads_sign_extend() {
        let asm = lower("int main() { char c; c = 200; return c; }");
        assert!(asm.contains("movsbq (%rax), %rax"), "{asm}");
    }

    #[test]
    fn logical_and_short_circuits() {
        let asm = lower("int main() { int a; a = 1; return a && 2; }");
        assert!(asm.contains(".L.false.1:"), "{asm}");
        assert!(asm.contains("je .L.false.1"), "{asm}");
    }

    #[test]
    fn six_arguments_fill_every_register() {
        let asm = lower(
            "int sum(int a, int b, int c, int d, int e, int f);\n\
             int main() { return sum(1, 2, 3, 4, 5, 6); }",
        );
        for reg in ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"] {
            assert!(asm.contains(&format!("popq {reg}")), "{reg} missing\n{asm}");
        }
    }

    #[test]
    fn float_argument_count_reaches_al() {
        let asm = lower(
            "int printf(char *fmt, ...);\n\
             int main() { printf(\"%f\", 1.5); return 0; }",
        );
        assert!(asm.contains("movb $1, %al"), "{asm}");
    }

    #[test]
    fn sixteen_byte_record_argument_travels_in_two_pushes() {
        let asm = lower(
            "struct pair { long a; long b; };\n\
             int take(struct pair p);\n\
             int main() { struct pair p; p.a = 1; return take(p); }",
        );
        assert!(asm.contains("pushq 8(%rax)"), "{asm}");
        assert!(asm.contains("pushq (%rax)"), "{asm}");
        assert!(asm.contains("popq %rdi"), "{asm}");
        assert!(asm.contains("popq %rsi"), "{asm}");
    }

    #[test]
    fn small_record_return_spills_to_a_slot() {
        let asm = lower(
            "struct pair { int x; int y; };\n\
             struct pair make();\n\
             int main() { struct pair p; p = make(); return p.x; }",
        );
        // The 8-byte record comes back in %rax and lands in the frame.
        assert!(asm.contains("movq %rax, -"), "{asm}");
    }

    #[test]
    fn record_assignment_copies_bytes() {
        let asm = lower(
            "struct big { long a; long b; long c; };\n\
             int main() { struct big x; struct big y; x = y; return 0; }",
        );
        assert!(asm.contains("movq (%rax), %r10"), "{asm}");
        assert!(asm.contains("movq %r10, (%rdi)"), "{asm}");
        assert!(asm.contains("movq 16(%rax), %r10"), "{asm}");
    }

    #[test]
    fn post_increment_yields_the_old_value() {
        let asm = lower("int main() { int i; i = 5; return i++; }");
        assert!(asm.contains("movq %rax, %r11"), "{asm}");
        assert!(asm.contains("movq %r11, %rax"), "{asm}");
    }

    #[test]
    fn pointer_post_increment_steps_by_pointee_size() {
        let asm = lower("int main() { int a[4]; int *p; p = a; p++; return 0; }");
        assert!(asm.contains("addq $4, %rax"), "{asm}");
    }

    #[test]
    fn compound_assign_computes_the_address_once() {
        let asm = lower("int g;\nint main() { g += 5; return g; }");
        // One leaq for the read-modify-write, one for the return read.
        assert_eq!(asm.matches("leaq g(%rip), %rax").count(), 2, "{asm}");
    }

    #[test]
    fn mixed_compound_assign_runs_in_double() {
        let asm = lower("int main() { int n; n = 2; n += 1.5; return n; }");
        assert!(asm.contains("cvtsi2sdq %rax, %xmm0"), "{asm}");
        assert!(asm.contains("addsd %xmm1, %xmm0"), "{asm}");
        assert!(asm.contains("cvttsd2si %xmm0, %rax"), "{asm}");
    }

    #[test]
    fn double_to_int_cast_truncates() {
        let asm = lower("int main() { double d; d = 3.9; return (int)d; }");
        assert!(asm.contains("cvttsd2si %xmm0, %rax"), "{asm}");
    }

    #[test]
    fn int_to_double_cast_converts() {
        let asm = lower("int main() { int i; i = 3; double d; d = i; return 0; }");
        assert!(asm.contains("cvtsi2sdq %rax, %xmm0"), "{asm}");
    }

    #[test]
    fn negating_a_double_flips_the_sign_bit() {
        let asm = lower("int main() { double d; double e; d = 1.5; e = -d; return 0; }");
        assert!(asm.contains("xorpd %xmm1, %xmm0"), "{asm}");
    }
}
