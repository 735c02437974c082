//! Argument and return classification for the System V AMD64 call
//! convention, reduced to the types the language can express.
//!
//! Integer and floating arguments draw from separate register files
//! and exhaust independently. A record travels in one general register
//! up to eight bytes, in a register pair up to sixteen, and as a
//! pointer to a caller-made copy above that. Whatever finds no
//! register goes onto the caller's stack in declaration order.

use crate::types::Type;

/// Integer argument registers in call-convention order, by operand width.
pub const ARG_REGS64: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];
pub const ARG_REGS32: [&str; 6] = ["%edi", "%esi", "%edx", "%ecx", "%r8d", "%r9d"];
pub const ARG_REGS16: [&str; 6] = ["%di", "%si", "%dx", "%cx", "%r8w", "%r9w"];
pub const ARG_REGS8: [&str; 6] = ["%dil", "%sil", "%dl", "%cl", "%r8b", "%r9b"];

/// Number of `%xmm` registers carrying floating arguments.
pub const FLOAT_ARG_REGS: usize = 8;

/// Where one argument travels. Stack offsets are in bytes past the
/// saved frame pointer and return address, so offset 0 reads as
/// `16(%rbp)` inside the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    /// Integer or pointer in the n-th integer register.
    IntReg(usize),
    /// Floating value in `%xmm<n>`.
    FloatReg(usize),
    /// Record of up to eight bytes in one integer register.
    RecordReg(usize),
    /// Record of up to sixteen bytes in integer registers n and n+1.
    RecordRegPair(usize),
    /// Pointer to a caller-owned record copy, in an integer register.
    RecordByRefReg(usize),
    /// Pointer to a caller-owned record copy, on the stack.
    RecordByRefStack(u32),
    /// Scalar on the stack, one eight-byte slot.
    Stack(u32),
    /// Record by value on the stack, rounded up to eight-byte slots.
    StackRecord(u32),
}

/// Where a return value travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetClass {
    Void,
    /// `%rax`, sign-extended.
    Int,
    /// `%xmm0`.
    Float,
    /// Record of up to eight bytes in `%rax`.
    RecordReg,
    /// Record of up to sixteen bytes in `%rax` and `%rdx`.
    RecordRegPair,
    /// Record written through a hidden pointer passed in `%rdi`;
    /// the callee hands the pointer back in `%rax`.
    RecordSret,
}

pub fn classify_return(ty: &Type) -> RetClass {
    if ty.is_void() {
        RetClass::Void
    } else if ty.is_floating() {
        RetClass::Float
    } else if ty.is_record() {
        match ty.size() {
            0..=8 => RetClass::RecordReg,
            9..=16 => RetClass::RecordRegPair,
            _ => RetClass::RecordSret,
        }
    } else {
        RetClass::Int
    }
}

/// Classify every argument in declaration order. With `has_sret` the
/// first integer register is already claimed by the hidden return
/// pointer. A sixteen-byte record takes two consecutive registers or
/// none at all.
pub fn classify_params(params: &[Type], has_sret: bool) -> Vec<ParamClass> {
    let mut ints = usize::from(has_sret);
    let mut floats = 0usize;
    let mut stack = 0u32;
    let mut classes = Vec::with_capacity(params.len());

    for ty in params {
        let class = if ty.is_floating() {
            if floats < FLOAT_ARG_REGS {
                floats += 1;
                ParamClass::FloatReg(floats - 1)
            } else {
                stack += 8;
                ParamClass::Stack(stack - 8)
            }
        } else if ty.is_record() {
            let size = ty.size();
            if size <= 8 {
                if ints < ARG_REGS64.len() {
                    ints += 1;
                    ParamClass::RecordReg(ints - 1)
                } else {
                    stack += 8;
                    ParamClass::StackRecord(stack - 8)
                }
            } else if size <= 16 {
                if ints + 2 <= ARG_REGS64.len() {
                    ints += 2;
                    ParamClass::RecordRegPair(ints - 2)
                } else {
                    stack += 16;
                    ParamClass::StackRecord(stack - 16)
                }
            } else if ints < ARG_REGS64.len() {
                ints += 1;
                ParamClass::RecordByRefReg(ints - 1)
            } else {
                stack += 8;
                ParamClass::RecordByRefStack(stack - 8)
            }
        } else if ints < ARG_REGS64.len() {
            ints += 1;
            ParamClass::IntReg(ints - 1)
        } else {
            stack += 8;
            ParamClass::Stack(stack - 8)
        };
        classes.push(class);
    }
    classes
}

/// Count the eight-byte stack slots a classified argument list needs
/// at call time.
pub fn stack_slot_count(classes: &[ParamClass], params: &[Type]) -> u32 {
    let mut slots = 0;
    for (class, ty) in classes.iter().zip(params) {
        slots += match class {
            ParamClass::Stack(_) | ParamClass::RecordByRefStack(_) => 1,
            ParamClass::StackRecord(_) => crate::types::align_to(ty.size(), 8) / 8,
            _ => 0,
        };
    }
    slots
}

/// Number of floating arguments that land in `%xmm` registers. The
/// value goes to `%al` before every call so variadic callees know how
/// much of the vector file to save.
pub fn float_reg_count(classes: &[ParamClass]) -> u32 {
    classes
        .iter()
        .filter(|c| matches!(c, ParamClass::FloatReg(_)))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Member, StructLayout, TyKind, Type};
    use std::rc::Rc;

    fn record(size: u32, align: u32) -> Type {
        let layout = Rc::new(StructLayout {
            tag: "t".into(),
            members: vec![Member {
                name: "raw".into(),
                ty: Type::new(TyKind::Char),
                offset: 0,
            }],
            size,
            align,
            is_union: false,
        });
        Type::new(TyKind::Struct(layout))
    }

    #[test]
    fn first_six_integers_take_registers_then_stack() {
        let params = vec![Type::int(); 8];
        let classes = classify_params(&params, false);
        for (i, class) in classes.iter().take(6).enumerate() {
            assert_eq!(*class, ParamClass::IntReg(i));
        }
        assert_eq!(classes[6], ParamClass::Stack(0));
        assert_eq!(classes[7], ParamClass::Stack(8));
    }

    #[test]
    fn integer_and_float_registers_exhaust_independently() {
        let mut params = Vec::new();
        for _ in 0..7 {
            params.push(Type::int());
            params.push(Type::new(TyKind::Double));
        }
        let classes = classify_params(&params, false);
        // Six ints and seven doubles get registers.
        assert_eq!(classes[10], ParamClass::IntReg(5));
        assert_eq!(classes[11], ParamClass::FloatReg(5));
        assert_eq!(classes[12], ParamClass::Stack(0));
        assert_eq!(classes[13], ParamClass::FloatReg(6));
    }

    #[test]
    fn record_sizes_pick_register_shapes() {
        let classes = classify_params(
            &[record(8, 8), record(16, 8), record(24, 8)],
            false,
        );
        assert_eq!(classes[0], ParamClass::RecordReg(0));
        assert_eq!(classes[1], ParamClass::RecordRegPair(1));
        assert_eq!(classes[2], ParamClass::RecordByRefReg(3));
    }

    #[test]
    fn sret_claims_the_first_integer_register() {
        let classes = classify_params(&[Type::int()], true);
        assert_eq!(classes[0], ParamClass::IntReg(1));
        assert_eq!(classify_return(&record(24, 8)), RetClass::RecordSret);
    }

    #[test]
    fn pair_needs_two_free_registers() {
        // Five ints leave one register; the pair must go to the stack.
        let mut params = vec![Type::int(); 5];
        params.push(record(16, 8));
        let classes = classify_params(&params, false);
        assert_eq!(classes[5], ParamClass::StackRecord(0));
    }

    #[test]
    fn return_classification_by_size() {
        assert_eq!(classify_return(&Type::void()), RetClass::Void);
        assert_eq!(classify_return(&Type::int()), RetClass::Int);
        assert_eq!(classify_return(&Type::new(TyKind::Double)), RetClass::Float);
        assert_eq!(classify_return(&record(8, 8)), RetClass::RecordReg);
        assert_eq!(classify_return(&record(12, 4)), RetClass::RecordRegPair);
        let ptr = Type::int().pointer_to();
        assert_eq!(classify_return(&ptr), RetClass::Int);
    }

    #[test]
    fn stack_slots_count_rounded_record_sizes() {
        let params = vec![Type::int(); 6]
            .into_iter()
            .chain([record(12, 4), Type::int()])
            .collect::<Vec<_>>();
        let classes = classify_params(&params, false);
        assert_eq!(classes[6], ParamClass::StackRecord(0));
        assert_eq!(classes[7], ParamClass::Stack(16));
        assert_eq!(stack_slot_count(&classes, &params), 3);
    }

    #[test]
    fn float_register_count_feeds_al() {
        let params = vec![Type::new(TyKind::Double), Type::int(), Type::new(TyKind::Float)];
        let classes = classify_params(&params, false);
        assert_eq!(float_reg_count(&classes), 2);
    }
}
