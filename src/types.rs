//! Value types: base kinds, pointer depth, arrays, struct layouts.
//!
//! A `Type` is cheap to clone and carries everything the code generator
//! needs to size loads and stores; struct layouts are shared behind `Rc`
//! so nested and repeated uses see the same precomputed offsets.

use std::fmt;
use std::rc::Rc;

/// Rounds `n` up to the next multiple of `align`. `align` must be a power
/// of two greater than zero.
pub fn align_to(n: u32, align: u32) -> u32 {
    (n + align - 1) & !(align - 1)
}

/// Base kind of a value type, before pointer/array decoration.
#[derive(Debug, Clone, PartialEq)]
pub enum TyKind {
    Void,
    Bool,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Enums are represented as `int` everywhere after parsing.
    Enum(String),
    Struct(Rc<StructLayout>),
}

/// One named member of a struct or union, with its precomputed byte offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub ty: Type,
    pub offset: u32,
}

/// Memory layout of a struct or union: members in declaration order with
/// offsets honoring natural alignment, total size padded to the widest
/// member's alignment.
#[derive(Debug, Clone)]
pub struct StructLayout {
    pub tag: String,
    pub members: Vec<Member>,
    pub size: u32,
    pub align: u32,
    pub is_union: bool,
}

// Tag identity is what matters; comparing member lists would recurse
// through self-referential pointer members.
impl PartialEq for StructLayout {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.is_union == other.is_union
    }
}

impl StructLayout {
    /// Computes offsets left to right from the declared member list.
    pub fn compute(tag: String, is_union: bool, decls: Vec<(String, Type)>) -> Self {
        let mut members = Vec::with_capacity(decls.len());
        let mut offset = 0u32;
        let mut max_align = 1u32;
        let mut max_size = 0u32;

        for (name, ty) in decls {
            let align = ty.align().max(1);
            let size = ty.size();
            max_align = max_align.max(align);
            max_size = max_size.max(size);

            let member_offset = if is_union {
                0
            } else {
                offset = align_to(offset, align);
                let at = offset;
                offset += size;
                at
            };
            members.push(Member {
                name,
                ty,
                offset: member_offset,
            });
        }

        let size = if is_union {
            align_to(max_size, max_align)
        } else {
            align_to(offset, max_align)
        };

        StructLayout {
            tag,
            members,
            size,
            align: max_align,
            is_union,
        }
    }

    /// A forward reference (`struct T *p` before `struct T` is defined, or
    /// inside its own definition) carries a layout with no members yet.
    pub fn incomplete(tag: String, is_union: bool) -> Self {
        StructLayout {
            tag,
            members: Vec::new(),
            size: 0,
            align: 1,
            is_union,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        self.members.is_empty() && self.size == 0
    }

    pub fn find_member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// A resolved value type: base kind plus pointer indirection depth plus an
/// optional single array dimension. `int *a[3]` is kind `Int`, depth 1,
/// length 3 (an array of three pointers).
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: TyKind,
    pub ptr_depth: u8,
    pub array_len: Option<u32>,
}

impl Type {
    pub fn new(kind: TyKind) -> Self {
        Type {
            kind,
            ptr_depth: 0,
            array_len: None,
        }
    }

    pub fn void() -> Self {
        Type::new(TyKind::Void)
    }

    pub fn int() -> Self {
        Type::new(TyKind::Int)
    }

    pub fn long() -> Self {
        Type::new(TyKind::Long)
    }

    pub fn char_ty() -> Self {
        Type::new(TyKind::Char)
    }

    pub fn double() -> Self {
        Type::new(TyKind::Double)
    }

    /// One more level of indirection. An array decays first: a pointer to
    /// `T[n]` in this model is a pointer to `T`.
    pub fn pointer_to(&self) -> Type {
        Type {
            kind: self.kind.clone(),
            ptr_depth: self.ptr_depth + 1,
            array_len: None,
        }
    }

    pub fn array_of(&self, len: u32) -> Type {
        Type {
            kind: self.kind.clone(),
            ptr_depth: self.ptr_depth,
            array_len: Some(len),
        }
    }

    /// The type a pointer points at, or `None` for non-pointers.
    pub fn pointee(&self) -> Option<Type> {
        if self.array_len.is_some() {
            // Deref of an array value yields its element.
            return Some(self.element());
        }
        if self.ptr_depth == 0 {
            return None;
        }
        Some(Type {
            kind: self.kind.clone(),
            ptr_depth: self.ptr_depth - 1,
            array_len: None,
        })
    }

    /// The element type of an array, or the type itself for scalars.
    pub fn element(&self) -> Type {
        Type {
            kind: self.kind.clone(),
            ptr_depth: self.ptr_depth,
            array_len: None,
        }
    }

    /// Expression-position type after array decay.
    pub fn decayed(&self) -> Type {
        if self.array_len.is_some() {
            self.element().pointer_to()
        } else {
            self.clone()
        }
    }

    fn base_size(&self) -> u32 {
        match &self.kind {
            TyKind::Void => 1,
            TyKind::Bool | TyKind::Char => 1,
            TyKind::Short => 2,
            TyKind::Int | TyKind::Enum(_) | TyKind::Float => 4,
            TyKind::Long | TyKind::Double => 8,
            TyKind::Struct(layout) => layout.size,
        }
    }

    /// Total storage size in bytes, including the full array extent.
    pub fn size(&self) -> u32 {
        let elem = if self.ptr_depth > 0 {
            8
        } else {
            self.base_size()
        };
        match self.array_len {
            Some(n) => elem * n,
            None => elem,
        }
    }

    /// Natural alignment in bytes.
    pub fn align(&self) -> u32 {
        if self.ptr_depth > 0 {
            return 8;
        }
        match &self.kind {
            TyKind::Struct(layout) => layout.align.max(1),
            _ => self.base_size(),
        }
    }

    pub fn is_void(&self) -> bool {
        self.ptr_depth == 0 && self.array_len.is_none() && self.kind == TyKind::Void
    }

    pub fn is_pointer(&self) -> bool {
        self.ptr_depth > 0 && self.array_len.is_none()
    }

    pub fn is_array(&self) -> bool {
        self.array_len.is_some()
    }

    pub fn is_floating(&self) -> bool {
        self.ptr_depth == 0
            && self.array_len.is_none()
            && matches!(self.kind, TyKind::Float | TyKind::Double)
    }

    pub fn is_integer(&self) -> bool {
        self.ptr_depth == 0
            && self.array_len.is_none()
            && matches!(
                self.kind,
                TyKind::Bool
                    | TyKind::Char
                    | TyKind::Short
                    | TyKind::Int
                    | TyKind::Long
                    | TyKind::Enum(_)
            )
    }

    /// A struct or union held by value (not through a pointer).
    pub fn is_record(&self) -> bool {
        self.ptr_depth == 0 && self.array_len.is_none() && matches!(self.kind, TyKind::Struct(_))
    }

    pub fn is_aggregate(&self) -> bool {
        self.is_record() || self.is_array()
    }

    pub fn struct_layout(&self) -> Option<&Rc<StructLayout>> {
        match &self.kind {
            TyKind::Struct(layout) => Some(layout),
            _ => None,
        }
    }

    /// Conversion rank for the usual integer promotions.
    pub fn get_integer_rank(&self) -> u8 {
        match self.kind {
            TyKind::Bool => 1,
            TyKind::Char => 2,
            TyKind::Short => 3,
            TyKind::Int | TyKind::Enum(_) => 4,
            TyKind::Long => 5,
            _ => 0,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TyKind::Void => write!(f, "void")?,
            TyKind::Bool => write!(f, "_Bool")?,
            TyKind::Char => write!(f, "char")?,
            TyKind::Short => write!(f, "short")?,
            TyKind::Int => write!(f, "int")?,
            TyKind::Long => write!(f, "long")?,
            TyKind::Float => write!(f, "float")?,
            TyKind::Double => write!(f, "double")?,
            TyKind::Enum(tag) => write!(f, "enum {}", tag)?,
            TyKind::Struct(layout) => {
                if layout.is_union {
                    write!(f, "union {}", layout.tag)?
                } else {
                    write!(f, "struct {}", layout.tag)?
                }
            }
        }
        for _ in 0..self.ptr_depth {
            write!(f, "*")?;
        }
        if let Some(n) = self.array_len {
            write!(f, "[{}]", n)?;
        }
        Ok(())
    }
}

/// Result type of a binary arithmetic expression: floating beats integer,
/// `double` beats `float`, otherwise the wider integer wins with `int` as
/// the floor. Pointer arithmetic keeps the pointer type and is handled by
/// the caller before consulting this table.
pub fn usual_arithmetic_conversion(lhs: &Type, rhs: &Type) -> Type {
    if lhs.kind == TyKind::Double || rhs.kind == TyKind::Double {
        return Type::double();
    }
    if lhs.kind == TyKind::Float || rhs.kind == TyKind::Float {
        return Type::new(TyKind::Float);
    }
    let rank = lhs.get_integer_rank().max(rhs.get_integer_rank());
    if rank >= 5 { Type::long() } else { Type::int() }
}
