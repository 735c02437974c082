//! Scope-tree symbol table.
//!
//! Scopes live in one flat arena addressed by `ScopeId`; growing the arena
//! never moves a scope out from under an id already handed to the parser.
//! Each scope owns its declared variables, functions, switch labels, and
//! user type objects, plus the stack-offset cursor for frame layout.

use std::num::NonZeroU32;
use std::rc::Rc;

use bitflags::bitflags;
use log::debug;
use thiserror::Error;

use crate::types::{StructLayout, Type, align_to};

/// Symbol resolution and type checking error types.
#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("undefined symbol '{0}'")]
    UndefinedSymbol(String),
    #[error("undefined struct or union tag '{0}'")]
    UndefinedTag(String),
    #[error("redefinition of '{0}'")]
    Redefinition(String),
    #[error("invalid operand of type '{ty}' to '{op}'")]
    InvalidOperand { op: &'static str, ty: String },
    #[error("type '{ty}' has no member named '{member}'")]
    NoSuchMember { ty: String, member: String },
    #[error("'{name}' expects {expected} arguments, {found} given")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },
}

bitflags! {
    /// Storage class flags of a variable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VarFlags: u8 {
        const GLOBAL   = 1 << 0;
        const STATIC   = 1 << 1;
        const CONST    = 1 << 2;
        const EXTERN   = 1 << 3;
        const ARGUMENT = 1 << 4;
    }
}

/// A compile-time constant initializer, emitted as a data directive for
/// globals and statics.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Str(String),
}

/// A declared variable. `stack_offset` is the signed displacement from the
/// frame base: negative for locals, positive for stack-passed arguments,
/// zero for globals and statics (addressed by symbol name).
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub flags: VarFlags,
    /// Table-wide unique id; statics append it to their emitted label so
    /// same-named statics in different scopes never collide.
    pub uid: u32,
    pub stack_offset: i32,
    pub init: Option<ConstValue>,
}

impl Variable {
    pub fn new(name: String, ty: Type) -> Self {
        Variable {
            name,
            ty,
            flags: VarFlags::empty(),
            uid: 0,
            stack_offset: 0,
            init: None,
        }
    }

    pub fn is_global(&self) -> bool {
        self.flags.contains(VarFlags::GLOBAL)
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(VarFlags::STATIC)
    }

    /// Label the data emitter and the expression lowerer agree on.
    pub fn data_label(&self) -> String {
        if self.is_static() {
            format!("{}.{}", self.name, self.uid)
        } else {
            self.name.clone()
        }
    }
}

/// A declared or defined function.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Variable>,
    pub return_type: Type,
    /// Bytes of frame space the body consumed; drives the prologue's
    /// reservation once the definition is complete.
    pub stack_space_used: u32,
    pub is_defined: bool,
    pub is_variadic: bool,
}

/// A switch case value (`None` is the `default` marker) with the unique id
/// the code generator uses to synthesize its branch target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueLabel {
    pub value: Option<i64>,
    pub id: u32,
}

/// A user type declaration registered by name.
#[derive(Debug, Clone)]
pub enum Object {
    Record(Rc<StructLayout>),
    Enum {
        tag: String,
        constants: Vec<(String, i64)>,
    },
    Typedef {
        name: String,
        ty: Type,
    },
}

impl Object {
    fn matches_tag(&self, name: &str) -> bool {
        match self {
            Object::Record(layout) => layout.tag == name,
            Object::Enum { tag, .. } => tag == name,
            Object::Typedef { .. } => false,
        }
    }
}

/// Scope id addressing the flat arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(NonZeroU32);

impl ScopeId {
    pub const GLOBAL: Self = Self(NonZeroU32::new(1).unwrap());

    fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

/// One lexical scope.
#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub vars: Vec<Variable>,
    pub funcs: Vec<Function>,
    pub labels: Vec<ValueLabel>,
    pub objects: Vec<Object>,
    /// Next free byte below the frame base. Inherited by child scopes and
    /// propagated back up on pop, so it only grows within one function.
    pub cur_stack_offset: u32,
    /// Disambiguator inherited from the nearest enclosing switch.
    pub label_prefix: u32,
    pub is_switch_scope: bool,
    pub is_global: bool,
    pub level: u32,
}

/// Symbol table using flattened scope storage.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    current_scope_id: ScopeId,
    next_uid: u32,
    next_label_prefix: u32,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            scopes: Vec::new(),
            current_scope_id: ScopeId::GLOBAL,
            next_uid: 1,
            next_label_prefix: 1,
        };

        table.scopes.push(Scope {
            parent: None,
            children: Vec::new(),
            vars: Vec::new(),
            funcs: Vec::new(),
            labels: Vec::new(),
            objects: Vec::new(),
            cur_stack_offset: 0,
            label_prefix: 0,
            is_switch_scope: false,
            is_global: true,
            level: 0,
        });

        table
    }

    /// Allocates a child scope in the arena and links it under `parent`.
    /// The switch label prefix is inherited; ids already handed out stay
    /// valid as the arena grows.
    pub fn create_child(&mut self, parent: ScopeId, stack_offset: u32) -> ScopeId {
        let parent_scope = self.get_scope(parent);
        let child = Scope {
            parent: Some(parent),
            children: Vec::new(),
            vars: Vec::new(),
            funcs: Vec::new(),
            labels: Vec::new(),
            objects: Vec::new(),
            cur_stack_offset: stack_offset,
            label_prefix: parent_scope.label_prefix,
            is_switch_scope: false,
            is_global: false,
            level: parent_scope.level + 1,
        };

        let id = ScopeId::new(self.scopes.len() as u32 + 1).unwrap_or(ScopeId::GLOBAL);
        self.scopes.push(child);
        self.get_scope_mut(parent).children.push(id);
        debug!(
            "SymbolTable: created scope {} under {} (cursor {})",
            id.get(),
            parent.get(),
            stack_offset
        );
        id
    }

    /// Enters a new block scope under the current one, carrying the frame
    /// cursor along.
    pub fn push_scope(&mut self) -> ScopeId {
        let cursor = self.get_scope(self.current_scope_id).cur_stack_offset;
        let id = self.create_child(self.current_scope_id, cursor);
        self.current_scope_id = id;
        id
    }

    /// Enters a function body scope: the frame cursor restarts at zero.
    pub fn push_function_scope(&mut self) -> ScopeId {
        let id = self.create_child(self.current_scope_id, 0);
        self.current_scope_id = id;
        id
    }

    /// Enters a switch body scope, which gets a fresh label prefix for its
    /// generated case labels.
    pub fn push_switch_scope(&mut self) -> ScopeId {
        let id = self.push_scope();
        let prefix = self.next_label_prefix;
        self.next_label_prefix += 1;
        let scope = self.get_scope_mut(id);
        scope.is_switch_scope = true;
        scope.label_prefix = prefix;
        id
    }

    /// Leaves the current scope. The child's frame cursor is folded back
    /// into the parent so later declarations never reuse its slots.
    pub fn pop_scope(&mut self) -> Option<ScopeId> {
        let leaving = self.current_scope_id;
        let scope = self.get_scope(leaving);
        let cursor = scope.cur_stack_offset;
        if let Some(parent) = scope.parent {
            self.current_scope_id = parent;
            let parent_scope = self.get_scope_mut(parent);
            if !parent_scope.is_global {
                parent_scope.cur_stack_offset = parent_scope.cur_stack_offset.max(cursor);
            }
            debug!(
                "SymbolTable: popped scope {} back to {}",
                leaving.get(),
                parent.get()
            );
            Some(parent)
        } else {
            debug!("SymbolTable: attempted to pop the global scope");
            None
        }
    }

    pub fn current_scope(&self) -> ScopeId {
        self.current_scope_id
    }

    pub fn get_scope(&self, scope_id: ScopeId) -> &Scope {
        &self.scopes[scope_id.index()]
    }

    pub fn get_scope_mut(&mut self, scope_id: ScopeId) -> &mut Scope {
        &mut self.scopes[scope_id.index()]
    }

    /// Reserves `size` bytes of frame space in the function enclosing
    /// `scope` and returns the new slot's frame-relative offset.
    pub fn alloc_slot(&mut self, scope: ScopeId, size: u32, align: u32) -> i32 {
        let s = self.get_scope_mut(scope);
        s.cur_stack_offset = align_to(s.cur_stack_offset + size, align.max(1));
        -(s.cur_stack_offset as i32)
    }

    /// Reserves a frame slot sized and aligned for `ty`.
    pub fn alloc_local(&mut self, scope: ScopeId, ty: &Type) -> i32 {
        self.alloc_slot(scope, ty.size(), ty.align())
    }

    /// Appends a variable to `scope`, assigning its table-wide uid.
    /// Same-name collision within one scope is a redefinition.
    pub fn insert_var(&mut self, scope: ScopeId, mut var: Variable) -> Result<u32, SemanticError> {
        if self.get_scope(scope).vars.iter().any(|v| v.name == var.name) {
            return Err(SemanticError::Redefinition(var.name));
        }
        var.uid = self.next_uid;
        self.next_uid += 1;
        let uid = var.uid;
        debug!(
            "SymbolTable: insert var '{}' (uid {}) into scope {}",
            var.name,
            uid,
            scope.get()
        );
        self.get_scope_mut(scope).vars.push(var);
        Ok(uid)
    }

    /// Appends or merges a function declaration. A second body for the
    /// same name is a redefinition; repeated declarations are not.
    pub fn insert_func(&mut self, scope: ScopeId, func: Function) -> Result<(), SemanticError> {
        let scope_ref = self.get_scope_mut(scope);
        if let Some(existing) = scope_ref.funcs.iter_mut().find(|f| f.name == func.name) {
            if existing.is_defined && func.is_defined {
                return Err(SemanticError::Redefinition(func.name));
            }
            if func.is_defined {
                *existing = func;
            }
            return Ok(());
        }
        debug!(
            "SymbolTable: insert function '{}' into scope {}",
            func.name,
            scope.get()
        );
        scope_ref.funcs.push(func);
        Ok(())
    }

    pub fn insert_label(&mut self, scope: ScopeId, label: ValueLabel) {
        debug!(
            "SymbolTable: insert case label {:?} (id {}) into scope {}",
            label.value,
            label.id,
            scope.get()
        );
        self.get_scope_mut(scope).labels.push(label);
    }

    pub fn insert_object(&mut self, scope: ScopeId, object: Object) {
        self.get_scope_mut(scope).objects.push(object);
    }

    /// Replaces a registered record layout once its member list is known.
    pub fn complete_record(&mut self, scope: ScopeId, layout: Rc<StructLayout>) {
        let scope_ref = self.get_scope_mut(scope);
        for object in scope_ref.objects.iter_mut() {
            if let Object::Record(existing) = object
                && existing.tag == layout.tag
                && existing.is_union == layout.is_union
            {
                *object = Object::Record(layout);
                return;
            }
        }
        scope_ref.objects.push(Object::Record(layout));
    }

    fn walk_up<T>(&self, start: ScopeId, mut visit: impl FnMut(&Scope) -> Option<T>) -> Option<T> {
        let mut scope_id = start;
        loop {
            let scope = self.get_scope(scope_id);
            if let Some(found) = visit(scope) {
                return Some(found);
            }
            match scope.parent {
                Some(parent) => scope_id = parent,
                None => return None,
            }
        }
    }

    pub fn find_var(&self, scope: ScopeId, name: &str) -> Option<Variable> {
        self.walk_up(scope, |s| s.vars.iter().find(|v| v.name == name).cloned())
    }

    /// Nearest definition of `name`, walking parent links to the root.
    pub fn lookup_var(&self, scope: ScopeId, name: &str) -> Result<Variable, SemanticError> {
        self.find_var(scope, name)
            .ok_or_else(|| SemanticError::UndefinedSymbol(name.to_string()))
    }

    pub fn find_func(&self, scope: ScopeId, name: &str) -> Option<Function> {
        self.walk_up(scope, |s| s.funcs.iter().find(|f| f.name == name).cloned())
    }

    pub fn lookup_func(&self, scope: ScopeId, name: &str) -> Result<Function, SemanticError> {
        self.find_func(scope, name)
            .ok_or_else(|| SemanticError::UndefinedSymbol(name.to_string()))
    }

    pub fn find_object(&self, scope: ScopeId, name: &str) -> Option<Object> {
        self.walk_up(scope, |s| {
            s.objects.iter().find(|o| o.matches_tag(name)).cloned()
        })
    }

    pub fn lookup_record(
        &self,
        scope: ScopeId,
        tag: &str,
        is_union: bool,
    ) -> Result<Rc<StructLayout>, SemanticError> {
        self.walk_up(scope, |s| {
            s.objects.iter().find_map(|o| match o {
                Object::Record(layout) if layout.tag == tag && layout.is_union == is_union => {
                    Some(layout.clone())
                }
                _ => None,
            })
        })
        .ok_or_else(|| SemanticError::UndefinedTag(tag.to_string()))
    }

    pub fn find_typedef(&self, scope: ScopeId, name: &str) -> Option<Type> {
        self.walk_up(scope, |s| {
            s.objects.iter().find_map(|o| match o {
                Object::Typedef { name: n, ty } if n == name => Some(ty.clone()),
                _ => None,
            })
        })
    }

    pub fn find_enum_constant(&self, scope: ScopeId, name: &str) -> Option<i64> {
        self.walk_up(scope, |s| {
            s.objects.iter().find_map(|o| match o {
                Object::Enum { constants, .. } => {
                    constants.iter().find(|(n, _)| n == name).map(|&(_, v)| v)
                }
                _ => None,
            })
        })
    }

    pub fn get_func_mut(&mut self, scope: ScopeId, name: &str) -> Option<&mut Function> {
        // Functions only live in the global scope; walk up first.
        let mut scope_id = scope;
        loop {
            if self
                .get_scope(scope_id)
                .funcs
                .iter()
                .any(|f| f.name == name)
            {
                return self
                    .get_scope_mut(scope_id)
                    .funcs
                    .iter_mut()
                    .find(|f| f.name == name);
            }
            match self.get_scope(scope_id).parent {
                Some(parent) => scope_id = parent,
                None => return None,
            }
        }
    }

    /// Nearest switch scope at or above `scope`, if any.
    pub fn enclosing_switch(&self, scope: ScopeId) -> Option<ScopeId> {
        let mut cur = scope;
        loop {
            let s = self.get_scope(cur);
            if s.is_switch_scope {
                return Some(cur);
            }
            cur = s.parent?;
        }
    }

    /// The case labels belonging to the switch rooted at `scope`, in
    /// source order. Recursion descends into plain child blocks but never
    /// into a nested switch's own scope.
    pub fn collect_switch_case_labels(&self, scope: ScopeId) -> Vec<ValueLabel> {
        let mut labels = Vec::new();
        self.collect_labels_into(scope, &mut labels);
        labels
    }

    fn collect_labels_into(&self, scope: ScopeId, out: &mut Vec<ValueLabel>) {
        let s = self.get_scope(scope);
        out.extend(s.labels.iter().copied());
        for &child in &s.children {
            if !self.get_scope(child).is_switch_scope {
                self.collect_labels_into(child, out);
            }
        }
    }

    /// All variables of every scope, paired with their owning scope id.
    /// The data emitter uses this to find globals and statics.
    pub fn all_vars(&self) -> impl Iterator<Item = (&Scope, &Variable)> {
        self.scopes.iter().flat_map(|s| s.vars.iter().map(move |v| (s, v)))
    }
}
