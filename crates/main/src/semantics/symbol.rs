////////////////////////////////////////////////////////////////////////////////
// This file is part of "Per Aspera", an embeddable scripting programming     //
// language platform.                                                         //
//                                                                            //
// This work is proprietary software with source-available code.              //
//                                                                            //
// To copy, use, distribute, or contribute to this work, you must agree to    //
// the terms of the General License Agreement:                                //
//                                                                            //
// https://github.com/Eliah-Lakhin/per-aspera/blob/master/EULA.md             //
//                                                                            //
// The agreement grants a Basic Commercial License, allowing you to use       //
// this work in non-commercial and limited commercial products with a total   //
// gross revenue cap. To remove this commercial limit for one of your         //
// products, you must acquire a Full Commercial License.                      //
//                                                                            //
// If you contribute to the source code, documentation, or related materials, //
// you must grant me an exclusive license to these contributions.             //
// Contributions are governed by the "Contributions" section of the General   //
// License Agreement.                                                         //
//                                                                            //
// Copying the work in parts is strictly forbidden, except as permitted       //
// under the General License Agreement.                                       //
//                                                                            //
// If you do not or cannot agree to the terms of this Agreement,              //
// do not use this work.                                                      //
//                                                                            //
// This work is provided "as is", without any warranties, express or implied, //
// except where such disclaimers are legally invalid.                         //
//                                                                            //
// Copyright (c) 2024 Ilya Lakhin (Илья Александрович Лахин).                 //
// All rights reserved.                                                       //
////////////////////////////////////////////////////////////////////////////////

use std::{
    fmt::{Debug, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};

use compact_str::CompactString;

use crate::runtime::{Origin, TypeMeta};

/// An opaque reference to a node of the front end's syntax tree.
///
/// The generation subsystem never dereferences these handles itself; it only
/// passes them back to the front end through the
/// [Lowering](crate::semantics::Lowering) seam.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    id: usize,
}

impl Debug for NodeRef {
    #[inline(always)]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self.is_nil() {
            true => formatter.write_str("NodeRef(nil)"),
            false => formatter.write_fmt(format_args!("NodeRef({})", self.id)),
        }
    }
}

impl Default for NodeRef {
    #[inline(always)]
    fn default() -> Self {
        Self::nil()
    }
}

impl NodeRef {
    /// Wraps a front end node identifier.
    #[inline(always)]
    pub fn new(id: usize) -> Self {
        Self { id }
    }

    /// A reference that intentionally does not point to any syntax tree node.
    #[inline(always)]
    pub const fn nil() -> Self {
        Self { id: usize::MAX }
    }

    /// Returns true if this instance is the [Nil NodeRef](Self::nil).
    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        self.id == usize::MAX
    }

    /// The underlying front end node identifier.
    #[inline(always)]
    pub fn id(&self) -> usize {
        self.id
    }
}

/// A compile-time value of a constant entity, computed by the front end
/// during semantic analysis.
///
/// Complex compile-time values are
/// [serialized](crate::runtime::Cell::serialize) into dedicated constant
/// storage cells by the environment commit step. Simple literals bypass the
/// constant storage entirely and are embedded into the code stream as
/// immediate operands.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(CompactString),
    Seq(Vec<ConstValue>),
}

/// The kind of script entity a [Symbol] denotes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// A procedure with a generatable body.
    Procedure,

    /// A module-level variable stored in the shared data storage array.
    Global,

    /// A variable with one storage slot per OS thread, allocated in the
    /// shared data storage array after all globals of the same batch.
    ThreadLocal,

    /// A named constant with a compile-time value.
    Const,

    /// A procedure-local variable. Locals live in the unit's registers and
    /// never receive execution slots.
    Local,
}

/// The declaration site data of a [Symbol].
///
/// The front end fills this object during semantic analysis and seals it
/// into a Symbol with [Symbol::declare]. The fields are never mutated
/// afterwards.
#[derive(Clone, Debug)]
pub struct SymbolDecl {
    /// The entity kind.
    pub kind: SymbolKind,

    /// The entity's short name.
    pub name: CompactString,

    /// The entity's fully qualified name, used for native callback override
    /// matching.
    pub path: CompactString,

    /// The entity's resolved type.
    pub ty: TypeMeta,

    /// The front end syntax tree node of the declaration.
    pub decl: NodeRef,

    /// The declaration's source code range.
    pub origin: Origin,

    /// True if the declaration belongs to an externally linked (imported)
    /// entity. Imported entities resolve by name at run time and never
    /// receive execution slots.
    pub imported: bool,

    /// True if the entity is a compile-time-only routine.
    pub compile_time: bool,

    /// The compile-time value of a constant entity.
    pub value: Option<ConstValue>,

    /// The original entity this declaration duplicates, if the declaration
    /// was introduced by variable hoisting.
    pub hoisted_from: Option<Symbol>,
}

impl Default for SymbolDecl {
    #[inline(always)]
    fn default() -> Self {
        Self {
            kind: SymbolKind::Local,
            name: CompactString::default(),
            path: CompactString::default(),
            ty: TypeMeta::Nil,
            decl: NodeRef::nil(),
            origin: Origin::nil(),
            imported: false,
            compile_time: false,
            value: None,
            hoisted_from: None,
        }
    }
}

/// An opaque, stable identity of a script entity: a procedure, a global, a
/// thread-local, or a constant.
///
/// Symbol equality is identity-based rather than structural: two Symbols are
/// equal only if they originate from the same [declaration](Symbol::declare).
/// Cloning a Symbol is cheap and preserves its identity.
#[derive(Clone)]
pub struct Symbol {
    inner: Arc<SymbolDecl>,
}

impl PartialEq for Symbol {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(Arc::as_ptr(&self.inner) as usize);
    }
}

impl Debug for Symbol {
    #[inline(always)]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_fmt(format_args!(
            "Symbol({:?} {})",
            self.inner.kind, self.inner.path,
        ))
    }
}

impl Symbol {
    /// Seals the declaration data into a new entity identity.
    #[inline(always)]
    pub fn declare(decl: SymbolDecl) -> Self {
        Self {
            inner: Arc::new(decl),
        }
    }

    #[inline(always)]
    pub fn kind(&self) -> SymbolKind {
        self.inner.kind
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The entity's fully qualified name.
    #[inline(always)]
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// The entity's resolved type.
    #[inline(always)]
    pub fn ty(&self) -> &TypeMeta {
        &self.inner.ty
    }

    /// The front end syntax tree node of the entity's declaration.
    #[inline(always)]
    pub fn decl(&self) -> &NodeRef {
        &self.inner.decl
    }

    /// The declaration's source code range.
    #[inline(always)]
    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    /// True if the entity is externally linked (imported).
    #[inline(always)]
    pub fn is_imported(&self) -> bool {
        self.inner.imported
    }

    /// True if the entity is a compile-time-only routine.
    #[inline(always)]
    pub fn is_compile_time(&self) -> bool {
        self.inner.compile_time
    }

    /// The compile-time value of a constant entity.
    #[inline(always)]
    pub fn value(&self) -> Option<&ConstValue> {
        self.inner.value.as_ref()
    }

    /// Resolves this entity back to its single original owner.
    ///
    /// A declaration introduced by variable-hoisting duplication refers to
    /// its original entity; following the chain guarantees that hoisted
    /// duplicates never produce two execution slots for one logical
    /// variable. For ordinary entities, this function returns the entity
    /// itself.
    pub fn canonical(&self) -> &Symbol {
        let mut current = self;

        while let Some(original) = &current.inner.hoisted_from {
            current = original;
        }

        current
    }
}
