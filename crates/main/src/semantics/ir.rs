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

use crate::{
    runtime::Origin,
    semantics::{ConstValue, Symbol},
};

/// An index into a [PositionMap].
pub type OriginIndex = usize;

/// An auxiliary table of source code positions produced by the front end
/// alongside the intermediate form.
///
/// Intermediate form nodes refer to their source ranges by [OriginIndex];
/// the bytecode generator resolves these indices to fill the environment's
/// debug sequence.
#[derive(Clone, Debug, Default)]
pub struct PositionMap {
    origins: Vec<Origin>,
}

impl PositionMap {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an origin, returning its index.
    #[inline(always)]
    pub fn push(&mut self, origin: Origin) -> OriginIndex {
        self.origins.push(origin);

        self.origins.len() - 1
    }

    /// Resolves an origin index. Unknown indices resolve to the
    /// [Nil Origin](Origin::nil).
    #[inline(always)]
    pub fn get(&self, index: OriginIndex) -> Origin {
        let Some(origin) = self.origins.get(index) else {
            return Origin::nil();
        };

        *origin
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

/// A node of the intermediate form the front end lowers requested units into.
///
/// The generation subsystem scans this tree for definitions that introduce
/// global or thread-local storage, the external pass pipeline transforms it,
/// and the external reachability pass walks it to discover referenced
/// procedures and constants.
#[derive(Clone, Debug, PartialEq)]
pub enum IrNode {
    /// An empty statement.
    Nop,

    /// An explicit lexical scope fragment.
    Scope(Box<IrNode>),

    /// A sequence of statements.
    Block(Vec<IrNode>),

    /// A definition introducing storage for `sym`.
    ///
    /// When the definition survives to the bytecode generator with `linked`
    /// set, the storage is externally allocated in the environment's data
    /// array, and the generator emits a store to the linked slot instead of
    /// allocating a register.
    VarDef {
        sym: Symbol,
        init: Box<IrNode>,
        origin: OriginIndex,
        linked: bool,
    },

    /// A plain assignment to an already allocated entity.
    Assign {
        target: Symbol,
        value: Box<IrNode>,
        origin: OriginIndex,
    },

    /// A reference to an entity.
    Use { sym: Symbol, origin: OriginIndex },

    /// An invocation of a procedure.
    Call {
        target: Symbol,
        args: Vec<IrNode>,
        origin: OriginIndex,
    },

    /// A simple literal, embedded into the code stream as an immediate
    /// operand.
    Lit {
        value: ConstValue,
        origin: OriginIndex,
    },
}

impl Default for IrNode {
    #[inline(always)]
    fn default() -> Self {
        Self::Nop
    }
}

/// The bytecode generator's control-flow input form.
///
/// Produced by the front end's
/// [lower_to_backend](crate::semantics::Lowering::lower_to_backend) step
/// from the fully transformed intermediate form.
#[derive(Clone, Debug)]
pub struct Body {
    /// The unit's transformed intermediate form.
    pub root: IrNode,

    /// The position table the generator resolves debug origins from.
    pub positions: PositionMap,
}
