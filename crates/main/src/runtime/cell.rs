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

use compact_str::CompactString;

use crate::{report::system_panic, runtime::TypeMeta, semantics::ConstValue};

/// A unit of the script virtual machine storage.
///
/// The execution environment's global/thread-local storage array and the
/// constant storage array are sequences of cells, and the interpreter's
/// registers hold cells as well.
///
/// Cells of committed storage slots are created exclusively by the
/// environment commit step: [of_type](Cell::of_type) allocates
/// zero-initialized storage matching an entity's resolved type, and
/// [serialize](Cell::serialize) turns a constant's compile-time value into
/// its dedicated storage cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    /// Void data.
    Nil,

    /// A boolean value.
    Bool(bool),

    /// An unsigned machine word.
    Usize(usize),

    /// A signed machine word.
    Isize(isize),

    /// A floating-point number.
    Float(f64),

    /// A string of text.
    Str(CompactString),

    /// A first-class reference to a function-table slot.
    Fn(usize),

    /// An array of cells.
    Array(Vec<Cell>),
}

impl Default for Cell {
    #[inline(always)]
    fn default() -> Self {
        Self::Nil
    }
}

impl Cell {
    /// Creates a cell of void data.
    #[inline(always)]
    pub fn nil() -> Self {
        Self::Nil
    }

    /// Returns true if this cell holds void data.
    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Allocates a zero/default-initialized cell matching the entity's
    /// resolved type.
    pub fn of_type(ty: &TypeMeta) -> Self {
        match ty {
            TypeMeta::Nil => Self::Nil,
            TypeMeta::Bool => Self::Bool(false),
            TypeMeta::Usize => Self::Usize(0),
            TypeMeta::Isize => Self::Isize(0),
            TypeMeta::Float => Self::Float(0.0),
            TypeMeta::Str => Self::Str(CompactString::default()),
            TypeMeta::Function => Self::Nil,
            TypeMeta::Array(..) => Self::Array(Vec::new()),
        }
    }

    /// Serializes a compile-time value into a dedicated storage cell.
    ///
    /// A malformed compile-time value indicates a front end bug and is not a
    /// recoverable condition.
    pub fn serialize(value: &ConstValue) -> Self {
        match value {
            ConstValue::Bool(value) => Self::Bool(*value),

            ConstValue::Int(value) => {
                let Ok(value) = isize::try_from(*value) else {
                    system_panic!("Compile-time integer is out of the platform range.");
                };

                Self::Isize(value)
            }

            ConstValue::Float(value) => Self::Float(*value),

            ConstValue::Str(value) => Self::Str(value.clone()),

            ConstValue::Seq(items) => Self::Array(items.iter().map(Self::serialize).collect()),
        }
    }

    /// Returns the type metadata describing this cell's current value.
    pub fn type_meta(&self) -> TypeMeta {
        match self {
            Self::Nil => TypeMeta::Nil,
            Self::Bool(..) => TypeMeta::Bool,
            Self::Usize(..) => TypeMeta::Usize,
            Self::Isize(..) => TypeMeta::Isize,
            Self::Float(..) => TypeMeta::Float,
            Self::Str(..) => TypeMeta::Str,
            Self::Fn(..) => TypeMeta::Function,

            Self::Array(items) => {
                let Some(first) = items.first() else {
                    return TypeMeta::Array(Box::new(TypeMeta::Nil));
                };

                TypeMeta::Array(Box::new(first.type_meta()))
            }
        }
    }
}
