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

use std::fmt::{Display, Formatter};

use ahash::AHashMap;

/// An index of an interned type within the [TypeCache].
pub type TypeIndex = usize;

/// Resolved type metadata of a script entity.
///
/// The front end resolves each entity's type during semantic analysis; the
/// commit step uses this metadata to allocate zero/default-initialized
/// storage, and the bytecode generator interns it into the [TypeCache] when
/// the generated code needs runtime type information.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeMeta {
    Nil,
    Bool,
    Usize,
    Isize,
    Float,
    Str,
    Function,
    Array(Box<TypeMeta>),
}

impl Display for TypeMeta {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nil => formatter.write_str("nil"),
            Self::Bool => formatter.write_str("bool"),
            Self::Usize => formatter.write_str("usize"),
            Self::Isize => formatter.write_str("isize"),
            Self::Float => formatter.write_str("float"),
            Self::Str => formatter.write_str("str"),
            Self::Function => formatter.write_str("fn"),

            Self::Array(item) => {
                formatter.write_str("[")?;
                Display::fmt(item, formatter)?;
                formatter.write_str("]")
            }
        }
    }
}

/// An interning cache of type metadata.
///
/// The cache is owned by the compile session and lent to the bytecode
/// generator for the duration of one generation call. Interning the same
/// metadata twice yields the same [TypeIndex], so generated code can refer
/// to types by stable indices.
#[derive(Debug, Default)]
pub struct TypeCache {
    entries: Vec<TypeMeta>,
    index: AHashMap<TypeMeta, TypeIndex>,
}

impl TypeCache {
    /// Interns `meta`, returning its stable index.
    pub fn intern(&mut self, meta: TypeMeta) -> TypeIndex {
        if let Some(index) = self.index.get(&meta) {
            return *index;
        }

        let index = self.entries.len();

        let _ = self.index.insert(meta.clone(), index);

        self.entries.push(meta);

        index
    }

    /// Returns the metadata interned under `index`.
    #[inline(always)]
    pub fn get(&self, index: TypeIndex) -> Option<&TypeMeta> {
        self.entries.get(index)
    }

    /// The number of interned types.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no types were interned.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Auxiliary runtime type info the bytecode generator derives on demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RttiEntry {
    /// True if cells of this type own heap data that an assignment must
    /// clone deeply.
    pub deep: bool,
}

/// A cache of [runtime type info entries](RttiEntry) keyed by [TypeIndex].
///
/// Like the [TypeCache], this cache is owned by the compile session and lent
/// to the bytecode generator during a generation call.
#[derive(Debug, Default)]
pub struct RttiCache {
    entries: AHashMap<TypeIndex, RttiEntry>,
}

impl RttiCache {
    /// Resolves the runtime type info of the type interned under `index`,
    /// deriving and caching the entry on first request.
    pub fn resolve(&mut self, index: TypeIndex, meta: &TypeMeta) -> RttiEntry {
        if let Some(entry) = self.entries.get(&index) {
            return *entry;
        }

        let entry = RttiEntry {
            deep: matches!(meta, TypeMeta::Str | TypeMeta::Array(..)),
        };

        let _ = self.entries.insert(index, entry);

        entry
    }

    /// The number of derived entries.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries were derived.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RttiCache, TypeCache, TypeMeta};

    #[test]
    fn test_type_interning() {
        let mut cache = TypeCache::default();

        let first = cache.intern(TypeMeta::Usize);
        let second = cache.intern(TypeMeta::Str);
        let third = cache.intern(TypeMeta::Usize);

        assert_eq!(first, third);
        assert_ne!(first, second);
        assert_eq!(2, cache.len());
        assert_eq!(Some(&TypeMeta::Str), cache.get(second));
    }

    #[test]
    fn test_rtti_resolution() {
        let mut types = TypeCache::default();
        let mut rtti = RttiCache::default();

        let usize_index = types.intern(TypeMeta::Usize);
        let str_index = types.intern(TypeMeta::Str);

        assert!(!rtti.resolve(usize_index, &TypeMeta::Usize).deep);
        assert!(rtti.resolve(str_index, &TypeMeta::Str).deep);
        assert_eq!(2, rtti.len());
    }
}
