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
    sync::Arc,
};

use ahash::AHashMap;
use compact_str::CompactString;

use crate::{
    runtime::{Cell, Origin, RuntimeResult},
    semantics::Symbol,
};

/// A stable position of an entity within the function table or a storage
/// array of the execution environment.
pub type SlotIndex = usize;

/// An index of a native callback override within the linker table's ordered
/// override sequence.
pub type CallbackIndex = usize;

/// A native procedure override.
///
/// When a procedure's fully qualified name matches a registered override
/// pattern, the virtual machine invokes the callback in place of interpreted
/// bytecode.
pub type ScriptCallback = Arc<dyn Fn(Origin, &mut [Cell]) -> RuntimeResult<Cell>>;

/// Maps entity identities to stable slot indices, and owns the ordered
/// native callback overrides.
///
/// Slot mappings are written during the tentative phase of a generation
/// call, before the corresponding environment slots exist, so the code being
/// generated can already refer to new entities by stable index. Mappings are
/// never removed; a mapping left behind by a failed call is harmless
/// (nothing may execute an uncommitted slot) and is overwritten when the
/// entity re-registers.
pub struct LinkerTable {
    slots: AHashMap<Symbol, SlotIndex>,

    // Two parallel ordered sequences rather than a map: patterns need not be
    // unique keys, and registration order resolves ambiguous matches.
    patterns: Vec<CompactString>,
    callbacks: Vec<ScriptCallback>,
}

impl Default for LinkerTable {
    #[inline(always)]
    fn default() -> Self {
        Self {
            slots: AHashMap::new(),
            patterns: Vec::new(),
            callbacks: Vec::new(),
        }
    }
}

impl Debug for LinkerTable {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LinkerTable")
            .field("slots", &self.slots.len())
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl LinkerTable {
    /// Binds `sym` to `slot`, overwriting a stale mapping if one exists.
    #[inline(always)]
    pub(crate) fn bind(&mut self, sym: Symbol, slot: SlotIndex) {
        let _ = self.slots.insert(sym, slot);
    }

    /// Resolves the slot index assigned to `sym`, if any.
    #[inline(always)]
    pub fn slot_of(&self, sym: &Symbol) -> Option<SlotIndex> {
        self.slots.get(sym).copied()
    }

    /// Appends a native callback override. Returns the override's index.
    pub(crate) fn register_callback(
        &mut self,
        pattern: impl Into<CompactString>,
        callback: ScriptCallback,
    ) -> CallbackIndex {
        self.patterns.push(pattern.into());
        self.callbacks.push(callback);

        self.callbacks.len() - 1
    }

    /// Resolves the override of the fully qualified name `path`.
    ///
    /// The first registered matching pattern wins: registration order is
    /// authoritative for ambiguous matches.
    pub fn callback_of(&self, path: &str) -> Option<CallbackIndex> {
        for (index, pattern) in self.patterns.iter().enumerate() {
            if Self::matches(pattern, path) {
                return Some(index);
            }
        }

        None
    }

    /// Returns the callback registered under `index`.
    #[inline(always)]
    pub fn callback(&self, index: CallbackIndex) -> Option<&ScriptCallback> {
        self.callbacks.get(index)
    }

    // A pattern is either an exact fully qualified name, or a name prefix
    // followed by a `.*` tail.
    fn matches(pattern: &str, path: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix(".*") {
            let Some(rest) = path.strip_prefix(prefix) else {
                return false;
            };

            return rest.starts_with('.');
        }

        pattern == path
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        interpret::LinkerTable,
        runtime::Cell,
        semantics::{Symbol, SymbolDecl, SymbolKind},
    };

    #[test]
    fn test_slot_binding_overwrites() {
        let mut linker = LinkerTable::default();

        let sym = Symbol::declare(SymbolDecl {
            kind: SymbolKind::Global,
            name: "g".into(),
            ..Default::default()
        });

        assert_eq!(None, linker.slot_of(&sym));

        linker.bind(sym.clone(), 5);
        assert_eq!(Some(5), linker.slot_of(&sym));

        linker.bind(sym.clone(), 2);
        assert_eq!(Some(2), linker.slot_of(&sym));
    }

    #[test]
    fn test_pattern_matching() {
        let mut linker = LinkerTable::default();

        let _ = linker.register_callback("sys.io.*", Arc::new(|_, _| Ok(Cell::nil())));
        let _ = linker.register_callback("sys.exit", Arc::new(|_, _| Ok(Cell::nil())));

        assert_eq!(Some(0), linker.callback_of("sys.io.print"));
        assert_eq!(Some(1), linker.callback_of("sys.exit"));
        assert_eq!(None, linker.callback_of("sys.iodine"));
        assert_eq!(None, linker.callback_of("user.main"));
    }

    #[test]
    fn test_first_registered_pattern_wins() {
        let mut linker = LinkerTable::default();

        let _ = linker.register_callback("sys.foo", Arc::new(|_, _| Ok(Cell::Usize(1))));
        let _ = linker.register_callback("sys.*", Arc::new(|_, _| Ok(Cell::Usize(2))));

        assert_eq!(Some(0), linker.callback_of("sys.foo"));
        assert_eq!(Some(1), linker.callback_of("sys.bar"));
    }
}
