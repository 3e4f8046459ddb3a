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

use std::mem::replace;

use crate::{
    report::system_panic,
    semantics::{IrNode, Symbol, SymbolKind},
};

/// A transactional append-only registry of entities discovered during
/// generation.
///
/// The queue consists of a permanently committed region and a tentative
/// tail, separated by a commit watermark. A generation attempt
/// [registers](Self::register) provisional entries, previews them with
/// [peek](Self::peek), and then either commits them exactly once with
/// [visit](Self::visit) or discards them exactly once with
/// [rewind](Self::rewind).
///
/// Committed entries are never removed; only the tentative tail can be
/// rewound. Generation calls never overlap, so at most one tentative batch
/// exists at any time.
#[derive(Debug)]
pub struct DiscoveryQueue<T> {
    entries: Vec<T>,
    watermark: usize,
}

impl<T> Default for DiscoveryQueue<T> {
    #[inline(always)]
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            watermark: 0,
        }
    }
}

impl<T: PartialEq> DiscoveryQueue<T> {
    /// Registers an entity, returning its index within the queue.
    ///
    /// Registration is idempotent: if the entity already appears anywhere in
    /// the queue, its existing index is returned and the queue does not
    /// grow.
    pub fn register(&mut self, entry: T) -> usize {
        for (index, present) in self.entries.iter().enumerate() {
            if present == &entry {
                return index;
            }
        }

        self.entries.push(entry);

        self.entries.len() - 1
    }
}

impl<T> DiscoveryQueue<T> {
    /// The tentative region registered since the last commit. Previewing
    /// does not change the queue and is repeatable.
    #[inline(always)]
    pub fn peek(&self) -> &[T] {
        &self.entries[self.watermark..]
    }

    /// Yields the tentative region and commits it, emptying the tentative
    /// tail.
    #[inline(always)]
    pub fn visit(&mut self) -> &[T] {
        let from = replace(&mut self.watermark, self.entries.len());

        &self.entries[from..]
    }

    /// Discards everything registered since the last commit.
    ///
    /// Rewinding cannot undo previously committed entries: this is a
    /// single-batch-at-a-time discipline, not a full undo history.
    #[inline(always)]
    pub fn rewind(&mut self) {
        self.entries.truncate(self.watermark);
    }

    /// Returns true if the queue has no tentative entries.
    #[inline(always)]
    pub fn is_processed(&self) -> bool {
        self.watermark == self.entries.len()
    }

    /// The total number of entries, committed and tentative.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the queue holds no entries at all.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The current commit watermark.
    #[inline(always)]
    pub fn watermark(&self) -> usize {
        self.watermark
    }
}

/// The four discovery queues of a compile session: procedures, globals,
/// thread-locals, and complex constants. Each queue is independent.
///
/// The external reachability pass mutates this object through the
/// registration functions while walking the intermediate form.
#[derive(Debug, Default)]
pub struct DiscoveryData {
    pub(crate) procs: DiscoveryQueue<Symbol>,
    pub(crate) globals: DiscoveryQueue<Symbol>,
    pub(crate) thread_locals: DiscoveryQueue<Symbol>,
    pub(crate) consts: DiscoveryQueue<Symbol>,
}

impl DiscoveryData {
    /// Registers a referenced procedure, returning its queue index.
    #[inline(always)]
    pub fn register_proc(&mut self, sym: Symbol) -> usize {
        self.procs.register(sym)
    }

    /// Registers a discovered global, returning its queue index.
    #[inline(always)]
    pub fn register_global(&mut self, sym: Symbol) -> usize {
        self.globals.register(sym)
    }

    /// Registers a discovered thread-local, returning its queue index.
    #[inline(always)]
    pub fn register_thread_local(&mut self, sym: Symbol) -> usize {
        self.thread_locals.register(sym)
    }

    /// Registers a referenced complex constant, returning its queue index.
    #[inline(always)]
    pub fn register_const(&mut self, sym: Symbol) -> usize {
        self.consts.register(sym)
    }

    /// Discards the tentative batches of all four queues.
    pub(crate) fn rewind(&mut self) {
        self.procs.rewind();
        self.globals.rewind();
        self.thread_locals.rewind();
        self.consts.rewind();
    }

    /// Returns true if no queue has tentative entries.
    pub(crate) fn is_processed(&self) -> bool {
        self.procs.is_processed()
            && self.globals.is_processed()
            && self.thread_locals.is_processed()
            && self.consts.is_processed()
    }
}

/// Controls what happens to a storage-introducing definition once its entity
/// is registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DefsPolicy {
    /// Rewrite the definition in place into a plain assignment. The storage
    /// is externally allocated now, and leaving the original definition
    /// would allocate it twice.
    Rewrite,

    /// Only annotate the definition for later resolution. Required wherever
    /// rewriting could change evaluation order or is premature.
    Annotate,
}

/// Scans the lowered intermediate form for definitions that introduce global
/// or thread-local storage, and registers the found entities with the
/// discovery queues.
///
/// Definitions of externally linked (imported) declarations are skipped:
/// they resolve by name at run time, not by slot, and an unresolved
/// reference is reported later by the generator. A definition introduced by
/// variable hoisting is resolved back to its original owning entity before
/// registration.
pub(crate) fn collect_defs(node: &mut IrNode, data: &mut DiscoveryData, policy: DefsPolicy) {
    match node {
        IrNode::Nop => (),

        IrNode::Scope(inner) => collect_defs(inner, data, policy),

        IrNode::Block(items) => {
            for item in items {
                collect_defs(item, data, policy);
            }
        }

        IrNode::VarDef { .. } => {
            let owner = {
                let IrNode::VarDef { sym, init, .. } = node else {
                    system_panic!("Definition node changed shape during the scan.");
                };

                collect_defs(init, data, policy);

                sym.canonical().clone()
            };

            if owner.is_imported() {
                return;
            }

            match owner.kind() {
                SymbolKind::Global => {
                    let _ = data.globals.register(owner.clone());
                }

                SymbolKind::ThreadLocal => {
                    let _ = data.thread_locals.register(owner.clone());
                }

                _ => return,
            }

            match policy {
                DefsPolicy::Annotate => {
                    let IrNode::VarDef { sym, linked, .. } = node else {
                        system_panic!("Definition node changed shape during the scan.");
                    };

                    *sym = owner;
                    *linked = true;
                }

                DefsPolicy::Rewrite => {
                    let IrNode::VarDef { init, origin, .. } = replace(node, IrNode::Nop) else {
                        system_panic!("Definition node changed shape during rewriting.");
                    };

                    *node = IrNode::Assign {
                        target: owner,
                        value: init,
                        origin,
                    };
                }
            }
        }

        IrNode::Assign { value, .. } => collect_defs(value, data, policy),

        IrNode::Use { .. } => (),

        IrNode::Call { args, .. } => {
            for arg in args {
                collect_defs(arg, data, policy);
            }
        }

        IrNode::Lit { .. } => (),
    }
}
