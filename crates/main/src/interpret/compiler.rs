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
use log::trace;

use crate::{
    interpret::{
        assembly::NOT_GENERATED,
        jit::{CodeGen, CompiledFrame, ScriptJit},
        linker::{CallbackIndex, ScriptCallback, SlotIndex},
    },
    report::system_panic,
    semantics::{GenResult, Lowering, Symbol},
};

impl ScriptJit {
    /// Ensures that the procedure has a function-table slot, creating one if
    /// absent. Returns the slot index.
    ///
    /// This function never generates bytecode: a freshly created entry's
    /// start offset is the [NOT_GENERATED] sentinel until the procedure is
    /// compiled on demand.
    pub fn register_proc(&mut self, sym: &Symbol) -> SlotIndex {
        if let Some(slot) = self.linker.slot_of(sym) {
            // A mapping pointing beyond the function table is a stale
            // leftover of a failed generation call.
            if slot < self.env.functions.len() {
                return slot;
            }
        }

        if !self.discovery.is_processed() {
            system_panic!("Procedure registration during an active generation call.");
        }

        let _ = self.discovery.procs.register(sym.clone());

        self.link_tentative();
        self.commit();

        let Some(slot) = self.linker.slot_of(sym) else {
            system_panic!("Procedure registration left no linked slot.");
        };

        slot
    }

    /// Returns true if the procedure has a function-table slot and its
    /// bytecode has been generated.
    pub fn is_available(&self, sym: &Symbol) -> bool {
        let Some(slot) = self.linker.slot_of(sym) else {
            return false;
        };

        let Some(entry) = self.env.functions.get(slot) else {
            return false;
        };

        entry.start != NOT_GENERATED
    }

    /// The demand-driven procedure entry point.
    ///
    /// Ensures that the procedure has a function-table slot, and compiles
    /// the procedure's bytecode if it has not been generated yet.
    ///
    /// If the procedure's fully qualified name matches a registered
    /// [callback override](Self::register_callback), no bytecode is
    /// generated: the virtual machine routes invocations to the callback,
    /// and the returned frame's start offset remains the [NOT_GENERATED]
    /// sentinel.
    pub fn load_proc(
        &mut self,
        front: &mut dyn Lowering,
        gen: &mut dyn CodeGen,
        sym: &Symbol,
    ) -> GenResult<CompiledFrame> {
        let slot = self.register_proc(sym);

        let Some(entry) = self.env.functions.get(slot) else {
            system_panic!("Registered procedure without a function-table entry.");
        };

        if entry.callback.is_some() {
            return Ok(CompiledFrame {
                start: NOT_GENERATED,
                registers: 0,
            });
        }

        if entry.start != NOT_GENERATED {
            return Ok(CompiledFrame {
                start: entry.start,
                registers: entry.registers,
            });
        }

        trace!("Demand compilation of {}.", sym.path());

        self.compile(front, gen, slot)
    }

    /// Generates the bytecode of the function-table slot and patches the
    /// entry's start offset and register count.
    ///
    /// This function must be invoked at most once per slot. Invoking it on a
    /// slot whose bytecode is already generated is a caller contract
    /// violation and aborts the process; it is never reported as a
    /// recoverable error.
    pub fn compile(
        &mut self,
        front: &mut dyn Lowering,
        gen: &mut dyn CodeGen,
        slot: SlotIndex,
    ) -> GenResult<CompiledFrame> {
        let Some(entry) = self.env.functions.get(slot) else {
            system_panic!("Compilation of unregistered function slot {slot}.");
        };

        if entry.start != NOT_GENERATED {
            system_panic!("Function slot {slot} compiled twice.");
        }

        let sym = entry.sym.clone();

        let frame = self.gen_proc(front, gen, &sym)?;

        let Some(entry) = self.env.functions.get_mut(slot) else {
            system_panic!("Function table shrunk during compilation.");
        };

        entry.start = frame.start;
        entry.registers = frame.registers;

        Ok(frame)
    }

    /// Appends a native callback override.
    ///
    /// When a procedure whose fully qualified name matches `pattern` is
    /// demanded, the virtual machine invokes `callback` in place of
    /// interpreted bytecode. The pattern is either an exact fully qualified
    /// name or a name prefix followed by a `.*` tail.
    ///
    /// Patterns need not be unique; the first registered matching pattern
    /// wins.
    pub fn register_callback(
        &mut self,
        pattern: impl Into<CompactString>,
        callback: ScriptCallback,
    ) -> CallbackIndex {
        self.linker.register_callback(pattern, callback)
    }

    /// Resolves the callback override of the fully qualified name `path`.
    #[inline(always)]
    pub fn callback_of(&self, path: &str) -> Option<CallbackIndex> {
        self.linker.callback_of(path)
    }

    /// Returns the callback registered under `index`.
    #[inline(always)]
    pub fn callback(&self, index: CallbackIndex) -> Option<&ScriptCallback> {
        self.linker.callback(index)
    }
}
