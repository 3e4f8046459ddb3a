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
    interpret::{
        assembly::{Cmd, CmdIndex, EndCmd, NOT_GENERATED},
        linker::CallbackIndex,
    },
    report::system_panic,
    runtime::{Cell, Origin},
    semantics::Symbol,
};

/// An entry of the execution environment's function table.
///
/// The entry is created when a procedure is first registered, with the start
/// offset set to the [NOT_GENERATED] sentinel; the demand-driven compiler
/// patches the start offset and the register count when the procedure's
/// bytecode is generated.
#[derive(Clone, Debug)]
pub struct FunctionEntry {
    pub(crate) sym: Symbol,
    pub(crate) start: CmdIndex,
    pub(crate) registers: usize,
    pub(crate) callback: Option<CallbackIndex>,
}

impl FunctionEntry {
    #[inline(always)]
    pub(crate) fn new(sym: Symbol, callback: Option<CallbackIndex>) -> Self {
        Self {
            sym,
            start: NOT_GENERATED,
            registers: 0,
            callback,
        }
    }

    /// The identity of the owning procedure.
    #[inline(always)]
    pub fn sym(&self) -> &Symbol {
        &self.sym
    }

    /// The code buffer offset where the procedure's bytecode starts, or
    /// [NOT_GENERATED] if the bytecode has not been generated yet.
    #[inline(always)]
    pub fn start(&self) -> CmdIndex {
        self.start
    }

    /// The number of frame registers the procedure requires.
    #[inline(always)]
    pub fn registers(&self) -> usize {
        self.registers
    }

    /// The native callback override routed to this procedure, if any.
    #[inline(always)]
    pub fn callback(&self) -> Option<CallbackIndex> {
        self.callback
    }

    /// Returns true if the procedure's bytecode has been generated.
    #[inline(always)]
    pub fn is_generated(&self) -> bool {
        self.start != NOT_GENERATED
    }
}

/// The execution environment of a compile session: the function table, the
/// global/thread-local storage array, the constant storage array, and the
/// append-only code buffer with its parallel debug sequence.
///
/// The environment grows monotonically. Slots are never freed or reused,
/// and the storage arrays grow only inside the commit step of a successful
/// generation call.
///
/// Outside of an in-progress generation call, the code buffer's last
/// instruction is always an [End](Cmd::End) boundary marker, and the debug
/// sequence's length equals the code buffer's length.
pub struct Environment {
    pub(crate) functions: Vec<FunctionEntry>,
    pub(crate) data: Vec<Cell>,
    pub(crate) consts: Vec<Cell>,
    pub(crate) code: Vec<Cmd>,
    pub(crate) debug: Vec<Origin>,
}

impl Default for Environment {
    #[inline(always)]
    fn default() -> Self {
        Self {
            functions: Vec::new(),
            data: Vec::new(),
            consts: Vec::new(),
            code: vec![Cmd::End(EndCmd)],
            debug: vec![Origin::nil()],
        }
    }
}

impl Environment {
    /// Prepares the code buffer for a new generation call: if the last
    /// instruction is a boundary marker, removes it, so the new unit's code
    /// is appended contiguously.
    ///
    /// Abandoned bytecode of a previously failed call is not removed; it is
    /// inert, because nothing points at it.
    pub(crate) fn open(&mut self) {
        self.check_sync();

        if let Some(Cmd::End(..)) = self.code.last() {
            let _ = self.code.pop();
            let _ = self.debug.pop();
        }
    }

    /// Appends a fresh boundary marker after a generation call, on both
    /// success and failure.
    pub(crate) fn seal(&mut self) {
        self.code.push(Cmd::End(EndCmd));
        self.debug.push(Origin::nil());

        self.check_sync();
    }

    fn check_sync(&self) {
        if self.code.len() != self.debug.len() {
            system_panic!(
                "Code and debug sequences length mismatch: {} versus {}.",
                self.code.len(),
                self.debug.len(),
            );
        }
    }
}
