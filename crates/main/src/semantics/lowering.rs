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
    error::Error as StdError,
    fmt::{Display, Formatter},
    result::Result as StdResult,
};

use compact_str::CompactString;

use crate::{
    interpret::DiscoveryData,
    runtime::{ModuleId, Origin},
    semantics::{Body, IrNode, NodeRef, PositionMap, Symbol},
};

/// A result of a code generation request, which can either be a normal value
/// or a [GenError].
pub type GenResult<T> = StdResult<T, GenError>;

/// A recoverable failure of lowering or bytecode generation.
///
/// Every generation entry point pairs a GenError with a full rewind of the
/// discovery queues, leaving the compile session exactly as it was before
/// the call. The subsystem performs no logging or user-facing reporting of
/// these errors itself; the caller decides whether to surface a diagnostic
/// or abort.
///
/// GenErrors are unrelated to [runtime
/// faults](crate::runtime::RuntimeError), which are raised only while
/// executing already generated code.
#[derive(Clone, Debug)]
pub enum GenError {
    /// The generator does not support the requested construct.
    Unsupported {
        /// The source code range of the construct.
        origin: Origin,

        /// A short description of the construct.
        construct: CompactString,
    },

    /// The unit requires more registers than a single frame provides.
    FrameLimit {
        /// The source code range of the unit.
        origin: Origin,

        /// The frame register limit.
        limit: usize,
    },

    /// The lowered form is semantically inconsistent.
    Inconsistent {
        /// The source code range of the inconsistency.
        origin: Origin,

        /// A short description of the inconsistency.
        details: CompactString,
    },
}

impl Display for GenError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported { construct, .. } => {
                formatter.write_fmt(format_args!("unsupported construct: {construct}"))
            }

            Self::FrameLimit { limit, .. } => formatter.write_fmt(format_args!(
                "the unit requires more than {limit} frame registers",
            )),

            Self::Inconsistent { details, .. } => {
                formatter.write_fmt(format_args!("inconsistent intermediate form: {details}"))
            }
        }
    }
}

impl StdError for GenError {}

impl GenError {
    /// The source code range this error refers to.
    #[inline(always)]
    pub fn origin(&self) -> &Origin {
        match self {
            Self::Unsupported { origin, .. } => origin,
            Self::FrameLimit { origin, .. } => origin,
            Self::Inconsistent { origin, .. } => origin,
        }
    }
}

/// A compilation back end targeted by the pass pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// The script virtual machine. The generation subsystem always targets
    /// this back end.
    Vm,

    /// The ahead-of-time native back end, living outside of this crate.
    Native,
}

/// The entity on whose behalf the pass pipeline runs.
#[derive(Clone, Copy, Debug)]
pub enum PassOwner<'a> {
    /// A top-level statement or expression of a module.
    Module(ModuleId),

    /// The body of a procedure.
    Proc(&'a Symbol),
}

/// Metadata of a single module within the [ModuleGraph].
#[derive(Clone, Debug)]
pub struct ModuleMeta {
    pub id: ModuleId,
    pub name: CompactString,
}

/// The front end's program graph.
///
/// The graph is owned by the compile session and is read-only to the
/// bytecode generator during the execution-context handoff.
#[derive(Clone, Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<ModuleMeta>,
}

impl ModuleGraph {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module, returning its session-wide identifier.
    pub fn add_module(&mut self, name: impl Into<CompactString>) -> ModuleId {
        let id = ModuleId::new(self.modules.len());

        self.modules.push(ModuleMeta {
            id,
            name: name.into(),
        });

        id
    }

    /// Resolves a module's metadata.
    #[inline(always)]
    pub fn meta(&self, id: ModuleId) -> Option<&ModuleMeta> {
        self.modules.get(id.into_inner())
    }

    /// The number of registered modules.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if no modules were registered.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// The script front end, as seen by the generation subsystem.
///
/// Parsing, semantic analysis, the optimization pass pipeline, and the
/// lowering into the generator's control-flow input form all live outside of
/// this crate; the [generation
/// orchestrator](crate::interpret::ScriptJit) drives them through this seam.
pub trait Lowering {
    /// Lowers the requested unit into the intermediate form, producing the
    /// tree and an auxiliary position table.
    fn lower(&mut self, unit: &NodeRef) -> GenResult<(IrNode, PositionMap)>;

    /// Lowers a procedure's already transformed body.
    ///
    /// This transformation may be expensive; the orchestrator caches its
    /// results for compile-time-only procedures when the session
    /// configuration permits.
    fn transform_proc(&mut self, proc: &Symbol) -> GenResult<(IrNode, PositionMap)>;

    /// Runs the optimization and lowering pass pipeline over the tree,
    /// targeted at `backend`.
    fn apply_passes(
        &mut self,
        tree: &mut IrNode,
        positions: &mut PositionMap,
        owner: PassOwner,
        backend: Backend,
    ) -> GenResult<()>;

    /// Walks the tree and registers every transitively referenced procedure
    /// and constant with the discovery queues, seeded by the `retained`
    /// allow-list of built-in procedures.
    fn discover_reachable(
        &mut self,
        retained: &[&str],
        tree: &IrNode,
        discovery: &mut DiscoveryData,
    ) -> GenResult<()>;

    /// Lowers the fully transformed tree into the bytecode generator's
    /// control-flow input form.
    fn lower_to_backend(&mut self, tree: IrNode, positions: PositionMap) -> GenResult<Body>;
}
