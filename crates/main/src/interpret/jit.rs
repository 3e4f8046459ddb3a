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
    mem::take,
};

use ahash::{AHashMap, AHashSet};
use compact_str::CompactString;

use crate::{
    interpret::{
        assembly::{Cmd, CmdIndex},
        discovery::{collect_defs, DefsPolicy, DiscoveryData},
        environment::{Environment, FunctionEntry},
        linker::{LinkerTable, SlotIndex},
    },
    report::system_panic,
    runtime::{Cell, ModuleId, Origin, RttiCache, RttiEntry, TypeCache, TypeIndex, TypeMeta},
    semantics::{
        Backend,
        Body,
        GenResult,
        IrNode,
        Lowering,
        ModuleGraph,
        NodeRef,
        PassOwner,
        PositionMap,
        Symbol,
    },
};

/// Built-in procedures that the transitive reachability discovery always
/// retains, regardless of whether the requested unit references them
/// directly.
pub const RETAINED_BUILTINS: &[&str] = &["core.panic", "core.print", "core.typeof"];

/// The mode a compile session evaluates script code in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EvalMode {
    /// Ordinary compile-time evaluation or script execution.
    #[default]
    Evaluation,

    /// Code analysis and editor suggestion mode. In this mode, the session
    /// never reuses cached procedure bodies.
    Analysis,
}

/// The configuration of a compile session.
///
/// The configuration is read-only to the bytecode generator during the
/// execution-context handoff.
#[derive(Clone, Debug, Default)]
pub struct JitConfig {
    /// The session's evaluation mode.
    pub mode: EvalMode,

    /// The set of language features enabled for the session.
    pub features: AHashSet<CompactString>,

    /// Enables reuse of transformed procedure bodies across generation
    /// calls. The cache is an optimization only; it affects nothing
    /// observable besides the number of front end transformations.
    pub cache_bodies: bool,
}

/// The start offset and the frame register count of a successfully generated
/// unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompiledFrame {
    /// The code buffer offset where the unit's bytecode starts.
    pub start: CmdIndex,

    /// The number of frame registers the unit requires.
    pub registers: usize,
}

/// The bytecode generator back end, as seen by the generation orchestrator.
///
/// The generator lives outside of this crate. It receives the unit's
/// control-flow form together with the [GenContext] lending it the mutable
/// fields of the execution environment, and either appends the unit's
/// bytecode or fails with a recoverable error.
pub trait CodeGen {
    /// Generates the unit's bytecode into the handed-off context.
    ///
    /// Returns the number of frame registers the unit requires. The
    /// orchestrator records the unit's start offset itself.
    fn generate(&mut self, ctx: &mut GenContext, body: &Body) -> GenResult<usize>;
}

/// The execution context lent to the bytecode generator for the duration of
/// one generation call.
///
/// Ownership of the shared fields is transferred out of the session
/// immediately before the generator's invocation and transferred back
/// immediately after, guaranteeing exactly one owner at any instant: the
/// generator mutates freely without synchronization.
///
/// The code buffer, the debug sequence, the constant storage, and the two
/// type caches are mutable through this context; the program graph, the
/// configuration, the current module, and the linker table are read-only.
pub struct GenContext {
    graph: ModuleGraph,
    config: JitConfig,
    module: ModuleId,
    linker: LinkerTable,
    code: Vec<Cmd>,
    debug: Vec<Origin>,
    consts: Vec<Cell>,
    types: TypeCache,
    rtti: RttiCache,
}

impl GenContext {
    fn handoff(jit: &mut ScriptJit) -> Self {
        Self {
            graph: take(&mut jit.graph),
            config: take(&mut jit.config),
            module: jit.module,
            linker: take(&mut jit.linker),
            code: take(&mut jit.env.code),
            debug: take(&mut jit.env.debug),
            consts: take(&mut jit.env.consts),
            types: take(&mut jit.types),
            rtti: take(&mut jit.rtti),
        }
    }

    fn restore(self, jit: &mut ScriptJit) {
        jit.graph = self.graph;
        jit.config = self.config;
        jit.linker = self.linker;
        jit.env.code = self.code;
        jit.env.debug = self.debug;
        jit.env.consts = self.consts;
        jit.types = self.types;
        jit.rtti = self.rtti;
    }

    /// Appends a command together with its debug origin, preserving the
    /// code/debug lockstep. Returns the command's index.
    #[inline(always)]
    pub fn emit(&mut self, cmd: Cmd, origin: Origin) -> CmdIndex {
        self.code.push(cmd);
        self.debug.push(origin);

        self.code.len() - 1
    }

    /// Replaces an already emitted command in place, leaving its debug
    /// origin intact. The generator uses this function to patch forward
    /// jumps.
    pub fn patch(&mut self, index: CmdIndex, cmd: Cmd) {
        let Some(slot) = self.code.get_mut(index) else {
            system_panic!("Patching command {index} beyond the code buffer.");
        };

        *slot = cmd;
    }

    /// The current length of the code buffer.
    #[inline(always)]
    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    /// Resolves the slot index assigned to `sym` by the linker table.
    #[inline(always)]
    pub fn slot_of(&self, sym: &Symbol) -> Option<SlotIndex> {
        self.linker.slot_of(sym)
    }

    /// Reads a committed constant storage cell.
    #[inline(always)]
    pub fn const_cell(&self, slot: SlotIndex) -> Option<&Cell> {
        self.consts.get(slot)
    }

    /// The front end's program graph.
    #[inline(always)]
    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    /// The session configuration.
    #[inline(always)]
    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    /// The module the requested unit belongs to.
    #[inline(always)]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Interns type metadata into the session's type-info cache.
    #[inline(always)]
    pub fn intern_type(&mut self, meta: TypeMeta) -> TypeIndex {
        self.types.intern(meta)
    }

    /// Resolves the runtime type info of an interned type.
    pub fn rtti_of(&mut self, index: TypeIndex) -> RttiEntry {
        let Some(meta) = self.types.get(index) else {
            system_panic!("Runtime type info request for a type that was not interned.");
        };

        self.rtti.resolve(index, meta)
    }
}

// The per-entry-point shape of a generation request.
enum GenRequest<'a> {
    Stmt(&'a NodeRef),
    Expr(&'a NodeRef),
    Proc(&'a Symbol),
}

/// The just-in-time compilation state of one compile session.
///
/// ScriptJit is created once per session and threaded explicitly through
/// every call; the subsystem never keeps process-wide state. It owns the
/// [execution environment](crate::interpret::Environment), the discovery
/// queues, the linker table, and the type caches.
///
/// ## Entry points
///
/// The [gen_stmt](Self::gen_stmt) and [gen_expr](Self::gen_expr) functions
/// compile one-off top-level code for the compile-time evaluation and
/// scripting front ends. The [load_proc](Self::load_proc) function is the
/// demand-driven procedure entry point of the virtual machine.
///
/// Each generation call either completes and commits, or fails and fully
/// rewinds: a failed call leaves zero observable trace in the environment,
/// while a successful one atomically grows the environment tables in a
/// fixed, interdependent order.
///
/// ## Single-writer discipline
///
/// Execution is strictly single-threaded and synchronous. Generation calls
/// never overlap: one must finish (commit or rewind) before the next begins,
/// because the execution-context handoff and the tentative discovery batch
/// are valid for exactly one call at a time.
pub struct ScriptJit {
    pub(crate) env: Environment,
    pub(crate) discovery: DiscoveryData,
    pub(crate) linker: LinkerTable,
    config: JitConfig,
    graph: ModuleGraph,
    module: ModuleId,
    types: TypeCache,
    rtti: RttiCache,
    bodies: AHashMap<Symbol, (IrNode, PositionMap)>,
}

impl Debug for ScriptJit {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ScriptJit")
            .field("module", &self.module)
            .field("functions", &self.env.functions.len())
            .field("data", &self.env.data.len())
            .field("consts", &self.env.consts.len())
            .field("code", &self.env.code.len())
            .finish_non_exhaustive()
    }
}

impl ScriptJit {
    /// Creates the compile session state.
    pub fn new(graph: ModuleGraph, module: ModuleId, config: JitConfig) -> Self {
        Self {
            env: Environment::default(),
            discovery: DiscoveryData::default(),
            linker: LinkerTable::default(),
            config,
            graph,
            module,
            types: TypeCache::default(),
            rtti: RttiCache::default(),
            bodies: AHashMap::new(),
        }
    }

    /// Compiles a top-level statement.
    ///
    /// The statement is wrapped into an explicit scope fragment during
    /// lowering, and discovered global definitions are rewritten into plain
    /// assignments, because their storage is allocated in the environment.
    ///
    /// On success, returns the unit's start offset and frame register count.
    /// On failure, the compile session is left exactly as it was before the
    /// call, except for inert abandoned bytecode.
    pub fn gen_stmt(
        &mut self,
        front: &mut dyn Lowering,
        gen: &mut dyn CodeGen,
        unit: &NodeRef,
    ) -> GenResult<CompiledFrame> {
        self.generate_unit(front, gen, GenRequest::Stmt(unit))
    }

    /// Compiles a top-level expression.
    ///
    /// Unlike [gen_stmt](Self::gen_stmt), the unit is not wrapped into a
    /// scope fragment, and discovered global definitions are only annotated,
    /// never rewritten: expression contexts may define globals inside nested
    /// blocks where rewriting could alter the evaluation order.
    pub fn gen_expr(
        &mut self,
        front: &mut dyn Lowering,
        gen: &mut dyn CodeGen,
        unit: &NodeRef,
    ) -> GenResult<CompiledFrame> {
        self.generate_unit(front, gen, GenRequest::Expr(unit))
    }

    /// Compiles a procedure's body.
    ///
    /// This is the raw generation entry point: it does not create or patch
    /// the procedure's function-table entry. Use
    /// [load_proc](Self::load_proc) for demand-driven compilation.
    pub fn gen_proc(
        &mut self,
        front: &mut dyn Lowering,
        gen: &mut dyn CodeGen,
        sym: &Symbol,
    ) -> GenResult<CompiledFrame> {
        self.generate_unit(front, gen, GenRequest::Proc(sym))
    }

    /// The function table, indexed by [SlotIndex].
    #[inline(always)]
    pub fn functions(&self) -> &[FunctionEntry] {
        &self.env.functions
    }

    /// The global/thread-local storage array, indexed by [SlotIndex].
    #[inline(always)]
    pub fn data(&self) -> &[Cell] {
        &self.env.data
    }

    /// Mutable access to the global/thread-local storage cells for the
    /// executing virtual machine. The array itself grows only inside the
    /// commit step.
    #[inline(always)]
    pub fn data_mut(&mut self) -> &mut [Cell] {
        &mut self.env.data
    }

    /// The constant storage array, indexed by [SlotIndex].
    #[inline(always)]
    pub fn consts(&self) -> &[Cell] {
        &self.env.consts
    }

    /// The code buffer. Outside of an in-progress generation call, the last
    /// instruction is always an [End](Cmd::End) boundary marker.
    #[inline(always)]
    pub fn code(&self) -> &[Cmd] {
        &self.env.code
    }

    /// The debug sequence, parallel to the [code buffer](Self::code).
    #[inline(always)]
    pub fn debug(&self) -> &[Origin] {
        &self.env.debug
    }

    /// The session configuration.
    #[inline(always)]
    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    /// The module on whose behalf top-level units are compiled.
    #[inline(always)]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// The front end's program graph.
    #[inline(always)]
    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    // The shared protocol of the three generation entry points.
    //
    // A failed call must leave zero observable trace: whatever step fails,
    // the discovery queues are fully rewound, and the code buffer boundary
    // is restored.
    fn generate_unit(
        &mut self,
        front: &mut dyn Lowering,
        gen: &mut dyn CodeGen,
        request: GenRequest,
    ) -> GenResult<CompiledFrame> {
        self.env.open();

        let result = self.generate_unit_inner(front, gen, request);

        match &result {
            Ok(..) => self.commit(),
            Err(..) => self.discovery.rewind(),
        }

        self.env.seal();

        result
    }

    fn generate_unit_inner(
        &mut self,
        front: &mut dyn Lowering,
        gen: &mut dyn CodeGen,
        request: GenRequest,
    ) -> GenResult<CompiledFrame> {
        let (mut tree, mut positions, policy, owner) = match request {
            GenRequest::Stmt(unit) => {
                let (tree, positions) = front.lower(unit)?;

                (
                    IrNode::Scope(Box::new(tree)),
                    positions,
                    DefsPolicy::Rewrite,
                    PassOwner::Module(self.module),
                )
            }

            GenRequest::Expr(unit) => {
                let (tree, positions) = front.lower(unit)?;

                (
                    tree,
                    positions,
                    DefsPolicy::Annotate,
                    PassOwner::Module(self.module),
                )
            }

            GenRequest::Proc(sym) => {
                let (tree, positions) = self.proc_body(front, sym)?;

                (tree, positions, DefsPolicy::Annotate, PassOwner::Proc(sym))
            }
        };

        collect_defs(&mut tree, &mut self.discovery, policy);

        front.apply_passes(&mut tree, &mut positions, owner, Backend::Vm)?;

        front.discover_reachable(RETAINED_BUILTINS, &tree, &mut self.discovery)?;

        self.link_tentative();

        let body = front.lower_to_backend(tree, positions)?;

        let start = self.env.code.len();

        let mut ctx = GenContext::handoff(self);

        let result = gen.generate(&mut ctx, &body);

        ctx.restore(self);

        let registers = result?;

        Ok(CompiledFrame { start, registers })
    }

    // Assigns a tentative linker slot to every entity newly present in the
    // discovery queues, in the fixed order: procedures, constants, globals,
    // thread-locals.
    //
    // Globals are indexed strictly before thread-locals: the commit step
    // allocates the shared data storage in the same order, and a mismatch
    // would desynchronize the indices.
    //
    // The indexing happens before the entities are committed, so the code
    // being generated right now can already refer to them by stable index.
    pub(crate) fn link_tentative(&mut self) {
        let mut next = self.env.functions.len();

        for sym in self.discovery.procs.peek() {
            self.linker.bind(sym.clone(), next);

            next += 1;
        }

        let mut next = self.env.consts.len();

        for sym in self.discovery.consts.peek() {
            self.linker.bind(sym.clone(), next);

            next += 1;
        }

        let mut next = self.env.data.len();

        for sym in self.discovery.globals.peek() {
            self.linker.bind(sym.clone(), next);

            next += 1;
        }

        for sym in self.discovery.thread_locals.peek() {
            self.linker.bind(sym.clone(), next);

            next += 1;
        }
    }

    // Materializes environment storage for the entities committed by a
    // successful generation call. This is the only place the environment
    // tables grow; discovery and linking are non-committing previews.
    pub(crate) fn commit(&mut self) {
        for sym in self.discovery.procs.visit() {
            let callback = self.linker.callback_of(sym.path());

            self.env
                .functions
                .push(FunctionEntry::new(sym.clone(), callback));
        }

        for sym in self.discovery.globals.visit() {
            self.env.data.push(Cell::of_type(sym.ty()));
        }

        for sym in self.discovery.thread_locals.visit() {
            self.env.data.push(Cell::of_type(sym.ty()));
        }

        for sym in self.discovery.consts.visit() {
            let Some(value) = sym.value() else {
                system_panic!("Complex constant {} without a compile-time value.", sym.path());
            };

            self.env.consts.push(Cell::serialize(value));
        }
    }

    // Lowers a procedure's already transformed body, reusing the session
    // cache when the procedure is a compile-time-only routine processed
    // outside of the analysis mode.
    fn proc_body(
        &mut self,
        front: &mut dyn Lowering,
        sym: &Symbol,
    ) -> GenResult<(IrNode, PositionMap)> {
        let cacheable = self.config.cache_bodies
            && sym.is_compile_time()
            && self.config.mode != EvalMode::Analysis;

        if cacheable {
            if let Some(cached) = self.bodies.get(sym) {
                return Ok(cached.clone());
            }
        }

        let lowered = front.transform_proc(sym)?;

        if cacheable {
            let _ = self.bodies.insert(sym.clone(), lowered.clone());
        }

        Ok(lowered)
    }
}
