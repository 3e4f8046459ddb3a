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

use std::sync::Arc;

use ahash::AHashMap;

use crate::{
    interpret::{
        CallCmd,
        Cmd,
        CodeGen,
        DiscoveryData,
        EvalMode,
        GenContext,
        JitConfig,
        LdConstCmd,
        LdDataCmd,
        LdImmCmd,
        Register,
        ScriptJit,
        StDataCmd,
        NOT_GENERATED,
    },
    runtime::{Cell, Origin, TypeMeta},
    semantics::{
        Backend,
        Body,
        ConstValue,
        GenError,
        GenResult,
        IrNode,
        Lowering,
        ModuleGraph,
        NodeRef,
        PassOwner,
        PositionMap,
        Symbol,
        SymbolDecl,
        SymbolKind,
    },
};

fn jit() -> ScriptJit {
    let mut graph = ModuleGraph::new();

    let module = graph.add_module("test");

    ScriptJit::new(graph, module, JitConfig::default())
}

fn global(name: &str) -> Symbol {
    Symbol::declare(SymbolDecl {
        kind: SymbolKind::Global,
        name: name.into(),
        path: name.into(),
        ty: TypeMeta::Usize,
        ..Default::default()
    })
}

fn thread_local(name: &str) -> Symbol {
    Symbol::declare(SymbolDecl {
        kind: SymbolKind::ThreadLocal,
        name: name.into(),
        path: name.into(),
        ty: TypeMeta::Str,
        ..Default::default()
    })
}

fn proc_sym(path: &str) -> Symbol {
    Symbol::declare(SymbolDecl {
        kind: SymbolKind::Procedure,
        name: path.rsplit('.').next().unwrap_or(path).into(),
        path: path.into(),
        ty: TypeMeta::Function,
        ..Default::default()
    })
}

fn comptime_proc(path: &str) -> Symbol {
    Symbol::declare(SymbolDecl {
        kind: SymbolKind::Procedure,
        name: path.into(),
        path: path.into(),
        ty: TypeMeta::Function,
        compile_time: true,
        ..Default::default()
    })
}

fn complex_const(name: &str, value: ConstValue) -> Symbol {
    Symbol::declare(SymbolDecl {
        kind: SymbolKind::Const,
        name: name.into(),
        path: name.into(),
        ty: TypeMeta::Array(Box::new(TypeMeta::Isize)),
        value: Some(value),
        ..Default::default()
    })
}

fn def(sym: &Symbol, value: i64) -> IrNode {
    IrNode::VarDef {
        sym: sym.clone(),
        init: Box::new(IrNode::Lit {
            value: ConstValue::Int(value),
            origin: 0,
        }),
        origin: 0,
        linked: false,
    }
}

// A front end stub resolving units and procedure bodies from prepared trees.
#[derive(Default)]
struct TestFrontend {
    units: Vec<(IrNode, PositionMap)>,
    procs: AHashMap<Symbol, (IrNode, PositionMap)>,
    transforms: usize,
}

impl TestFrontend {
    fn add_unit(&mut self, tree: IrNode) -> NodeRef {
        let mut positions = PositionMap::new();

        let _ = positions.push(Origin::nil());

        self.units.push((tree, positions));

        NodeRef::new(self.units.len() - 1)
    }

    fn add_proc(&mut self, sym: &Symbol, body: IrNode) {
        let mut positions = PositionMap::new();

        let _ = positions.push(Origin::nil());

        let _ = self.procs.insert(sym.clone(), (body, positions));
    }
}

impl Lowering for TestFrontend {
    fn lower(&mut self, unit: &NodeRef) -> GenResult<(IrNode, PositionMap)> {
        let Some(found) = self.units.get(unit.id()) else {
            return Err(GenError::Inconsistent {
                origin: Origin::nil(),
                details: "unknown unit".into(),
            });
        };

        Ok(found.clone())
    }

    fn transform_proc(&mut self, proc: &Symbol) -> GenResult<(IrNode, PositionMap)> {
        self.transforms += 1;

        let Some(found) = self.procs.get(proc) else {
            return Err(GenError::Inconsistent {
                origin: Origin::nil(),
                details: "unknown procedure".into(),
            });
        };

        Ok(found.clone())
    }

    fn apply_passes(
        &mut self,
        _tree: &mut IrNode,
        _positions: &mut PositionMap,
        _owner: PassOwner,
        _backend: Backend,
    ) -> GenResult<()> {
        Ok(())
    }

    fn discover_reachable(
        &mut self,
        _retained: &[&str],
        tree: &IrNode,
        discovery: &mut DiscoveryData,
    ) -> GenResult<()> {
        discover(tree, discovery);

        Ok(())
    }

    fn lower_to_backend(&mut self, tree: IrNode, positions: PositionMap) -> GenResult<Body> {
        Ok(Body {
            root: tree,
            positions,
        })
    }
}

fn discover(tree: &IrNode, discovery: &mut DiscoveryData) {
    match tree {
        IrNode::Nop => (),

        IrNode::Scope(inner) => discover(inner, discovery),

        IrNode::Block(items) => {
            for item in items {
                discover(item, discovery);
            }
        }

        IrNode::VarDef { init, .. } => discover(init, discovery),

        IrNode::Assign { value, .. } => discover(value, discovery),

        IrNode::Use { sym, .. } => reference(sym, discovery),

        IrNode::Call { target, args, .. } => {
            reference(target, discovery);

            for arg in args {
                discover(arg, discovery);
            }
        }

        IrNode::Lit { .. } => (),
    }
}

fn reference(sym: &Symbol, discovery: &mut DiscoveryData) {
    if sym.is_imported() {
        return;
    }

    match sym.kind() {
        SymbolKind::Procedure => {
            let _ = discovery.register_proc(sym.clone());
        }

        SymbolKind::Const => {
            let _ = discovery.register_const(sym.clone());
        }

        _ => (),
    }
}

// A generator stub emitting a naive command per node.
struct TestCodeGen;

impl CodeGen for TestCodeGen {
    fn generate(&mut self, ctx: &mut GenContext, body: &Body) -> GenResult<usize> {
        let mut frame = 0;

        let _ = emit(ctx, body, &body.root, &mut frame)?;

        Ok(frame.max(1))
    }
}

fn alloc(frame: &mut usize) -> Register {
    let register = *frame;

    *frame += 1;

    register
}

fn emit(
    ctx: &mut GenContext,
    body: &Body,
    node: &IrNode,
    frame: &mut usize,
) -> GenResult<Option<Register>> {
    match node {
        IrNode::Nop => Ok(None),

        IrNode::Scope(inner) => emit(ctx, body, inner, frame),

        IrNode::Block(items) => {
            let mut last = None;

            for item in items {
                last = emit(ctx, body, item, frame)?;
            }

            Ok(last)
        }

        IrNode::VarDef {
            sym,
            init,
            origin,
            linked,
        } => {
            let src = emit_value(ctx, body, init, frame)?;

            match linked {
                false => Ok(Some(src)),

                true => {
                    let slot = resolve(ctx, sym, *origin, body)?;

                    let index = ctx.intern_type(sym.ty().clone());
                    let _ = ctx.rtti_of(index);

                    let _ = ctx.emit(
                        Cmd::StData(StDataCmd { data: slot, src }),
                        body.positions.get(*origin),
                    );

                    Ok(None)
                }
            }
        }

        IrNode::Assign {
            target,
            value,
            origin,
        } => {
            let src = emit_value(ctx, body, value, frame)?;

            let slot = resolve(ctx, target, *origin, body)?;

            let index = ctx.intern_type(target.ty().clone());
            let _ = ctx.rtti_of(index);

            let _ = ctx.emit(
                Cmd::StData(StDataCmd { data: slot, src }),
                body.positions.get(*origin),
            );

            Ok(None)
        }

        IrNode::Use { sym, origin } => {
            let dst = alloc(frame);

            let source = body.positions.get(*origin);

            match sym.kind() {
                SymbolKind::Procedure => {
                    let slot = resolve(ctx, sym, *origin, body)?;

                    let _ = ctx.emit(
                        Cmd::LdImm(LdImmCmd {
                            dst,
                            value: Cell::Fn(slot),
                        }),
                        source,
                    );
                }

                SymbolKind::Const => {
                    let slot = resolve(ctx, sym, *origin, body)?;

                    let _ = ctx.emit(Cmd::LdConst(LdConstCmd { dst, cnst: slot }), source);
                }

                SymbolKind::Global | SymbolKind::ThreadLocal => {
                    let slot = resolve(ctx, sym, *origin, body)?;

                    let _ = ctx.emit(Cmd::LdData(LdDataCmd { dst, data: slot }), source);
                }

                SymbolKind::Local => {
                    let _ = ctx.emit(
                        Cmd::LdImm(LdImmCmd {
                            dst,
                            value: Cell::nil(),
                        }),
                        source,
                    );
                }
            }

            Ok(Some(dst))
        }

        IrNode::Call {
            target,
            args,
            origin,
        } => {
            let first = *frame;

            for arg in args {
                let _ = emit_value(ctx, body, arg, frame)?;
            }

            let func = resolve(ctx, target, *origin, body)?;

            let dst = alloc(frame);

            let _ = ctx.emit(
                Cmd::Call(CallCmd {
                    dst,
                    func,
                    first,
                    arity: args.len(),
                }),
                body.positions.get(*origin),
            );

            Ok(Some(dst))
        }

        IrNode::Lit { value, origin } => {
            let dst = alloc(frame);

            let _ = ctx.emit(
                Cmd::LdImm(LdImmCmd {
                    dst,
                    value: Cell::serialize(value),
                }),
                body.positions.get(*origin),
            );

            Ok(Some(dst))
        }
    }
}

fn emit_value(
    ctx: &mut GenContext,
    body: &Body,
    node: &IrNode,
    frame: &mut usize,
) -> GenResult<Register> {
    if let Some(register) = emit(ctx, body, node, frame)? {
        return Ok(register);
    }

    let dst = alloc(frame);

    let _ = ctx.emit(
        Cmd::LdImm(LdImmCmd {
            dst,
            value: Cell::nil(),
        }),
        Origin::nil(),
    );

    Ok(dst)
}

fn resolve(
    ctx: &GenContext,
    sym: &Symbol,
    origin: usize,
    body: &Body,
) -> GenResult<usize> {
    let Some(slot) = ctx.slot_of(sym) else {
        return Err(GenError::Inconsistent {
            origin: body.positions.get(origin),
            details: "unlinked entity reference".into(),
        });
    };

    Ok(slot)
}

// A generator stub that appends abandoned commands and fails.
struct FailingCodeGen {
    garbage: usize,
}

impl CodeGen for FailingCodeGen {
    fn generate(&mut self, ctx: &mut GenContext, _body: &Body) -> GenResult<usize> {
        for _ in 0..self.garbage {
            let _ = ctx.emit(
                Cmd::LdImm(LdImmCmd {
                    dst: 0,
                    value: Cell::nil(),
                }),
                Origin::nil(),
            );
        }

        Err(GenError::Unsupported {
            origin: Origin::nil(),
            construct: "test construct".into(),
        })
    }
}

#[test]
fn test_stmt_commits_one_global() {
    let mut jit = jit();
    let mut front = TestFrontend::default();
    let mut gen = TestCodeGen;

    let g1 = global("g1");
    let unit = front.add_unit(def(&g1, 0));

    let frame = jit
        .gen_stmt(&mut front, &mut gen, &unit)
        .expect("generation failed");

    assert_eq!(0, frame.start);
    assert!(frame.registers >= 1);

    assert_eq!(1, jit.data().len());
    assert_eq!(Cell::Usize(0), jit.data()[0]);
    assert_eq!(Some(0), jit.linker.slot_of(&g1));

    assert!(matches!(jit.code().last(), Some(Cmd::End(..))));
    assert_eq!(jit.code().len(), jit.debug().len());
}

#[test]
fn test_globals_indexed_before_thread_locals() {
    let mut jit = jit();
    let mut front = TestFrontend::default();
    let mut gen = TestCodeGen;

    let tl = thread_local("tl");
    let g = global("g");

    // The thread-local definition precedes the global one in the source
    // order, but globals receive their data slots first.
    let unit = front.add_unit(IrNode::Block(vec![def(&tl, 1), def(&g, 2)]));

    let _ = jit
        .gen_stmt(&mut front, &mut gen, &unit)
        .expect("generation failed");

    assert_eq!(Some(0), jit.linker.slot_of(&g));
    assert_eq!(Some(1), jit.linker.slot_of(&tl));

    assert_eq!(2, jit.data().len());
    assert_eq!(Cell::Usize(0), jit.data()[0]);
    assert_eq!(Cell::Str("".into()), jit.data()[1]);
}

#[test]
fn test_failed_generation_leaves_no_trace() {
    let mut jit = jit();
    let mut front = TestFrontend::default();

    let g1 = global("g1");
    let unit = front.add_unit(def(&g1, 0));

    let code_len_before = jit.code().len();

    let result = jit.gen_stmt(&mut front, &mut FailingCodeGen { garbage: 2 }, &unit);

    assert!(result.is_err());

    assert!(jit.functions().is_empty());
    assert!(jit.data().is_empty());
    assert!(jit.consts().is_empty());
    assert!(jit.discovery.is_processed());

    // The abandoned bytecode stays in the buffer, sealed with a fresh
    // boundary marker. Nothing points at it.
    assert_eq!(code_len_before + 2, jit.code().len());
    assert_eq!(jit.code().len(), jit.debug().len());
    assert!(matches!(jit.code().last(), Some(Cmd::End(..))));

    // A subsequent successful call proceeds normally.
    let frame = jit
        .gen_stmt(&mut front, &mut TestCodeGen, &unit)
        .expect("retry failed");

    assert_eq!(1, jit.data().len());
    assert_eq!(Some(0), jit.linker.slot_of(&g1));
    assert!(frame.registers >= 1);
}

#[test]
fn test_failed_proc_retry_reuses_indices() {
    let mut jit = jit();
    let mut front = TestFrontend::default();

    let proc = proc_sym("user.setup");
    let g = global("g");
    let c = complex_const("table", ConstValue::Seq(vec![ConstValue::Int(1), ConstValue::Int(2)]));

    front.add_proc(
        &proc,
        IrNode::Block(vec![
            def(&g, 7),
            IrNode::Use {
                sym: c.clone(),
                origin: 0,
            },
        ]),
    );

    let result = jit.load_proc(&mut front, &mut FailingCodeGen { garbage: 1 }, &proc);

    assert!(result.is_err());

    // The procedure's own slot was ensured by the demand-driven
    // registration before the failed generation, and it survives.
    assert_eq!(1, jit.functions().len());
    assert!(!jit.is_available(&proc));

    // The entities discovered inside the body were only tentative.
    assert!(jit.data().is_empty());
    assert!(jit.consts().is_empty());
    assert!(jit.discovery.is_processed());

    // The retry assigns the same index numbering the first call would have
    // assigned.
    let frame = jit
        .load_proc(&mut front, &mut TestCodeGen, &proc)
        .expect("retry failed");

    assert!(jit.is_available(&proc));
    assert_eq!(frame.start, jit.functions()[0].start());

    assert_eq!(Some(0), jit.linker.slot_of(&g));
    assert_eq!(Some(0), jit.linker.slot_of(&c));

    assert_eq!(1, jit.data().len());
    assert_eq!(
        Cell::Array(vec![Cell::Isize(1), Cell::Isize(2)]),
        jit.consts()[0].clone(),
    );
}

#[test]
fn test_demand_driven_availability() {
    let mut jit = jit();
    let mut front = TestFrontend::default();
    let mut gen = TestCodeGen;

    let proc = proc_sym("user.main");

    front.add_proc(&proc, IrNode::Nop);

    assert!(!jit.is_available(&proc));

    let slot = jit.register_proc(&proc);

    assert_eq!(0, slot);
    assert_eq!(1, jit.functions().len());
    assert!(!jit.is_available(&proc));
    assert!(!jit.functions()[0].is_generated());

    let frame = jit
        .load_proc(&mut front, &mut gen, &proc)
        .expect("generation failed");

    assert!(jit.is_available(&proc));
    assert_eq!(frame.start, jit.functions()[0].start());
    assert_eq!(frame.registers, jit.functions()[0].registers());

    // Loading an already generated procedure returns the recorded frame
    // without another generation.
    let code_len = jit.code().len();

    let reloaded = jit
        .load_proc(&mut front, &mut gen, &proc)
        .expect("reload failed");

    assert_eq!(frame, reloaded);
    assert_eq!(code_len, jit.code().len());
}

#[test]
#[should_panic(expected = "compiled twice")]
fn test_double_compilation_is_fatal() {
    let mut jit = jit();
    let mut front = TestFrontend::default();
    let mut gen = TestCodeGen;

    let proc = proc_sym("user.main");

    front.add_proc(&proc, IrNode::Nop);

    let _ = jit
        .load_proc(&mut front, &mut gen, &proc)
        .expect("generation failed");

    let slot = jit.register_proc(&proc);

    let _ = jit.compile(&mut front, &mut gen, slot);
}

#[test]
fn test_callback_override() {
    let mut jit = jit();
    let mut front = TestFrontend::default();
    let mut gen = TestCodeGen;

    let proc = proc_sym("sys.foo");

    let index = jit.register_callback("sys.foo", Arc::new(|_, _| Ok(Cell::Usize(42))));

    assert_eq!(0, index);

    let frame = jit
        .load_proc(&mut front, &mut gen, &proc)
        .expect("loading failed");

    // No bytecode is generated for an overridden procedure: the entry's
    // start offset remains the sentinel.
    assert_eq!(NOT_GENERATED, frame.start);
    assert!(!jit.is_available(&proc));
    assert_eq!(Some(0), jit.functions()[0].callback());

    let callback = jit.callback(0).expect("missing callback").clone();

    let result = callback(Origin::nil(), &mut []).expect("callback failed");

    assert_eq!(Cell::Usize(42), result);
}

#[test]
fn test_boundary_normalization() {
    let mut jit = jit();
    let mut front = TestFrontend::default();
    let mut gen = TestCodeGen;

    // A fresh environment consists of a single boundary marker.
    assert_eq!(1, jit.code().len());
    assert!(matches!(jit.code().last(), Some(Cmd::End(..))));

    let g1 = global("g1");
    let g2 = global("g2");

    let first_unit = front.add_unit(def(&g1, 1));
    let second_unit = front.add_unit(def(&g2, 2));

    let first = jit
        .gen_stmt(&mut front, &mut gen, &first_unit)
        .expect("generation failed");

    let sealed_len = jit.code().len();

    let second = jit
        .gen_stmt(&mut front, &mut gen, &second_unit)
        .expect("generation failed");

    // The previous boundary marker was removed, so the second unit's code
    // is appended contiguously.
    assert_eq!(0, first.start);
    assert_eq!(sealed_len - 1, second.start);

    let boundaries = jit
        .code()
        .iter()
        .filter(|cmd| matches!(cmd, Cmd::End(..)))
        .count();

    assert_eq!(1, boundaries);
    assert!(matches!(jit.code().last(), Some(Cmd::End(..))));
    assert_eq!(jit.code().len(), jit.debug().len());
}

#[test]
fn test_expr_generation() {
    let mut jit = jit();
    let mut front = TestFrontend::default();
    let mut gen = TestCodeGen;

    let g = global("g");

    let unit = front.add_unit(IrNode::Block(vec![
        def(&g, 3),
        IrNode::Use {
            sym: g.clone(),
            origin: 0,
        },
    ]));

    let frame = jit
        .gen_expr(&mut front, &mut gen, &unit)
        .expect("generation failed");

    assert!(frame.registers >= 1);
    assert_eq!(1, jit.data().len());
    assert_eq!(Some(0), jit.linker.slot_of(&g));
}

#[test]
fn test_procedure_calls_link_callees() {
    let mut jit = jit();
    let mut front = TestFrontend::default();
    let mut gen = TestCodeGen;

    let main = proc_sym("user.main");
    let helper = proc_sym("user.helper");

    front.add_proc(
        &main,
        IrNode::Call {
            target: helper.clone(),
            args: vec![IrNode::Lit {
                value: ConstValue::Int(1),
                origin: 0,
            }],
            origin: 0,
        },
    );

    let _ = jit
        .load_proc(&mut front, &mut gen, &main)
        .expect("generation failed");

    // The callee received a function-table entry with the sentinel start:
    // its own bytecode is generated lazily on demand.
    assert_eq!(2, jit.functions().len());
    assert_eq!(Some(1), jit.linker.slot_of(&helper));
    assert!(!jit.is_available(&helper));
    assert!(jit.is_available(&main));
}

#[test]
fn test_body_cache_gating() {
    let proc = comptime_proc("user.table_gen");

    // With caching enabled, the body transformation runs once.
    {
        let mut graph = ModuleGraph::new();
        let module = graph.add_module("test");

        let mut jit = ScriptJit::new(
            graph,
            module,
            JitConfig {
                cache_bodies: true,
                ..Default::default()
            },
        );

        let mut front = TestFrontend::default();
        front.add_proc(&proc, IrNode::Nop);

        let _ = jit
            .gen_proc(&mut front, &mut TestCodeGen, &proc)
            .expect("generation failed");

        let _ = jit
            .gen_proc(&mut front, &mut TestCodeGen, &proc)
            .expect("generation failed");

        assert_eq!(1, front.transforms);
    }

    // The analysis mode never reuses cached bodies.
    {
        let mut graph = ModuleGraph::new();
        let module = graph.add_module("test");

        let mut jit = ScriptJit::new(
            graph,
            module,
            JitConfig {
                mode: EvalMode::Analysis,
                cache_bodies: true,
                ..Default::default()
            },
        );

        let mut front = TestFrontend::default();
        front.add_proc(&proc, IrNode::Nop);

        let _ = jit
            .gen_proc(&mut front, &mut TestCodeGen, &proc)
            .expect("generation failed");

        let _ = jit
            .gen_proc(&mut front, &mut TestCodeGen, &proc)
            .expect("generation failed");

        assert_eq!(2, front.transforms);
    }
}
