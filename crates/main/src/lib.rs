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

//! # Per Aspera
//!
//! Per Aspera is the incremental just-in-time compilation and linking layer
//! of an embeddable scripting language platform.
//!
//! The crate receives requests to compile a statement, an expression, or a
//! procedure, lowers the request through the external front end, discovers
//! every new entity the request transitively depends on (procedures, globals,
//! thread-locals, and complex constants), assigns stable execution slots to
//! these entities, drives the external bytecode generator, and — only if
//! generation succeeds — materializes storage for the new entities so the
//! script virtual machine can run the code immediately.
//!
//! A failed compilation leaves zero observable trace: no orphaned
//! function-table entries, and no half-allocated storage. A successful one
//! atomically grows several parallel tables in a fixed, interdependent order.
//!
//! The crate API is organized into three modules:
//!
//!  - [interpret] is the core: discovery queues, the linker table, the
//!    execution environment, the generation orchestrator, and the
//!    demand-driven compiler.
//!  - [runtime] provides source code origins, runtime faults, storage cells,
//!    and type metadata.
//!  - [semantics] provides entity symbols, the intermediate form, and the
//!    seams through which the external front end and bytecode generator
//!    plug into the subsystem.
//!
//! Parsing, semantic analysis, the optimization pass pipeline, the bytecode
//! instruction encoder, and the interpreter loop are intentionally outside
//! of this crate.

mod report;

/// The just-in-time compilation and linking core.
///
/// This module owns the compile session state ([ScriptJit](crate::interpret::ScriptJit)),
/// the transactional discovery queues, the linker table with native-callback
/// overrides, and the execution environment the script virtual machine reads.
pub mod interpret;

/// Source code origins, runtime faults, and virtual machine storage.
pub mod runtime;

/// Entity symbols, the intermediate form, and the front end seams.
pub mod semantics;
