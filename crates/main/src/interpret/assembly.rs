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

use crate::{interpret::linker::SlotIndex, runtime::Cell};

/// An index of a command within the environment's code buffer.
pub type CmdIndex = usize;

/// An index of a register within a unit's frame.
pub type Register = usize;

/// The start offset of a function-table entry whose bytecode has not been
/// generated yet.
pub const NOT_GENERATED: CmdIndex = CmdIndex::MAX;

/// A command of the script virtual machine.
///
/// The machine is register-based: each generated unit declares how many
/// frame registers it requires, and its commands read and write these
/// registers directly.
///
/// The command set is an implementation detail of the platform, subject to
/// continuous changes in future minor versions.
#[derive(Clone, Debug, PartialEq)]
pub enum Cmd {
    End(EndCmd),
    Move(MoveCmd),
    LdImm(LdImmCmd),
    LdConst(LdConstCmd),
    LdData(LdDataCmd),
    StData(StDataCmd),
    Op(OpCmd),
    Jump(JumpCmd),
    Branch(BranchCmd),
    Call(CallCmd),
    Ret(RetCmd),
}

// Registers: () -> ()
// Delimits where a generated unit's code stops.
#[derive(Clone, Debug, PartialEq)]
pub struct EndCmd;

// Registers: (src) -> (dst)
#[derive(Clone, Debug, PartialEq)]
pub struct MoveCmd {
    pub dst: Register,
    pub src: Register,
}

// Registers: () -> (dst)
// Loads an immediate literal embedded into the code stream.
#[derive(Clone, Debug, PartialEq)]
pub struct LdImmCmd {
    pub dst: Register,
    pub value: Cell,
}

// Registers: () -> (dst)
#[derive(Clone, Debug, PartialEq)]
pub struct LdConstCmd {
    pub dst: Register,
    pub cnst: SlotIndex,
}

// Registers: () -> (dst)
#[derive(Clone, Debug, PartialEq)]
pub struct LdDataCmd {
    pub dst: Register,
    pub data: SlotIndex,
}

// Registers: (src) -> ()
#[derive(Clone, Debug, PartialEq)]
pub struct StDataCmd {
    pub data: SlotIndex,
    pub src: Register,
}

// Registers: (lhs, rhs) -> (dst)
#[derive(Clone, Debug, PartialEq)]
pub struct OpCmd {
    pub op: OpKind,
    pub dst: Register,
    pub lhs: Register,
    pub rhs: Register,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Equal,
    NotEqual,
    Lesser,
    Greater,
    And,
    Or,
}

impl Display for OpKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => formatter.write_str("add"),
            Self::Sub => formatter.write_str("sub"),
            Self::Mul => formatter.write_str("mul"),
            Self::Div => formatter.write_str("div"),
            Self::Rem => formatter.write_str("rem"),
            Self::Equal => formatter.write_str("equal"),
            Self::NotEqual => formatter.write_str("not-equal"),
            Self::Lesser => formatter.write_str("lesser"),
            Self::Greater => formatter.write_str("greater"),
            Self::And => formatter.write_str("and"),
            Self::Or => formatter.write_str("or"),
        }
    }
}

// Registers: () -> ()
#[derive(Clone, Debug, PartialEq)]
pub struct JumpCmd {
    pub command: CmdIndex,
}

// Registers: (cond) -> ()
#[derive(Clone, Debug, PartialEq)]
pub struct BranchCmd {
    pub cond: Register,
    pub otherwise: CmdIndex,
}

// Registers: (first..first+arity) -> (dst)
#[derive(Clone, Debug, PartialEq)]
pub struct CallCmd {
    pub dst: Register,
    pub func: SlotIndex,
    pub first: Register,
    pub arity: usize,
}

// Registers: (src) -> ()
#[derive(Clone, Debug, PartialEq)]
pub struct RetCmd {
    pub src: Register,
}
