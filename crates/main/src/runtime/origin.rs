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
    fmt::{Debug, Display, Formatter},
    hash::{Hash, Hasher},
    panic::Location,
};

/// A globally unique identifier of a script module within a compile session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(usize);

impl ModuleId {
    #[inline(always)]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline(always)]
    pub fn into_inner(self) -> usize {
        self.0
    }
}

impl Display for ModuleId {
    #[inline(always)]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_fmt(format_args!("module{}", self.0))
    }
}

/// A range of characters within a script module's source text.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl Debug for SourceSpan {
    #[inline(always)]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, formatter)
    }
}

impl Display for SourceSpan {
    #[inline(always)]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_fmt(format_args!("[{}..{}]", self.start, self.end))
    }
}

impl SourceSpan {
    #[inline(always)]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A representation of a Rust or Script source code range.
///
/// The primary purpose of this object is to track data flow points (both
/// Rust and Script points) during script evaluation.
///
/// The Origin object helps the script engine produce descriptive
/// [runtime faults](crate::runtime::RuntimeError) if an error occurs during
/// the evaluation of already generated code. The [Origin::caller] constructor
/// points to the Rust call site that raised the fault; a fault's origin can
/// be overridden with an explicit Script origin to attribute blame to user
/// code rather than to the interpreter internals.
///
/// For debugging purposes, you can instantiate the Origin object as
/// [Origin::nil], which intentionally does not point to any source code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// A range representing a portion of Rust source code.
    Rust(RustOrigin),

    /// A range representing a portion of Script source code.
    Script(ScriptOrigin),
}

impl Default for Origin {
    #[inline(always)]
    fn default() -> Self {
        Self::nil()
    }
}

impl Debug for Origin {
    #[inline(always)]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rust(origin) => Debug::fmt(origin, formatter),
            Self::Script(origin) => Debug::fmt(origin, formatter),
        }
    }
}

impl Display for Origin {
    #[inline(always)]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rust(origin) => Display::fmt(origin, formatter),
            Self::Script(origin) => Display::fmt(origin, formatter),
        }
    }
}

impl From<RustOrigin> for Origin {
    #[inline(always)]
    fn from(value: RustOrigin) -> Self {
        Self::Rust(value)
    }
}

impl From<ScriptOrigin> for Origin {
    #[inline(always)]
    fn from(value: ScriptOrigin) -> Self {
        Self::Script(value)
    }
}

impl Origin {
    /// Creates an instance of Origin that intentionally does not point
    /// to any source code. This serves as the Default constructor for this
    /// object.
    #[inline(always)]
    pub fn nil() -> Self {
        Self::Rust(RustOrigin::nil())
    }

    /// Creates an Origin pointing to the Rust source code line from which
    /// this function has been called.
    ///
    /// This is the default origin of a raised
    /// [runtime fault](crate::runtime::RuntimeError): unless overridden, the
    /// fault blames its own raise site.
    #[track_caller]
    #[inline(always)]
    pub fn caller() -> Self {
        Self::Rust(RustOrigin::caller())
    }

    /// Returns true if this instance is the [Nil Origin](Origin::nil).
    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        match self {
            Self::Rust(origin) => origin.is_nil(),
            Self::Script(..) => false,
        }
    }
}

/// A pointer to a specific location in the Rust source code.
///
/// Instances of this object are normally created through the
/// [caller](RustOrigin::caller) constructor, which records the caller's
/// [Location]. The [nil](RustOrigin::nil) instance intentionally does not
/// point to any Rust code.
#[derive(Clone, Copy)]
pub struct RustOrigin {
    /// The actual location within a Rust file, if any.
    pub location: Option<&'static Location<'static>>,
}

impl Default for RustOrigin {
    #[inline(always)]
    fn default() -> Self {
        Self::nil()
    }
}

impl PartialEq for RustOrigin {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        match (&self.location, &other.location) {
            (Some(this), Some(other)) => {
                this.file() == other.file()
                    && this.line() == other.line()
                    && this.column() == other.column()
            }

            (None, None) => true,

            _ => false,
        }
    }
}

impl Eq for RustOrigin {}

impl Hash for RustOrigin {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let Some(location) = &self.location else {
            return state.write_u8(0);
        };

        state.write_u8(1);
        location.file().hash(state);
        location.line().hash(state);
        location.column().hash(state);
    }
}

impl Debug for RustOrigin {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            None => formatter.write_str("RustOrigin(invalid)"),

            Some(location) => formatter
                .debug_struct("RustOrigin")
                .field("location", &format_args!("{location}"))
                .finish(),
        }
    }
}

impl Display for RustOrigin {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => Display::fmt(location, formatter),
            None => formatter.write_str("[?]"),
        }
    }
}

impl RustOrigin {
    /// Returns a RustOrigin that intentionally does not point to any Rust
    /// code. This is the [Default] value of this object.
    #[inline(always)]
    pub const fn nil() -> Self {
        Self { location: None }
    }

    /// Creates a RustOrigin pointing to the Rust source code line from which
    /// this function has been called.
    #[track_caller]
    #[inline(always)]
    pub fn caller() -> Self {
        Self {
            location: Some(Location::caller()),
        }
    }

    /// Returns true if this instance is the [Nil RustOrigin](Self::nil).
    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        self.location.is_none()
    }

    /// This function is guaranteed to panic with the provided `message`.
    ///
    /// Unlike a normal `panic!`, the panic message mentions the Rust code
    /// that this RustOrigin points to.
    #[inline(never)]
    pub fn blame<T>(&self, message: &str) -> T {
        match &self.location {
            Some(location) => panic!("{location}: {message}"),
            None => panic!("{message}"),
        }
    }
}

/// A representation of a range within Script source code.
///
/// This object points to a span within a script module's source text, often
/// highlighting identifiers and similar syntactic constructs. The module is
/// referred to by its session-wide [ModuleId]; resolving the span back to
/// the text is the front end's job.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptOrigin {
    module: ModuleId,
    span: SourceSpan,
}

impl Debug for ScriptOrigin {
    #[inline(always)]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ScriptOrigin")
            .field("module", &self.module)
            .field("span", &self.span)
            .finish()
    }
}

impl Display for ScriptOrigin {
    #[inline(always)]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_fmt(format_args!("{} {}", self.module, self.span))
    }
}

impl ScriptOrigin {
    #[inline(always)]
    pub fn new(module: ModuleId, span: SourceSpan) -> Self {
        Self { module, span }
    }

    /// The script module to which this source code range belongs.
    #[inline(always)]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// The source text range within the module.
    #[inline(always)]
    pub fn span(&self) -> SourceSpan {
        self.span
    }
}
