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

use crate::runtime::{Origin, TypeMeta};

/// A result of a runtime API call, which can either be a normal value or a
/// [RuntimeError].
pub type RuntimeResult<T> = StdResult<T, RuntimeError>;

/// A helper trait for the [RuntimeResult] object.
///
/// This trait is automatically implemented for RuntimeResult and provides the
/// [expect_blame](Self::expect_blame) function, which either unwraps the
/// underlying value or panics if the result is [Err], indicating where the
/// RuntimeError [originated](RuntimeError::primary_origin).
pub trait RuntimeResultExt {
    /// The [Ok] type of the underlying [Result].
    type OkType;

    /// If the result is [Ok], returns the underlying data; otherwise, panics
    /// at the location where the RuntimeError
    /// [originated](RuntimeError::primary_origin).
    fn expect_blame(self, message: &str) -> Self::OkType;
}

impl<T> RuntimeResultExt for RuntimeResult<T> {
    type OkType = T;

    #[inline(always)]
    fn expect_blame(self, message: &str) -> Self::OkType {
        match self {
            Ok(ok) => ok,

            Err(error) => {
                let origin = *error.primary_origin();

                match origin {
                    Origin::Rust(origin) => origin.blame(&format!("{message}\n{error}")),

                    Origin::Script(origin) => {
                        panic!("{origin}: {message}\n{error}");
                    }
                }
            }
        }
    }
}

/// Represents any fault that may occur during the evaluation of already
/// generated script code.
///
/// Faults are raised only from within the bytecode interpreter. The
/// generation and linking machinery never produces (and never catches) them;
/// its own recoverable failures are reported through
/// [GenError](crate::semantics::GenError) instead.
///
/// A fault propagates upward through interpreter frames until caught by
/// whatever driver invoked the execution: the compile-time evaluator or the
/// script runner.
///
/// Every fault carries at least one [Origin]. The origin of a freshly raised
/// fault normally comes from [Origin::caller], pointing to the raise site
/// inside the interpreter; the [blamed](Self::blamed) function overrides it
/// to attribute the fault to user code.
#[derive(Clone, Debug)]
pub enum RuntimeError {
    /// The script code attempts to access void data.
    Nil {
        /// The range in Rust or Script source code where the data was
        /// accessed.
        access_origin: Origin,
    },

    /// The script code attempts to index into an array or string, but the
    /// index is out of bounds.
    OutOfBounds {
        /// The range in Rust or Script source code where the data was
        /// accessed.
        access_origin: Origin,

        /// The requested index.
        index: usize,

        /// The actual length of the array or string.
        length: usize,
    },

    /// The script code attempts to divide a number by zero.
    DivisionByZero {
        /// The range in Rust or Script source code where the operation was
        /// applied.
        access_origin: Origin,
    },

    /// The script code attempts to use a data object as an argument of an
    /// operation, but the data type does not meet the requirements.
    TypeMismatch {
        /// The range in Rust or Script source code where the data was
        /// accessed.
        access_origin: Origin,

        /// The type of the data object being provided.
        data_type: TypeMeta,

        /// A list of expected types acceptable for this operation.
        expected_types: Vec<TypeMeta>,
    },

    /// The script code refers to an externally linked declaration that the
    /// execution environment failed to resolve by name.
    Unresolved {
        /// The range in Rust or Script source code where the reference was
        /// evaluated.
        access_origin: Origin,

        /// The fully qualified name of the unresolved declaration.
        name: CompactString,
    },

    /// The script code invokes a function with a wrong number of arguments.
    ArityMismatch {
        /// The range in Rust or Script source code of the invocation.
        invocation_origin: Origin,

        /// The range in Rust or Script source code where the function was
        /// declared.
        function_origin: Origin,

        /// The number of parameters the function declares.
        expected: usize,

        /// The number of arguments provided.
        provided: usize,
    },

    /// The interpreter's frame stack exceeded its limit.
    StackOverflow {
        /// The range in Rust or Script source code of the innermost
        /// invocation.
        origin: Origin,
    },

    /// The script execution was interrupted by the execution driver.
    Interrupted {
        /// The range in Rust or Script source code about to be evaluated.
        origin: Origin,
    },
}

impl Display for RuntimeError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nil { .. } => formatter.write_str("void data access"),

            Self::OutOfBounds { index, length, .. } => formatter.write_fmt(format_args!(
                "index {index} is out of bounds of the array with length {length}",
            )),

            Self::DivisionByZero { .. } => formatter.write_str("division by zero"),

            Self::TypeMismatch {
                data_type,
                expected_types,
                ..
            } => {
                formatter.write_fmt(format_args!("unexpected type {data_type}"))?;

                if !expected_types.is_empty() {
                    formatter.write_str(" (expected ")?;

                    for (index, expected) in expected_types.iter().enumerate() {
                        if index > 0 {
                            formatter.write_str(" or ")?;
                        }

                        Display::fmt(expected, formatter)?;
                    }

                    formatter.write_str(")")?;
                }

                Ok(())
            }

            Self::Unresolved { name, .. } => {
                formatter.write_fmt(format_args!("unresolved external declaration {name:?}"))
            }

            Self::ArityMismatch {
                expected, provided, ..
            } => formatter.write_fmt(format_args!(
                "the function takes {expected} argument(s), but {provided} provided",
            )),

            Self::StackOverflow { .. } => formatter.write_str("stack overflow"),

            Self::Interrupted { .. } => formatter.write_str("script execution interrupted"),
        }
    }
}

impl StdError for RuntimeError {}

impl RuntimeError {
    /// Returns the primary [Origin] of this fault: the Rust or Script source
    /// code range the fault blames.
    pub fn primary_origin(&self) -> &Origin {
        match self {
            Self::Nil { access_origin } => access_origin,
            Self::OutOfBounds { access_origin, .. } => access_origin,
            Self::DivisionByZero { access_origin } => access_origin,
            Self::TypeMismatch { access_origin, .. } => access_origin,
            Self::Unresolved { access_origin, .. } => access_origin,
            Self::ArityMismatch {
                invocation_origin, ..
            } => invocation_origin,
            Self::StackOverflow { origin } => origin,
            Self::Interrupted { origin } => origin,
        }
    }

    /// Replaces the primary [Origin](Self::primary_origin) of this fault.
    ///
    /// The origin of a freshly raised fault defaults to the raise call site.
    /// The interpreter uses this function to attribute the blame to the user
    /// code being evaluated instead.
    pub fn blamed(mut self, origin: Origin) -> Self {
        match &mut self {
            Self::Nil { access_origin } => *access_origin = origin,
            Self::OutOfBounds { access_origin, .. } => *access_origin = origin,
            Self::DivisionByZero { access_origin } => *access_origin = origin,
            Self::TypeMismatch { access_origin, .. } => *access_origin = origin,
            Self::Unresolved { access_origin, .. } => *access_origin = origin,
            Self::ArityMismatch {
                invocation_origin, ..
            } => *invocation_origin = origin,
            Self::StackOverflow { origin: primary } => *primary = origin,
            Self::Interrupted { origin: primary } => *primary = origin,
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::{ModuleId, Origin, RuntimeError, ScriptOrigin, SourceSpan};

    #[test]
    fn test_fault_origin_defaults_to_the_raise_site() {
        let fault = RuntimeError::DivisionByZero {
            access_origin: Origin::caller(),
        };

        let Origin::Rust(origin) = fault.primary_origin() else {
            panic!("Raise site is not a Rust origin.");
        };

        assert!(!origin.is_nil());
        assert!(origin.location.expect("missing location").file().ends_with("error.rs"));
    }

    #[test]
    fn test_fault_blame_override() {
        let user_code = Origin::Script(ScriptOrigin::new(
            ModuleId::new(0),
            SourceSpan::new(10, 20),
        ));

        let fault = RuntimeError::Nil {
            access_origin: Origin::caller(),
        }
        .blamed(user_code);

        assert_eq!(&user_code, fault.primary_origin());
    }

    #[test]
    fn test_fault_description() {
        let fault = RuntimeError::OutOfBounds {
            access_origin: Origin::nil(),
            index: 10,
            length: 3,
        };

        assert_eq!(
            "index 10 is out of bounds of the array with length 3",
            fault.to_string(),
        );
    }
}
