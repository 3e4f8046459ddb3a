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

// Reports violations of the crate's internal invariants and of the caller
// contracts that cannot be recovered from.
//
// These panics indicate bugs rather than user-facing error conditions, and
// they are intentionally distinct from both the recoverable generation error
// channel and the runtime fault channel.
macro_rules! system_panic {
    ($($args:tt)*) => {{
        ::std::panic!(
            "Internal error. This is a bug.\n    {}\n    Version: {}.\n    File: {}.\n    Line: {}.",
            ::std::format_args!($($args)*),
            ::std::env!("CARGO_PKG_VERSION"),
            ::std::file!(),
            ::std::line!(),
        )
    }};
}

pub(crate) use system_panic;
