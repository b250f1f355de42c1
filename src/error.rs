/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::guid::Guid;
use crate::interrupt::Interrupted;
use failure::{Backtrace, Context, Fail};
use std::boxed::Box;
use std::{self, fmt};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(Box<Context<ErrorKind>>);

impl Fail for Error {
    #[inline]
    fn cause(&self) -> Option<&dyn Fail> {
        self.0.cause()
    }

    #[inline]
    fn backtrace(&self) -> Option<&Backtrace> {
        self.0.backtrace()
    }
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl Error {
    #[inline]
    pub fn kind(&self) -> &ErrorKind {
        &*self.0.get_context()
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Error {
        Error(Box::new(Context::new(kind)))
    }
}

impl From<Context<ErrorKind>> for Error {
    #[inline]
    fn from(inner: Context<ErrorKind>) -> Error {
        Error(Box::new(inner))
    }
}

/// Error kinds the merger and its collaborators can raise. See spec §7.
#[derive(Debug, Fail)]
pub enum ErrorKind {
    /// An item source could not resolve a referenced GUID. Recovered from by
    /// degrading the reference to `TreeNode::Unknown`; not normally fatal.
    #[fail(display = "No item found for guid {}", _0)]
    NotFound(Guid),

    /// The structure rows describe a cycle, duplicate parentage, or a
    /// non-folder parent. Aborts the current pass.
    #[fail(display = "Malformed tree: {}", _0)]
    MalformedTree(String),

    /// A merge situation arose that isn't covered by the deterministic rules
    /// in the spec. Should be unreachable in a correct implementation.
    #[fail(display = "Unresolvable merge conflict: {}", _0)]
    MergeConflict(String),

    /// An external collaborator (uploader or storage) failed.
    #[fail(display = "I/O failure: {}", _0)]
    IOFailure(String),

    /// The on-disk or in-memory representation violates an invariant the
    /// merger depends on (e.g. the synthetic root is missing).
    #[fail(display = "Corrupt state: {}", _0)]
    Corruption(String),

    #[fail(display = "Error parsing JSON data: {}", _0)]
    JsonError(#[fail(cause)] serde_json::Error),

    /// The green light predicate returned false. Not an error in the usual
    /// sense, but `Interruptee::err_if_interrupted` needs a `Fail` to return.
    #[fail(display = "Operation interrupted")]
    Aborted,
}

macro_rules! impl_from_error {
    ($(($variant:ident, $type:ty)),+) => ($(
        impl From<$type> for ErrorKind {
            #[inline]
            fn from(e: $type) -> ErrorKind {
                ErrorKind::$variant(e)
            }
        }

        impl From<$type> for Error {
            #[inline]
            fn from(e: $type) -> Error {
                ErrorKind::from(e).into()
            }
        }
    )*);
}

impl_from_error! {
    (JsonError, serde_json::Error)
}

/// `Interrupted` carries no data worth preserving; it just means the green
/// light went out, which is exactly `ErrorKind::Aborted`.
impl From<Interrupted> for ErrorKind {
    #[inline]
    fn from(_: Interrupted) -> ErrorKind {
        ErrorKind::Aborted
    }
}

impl From<Interrupted> for Error {
    #[inline]
    fn from(e: Interrupted) -> Error {
        ErrorKind::from(e).into()
    }
}
