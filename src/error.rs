use crate::checkout::CheckoutConflicts;
use owo_colors::OwoColorize;
use std::fmt::{self, Display, Formatter};

pub type BitResult<T> = Result<T, BitGenericError>;
pub type BitGenericError = anyhow::Error;

/// usually we can just use anyhow for errors, but sometimes its nice to have a "rust"
/// representation we can test or match against
#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub enum BitError {
    /// a checkout conflict report; returned only when `ALLOW_CONFLICTS` is not set (§7 `CONFLICT`)
    CheckoutConflict(CheckoutConflicts),
    /// a reference chain looped past the bounded hop limit (§9 "Cyclic graphs in refs")
    CyclicRef(String),
    /// a pattern or path failed ingestion-time validation (embedded `.git`, `.`, `..` component)
    InvalidPath(String),
    /// a checkout notify callback vetoed the operation (§7 `USER`)
    UserAbort,
}

pub trait BitErrorExt {
    fn try_into_bit_error(self) -> BitResult<BitError>;
    fn try_into_checkout_conflict(self) -> BitResult<CheckoutConflicts>;
}

impl BitErrorExt for BitGenericError {
    /// tries to convert generic error into specific error and just returns previous error on failure
    fn try_into_bit_error(self) -> BitResult<BitError> {
        match self.downcast::<BitError>() {
            Ok(bit_error) => Ok(bit_error),
            Err(cast_failed_err) => Err(cast_failed_err),
        }
    }

    fn try_into_checkout_conflict(self) -> BitResult<CheckoutConflicts> {
        match self.try_into_bit_error()? {
            BitError::CheckoutConflict(conflicts) => Ok(conflicts),
            err => Err(anyhow!(err)),
        }
    }
}

pub trait BitResultExt {
    fn is_not_found_err(&self) -> bool;
    fn is_fatal(&self) -> bool;
}

macro_rules! error_ext_is_method {
    ($method:ident) => {
        fn $method(&self) -> bool {
            match self {
                Ok(..) => false,
                Err(err) => err.$method(),
            }
        }
    };
}

impl<T> BitResultExt for BitResult<T> {
    error_ext_is_method!(is_not_found_err);

    error_ext_is_method!(is_fatal);
}

impl BitResultExt for BitGenericError {
    fn is_not_found_err(&self) -> bool {
        // NOTFOUND is produced entirely by collaborator traits (§6 ODB/RefStore); those
        // surface as plain `anyhow` errors from outside this crate, so we can only
        // recognise the io::ErrorKind::NotFound shape here.
        self.downcast_ref::<std::io::Error>()
            .map_or(false, |e| e.kind() == std::io::ErrorKind::NotFound)
    }

    fn is_fatal(&self) -> bool {
        match self.downcast_ref::<BitError>() {
            Some(err) => !matches!(err, BitError::CheckoutConflict(..)),
            None => true,
        }
    }
}

macro_rules! write_hint {
    ($f:expr, $($args:tt)*) => {{
        write!($f, "{}: ", "hint".yellow())?;
        writeln!($f, $($args)*)
    }};
}

impl std::error::Error for BitError {}

impl Display for BitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BitError::CheckoutConflict(conflicts) => {
                writeln!(f, "checkout would overwrite local changes to the following paths:")?;
                for path in &conflicts.paths {
                    write_hint!(f, "  {}", path.yellow())?;
                }
                Ok(())
            }
            BitError::CyclicRef(name) =>
                write!(f, "symbolic reference `{}` forms a cycle", name),
            BitError::InvalidPath(path) => write!(f, "invalid path `{}`", path),
            BitError::UserAbort => write!(f, "operation aborted by callback"),
        }
    }
}
