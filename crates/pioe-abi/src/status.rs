use std::ffi::c_int;
use std::fmt;

/// Status code returned by every engine entry point and native callback.
///
/// Zero denotes success, anything else failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Status(pub c_int);

impl Status {
    pub const OK: Status = Status(0);
    pub const FAILED: Status = Status(-1);

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub fn code(self) -> c_int {
        self.0
    }

    /// Convert into a `Result`, keeping the failing status as the error.
    pub fn into_result(self) -> Result<(), Status> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<Result<(), Status>> for Status {
    fn from(result: Result<(), Status>) -> Self {
        match result {
            Ok(()) => Status::OK,
            Err(status) if status.is_ok() => Status::FAILED,
            Err(status) => status,
        }
    }
}

impl From<c_int> for Status {
    fn from(code: c_int) -> Self {
        Status(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
