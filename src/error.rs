use snafu::prelude::*;

/// Crate-wide error kinds.
///
/// `Duplicate` is deliberately absent: inserting an already-known template
/// is an expected outcome of the enumeration loop, reported through
/// [`crate::store::InsertOutcome`] instead of an error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Invalid CLI arguments or a malformed circuit from outside.
    #[snafu(display("bad input: {message}"))]
    BadInput { message: String },

    /// A gate violates its basis constraints (duplicate wires, out of range).
    #[snafu(display("bad gate: {message}"))]
    BadGate { message: String },

    /// Record carries a basis id no known basis answers to.
    #[snafu(display("unknown basis id {id}"))]
    UnknownBasis { id: u8 },

    /// Store was written with a different schema or canonicalization version.
    #[snafu(display("{what} version mismatch: store has {found}, this build supports {supported}"))]
    VersionMismatch {
        what: &'static str,
        found: u32,
        supported: u32,
    },

    /// A SAT backend crashed, exited nonzero, or produced unparseable output.
    #[snafu(display("solver '{solver}' failed: {message}"))]
    SolverFailure { solver: String, message: String },

    /// An on-disk record fails to decode.
    #[snafu(display("corrupt record: {message}"))]
    Corruption { message: String },

    /// Store map full, or a worker ran out of memory.
    #[snafu(display("resource exhausted: {message}"))]
    ResourceExhausted { message: String },

    #[snafu(display("store backend error: {source}"))]
    StoreBackend { source: sled::Error },

    #[snafu(display("io error on {path}: {source}"))]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("json error: {source}"))]
    Json { source: serde_json::Error },
}

impl Error {
    /// Process exit code per the CLI contract: 1 for user/IO trouble,
    /// 2 for internal invariant violations.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Corruption { .. } => 2,
            _ => 1,
        }
    }
}

impl From<sled::Error> for Error {
    fn from(source: sled::Error) -> Self {
        Error::StoreBackend { source }
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
