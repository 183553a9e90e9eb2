pub mod errors;

pub use errors::{
    DirectoryError, JobError, JobErrorKind, LockError, RequestError, StoreError,
};
