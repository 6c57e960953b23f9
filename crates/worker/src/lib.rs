//! Building blocks of the `taskforge-worker` binary.

pub mod handlers;
pub mod request;
