//! Background maintenance loops.
//!
//! Each submodule exposes a long-running `run` meant for `tokio::spawn`.
//! Every loop stops when the shared [`CancellationToken`] fires.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod brand_refresh;
pub mod upload_purge;
