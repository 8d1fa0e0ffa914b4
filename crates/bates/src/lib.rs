mod annotator;
mod bates;
mod discovery;
mod dispatch;
mod error;
pub mod ipc;
mod pool;
mod task;
#[cfg(test)]
mod testing;
mod worker;

pub use crate::annotator::*;
pub use crate::bates::*;
pub use crate::discovery::*;
pub use crate::dispatch::*;
pub use crate::error::*;
pub use crate::ipc::MAX_FRAME_LEN;
pub use crate::pool::*;
pub use crate::task::*;
pub use crate::worker::*;
