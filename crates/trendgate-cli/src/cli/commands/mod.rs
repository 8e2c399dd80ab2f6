pub(crate) mod common;
mod dispatch;
pub mod gate;
pub mod record;
pub mod report;

pub use dispatch::dispatch;
