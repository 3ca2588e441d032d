//! Hypervisor process controllers.

mod spawn;
mod xhyve;

pub use xhyve::{XhyveController, XhyveHandler};
