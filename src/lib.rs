//! Client for the ScalarWebAPI Wi-Fi remote protocol spoken by Sony
//! cameras, with all device-facing I/O serialized on one worker thread.

mod error;
#[cfg(test)]
pub(crate) mod test_utils;
mod util;

pub mod camera;
pub mod conn;
pub mod descriptor;
pub mod discovery;
pub mod liveview;
pub mod proto;

pub use error::*;

pub type Result<T, E = Error> = std::result::Result<T, E>;
