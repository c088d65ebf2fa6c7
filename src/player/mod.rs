pub mod controller;
pub mod error;
pub mod movie;
pub mod pool;
pub mod process;

#[cfg(test)]
pub mod testing;

pub use controller::*;
pub use error::*;
pub use movie::*;
pub use pool::*;
pub use process::*;
