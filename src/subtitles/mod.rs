pub mod reader;
pub mod view;

pub use reader::*;
pub use view::*;
