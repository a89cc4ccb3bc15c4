pub mod coerce;
pub mod generate;
pub mod induce;
pub mod paths;

pub use coerce::*;
pub use generate::*;
pub use induce::*;
pub use paths::*;
