pub mod container;
pub mod query;
pub mod schema;
pub mod spec;

pub use container::*;
pub use query::*;
pub use schema::*;
pub use spec::*;
