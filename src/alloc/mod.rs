pub mod cursor;
pub mod diagnostic;
pub mod registry;
pub mod trunk;
