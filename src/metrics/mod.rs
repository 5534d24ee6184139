pub mod definitions;
pub mod naming;
pub mod registry;
pub mod sink;
pub mod types;
