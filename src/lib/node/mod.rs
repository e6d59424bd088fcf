pub mod types;

pub use types::Node;
