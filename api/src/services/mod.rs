pub mod delivery;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod pipeline;
pub mod resolver;
pub mod store;
pub mod twitter;
