pub mod context;
pub mod errors;
pub mod events;
pub mod generator;
pub mod ids;
pub mod tools;
pub mod turns;
