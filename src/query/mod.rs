// Queries over the persisted code graph

pub mod engine;
