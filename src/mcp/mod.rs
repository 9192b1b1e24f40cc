// Model Context Protocol server over stdio

pub mod server;
pub mod tools;
