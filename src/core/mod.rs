pub mod analyzer;
pub mod engine;
pub mod graph;
pub mod layout;
pub mod plugin;
pub mod validator;
