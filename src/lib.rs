pub mod chat;
pub mod cli;
pub mod core;
pub mod corpus;
pub mod openai;
pub mod retrieval;
