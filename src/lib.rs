pub mod apply;
pub mod cli;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod data_api;
pub mod gen;
pub mod inspect;
pub mod retry;
pub mod sql;
pub mod validate;
