pub mod app;
pub mod compress;
pub mod config;
pub mod domain;
pub mod error;
pub mod fastx;
pub mod http;
pub mod imicrobe;
pub mod metadata;
pub mod mgrast;
pub mod output;
pub mod retry;
pub mod sra;
pub mod store;
pub mod tools;
