pub mod config;
pub mod masterdata;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod remote;
pub mod story;
pub mod table;
pub mod textutil;
