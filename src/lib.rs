pub mod archive;
pub mod config;
pub mod covers;
pub mod db;
pub mod events;
pub mod imaging;
pub mod indexer;
pub mod listener;
pub mod metadata;
pub mod notify;
pub mod scanner;
pub mod scheduler;
pub mod state;
