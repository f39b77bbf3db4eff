pub mod capability;
pub mod config;
pub mod error;
pub mod memory;
pub mod plan;
pub mod schedule;
pub mod skill;
pub mod stream;
pub mod tool;
pub mod trace;
pub mod turn;
