#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod arena;
pub mod attributes;
pub mod candidate;
pub mod checklist;
pub mod rand;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod stats;
pub mod timer;
pub mod timing;
pub mod transaction;
