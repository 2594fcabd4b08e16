//! Core, platform independent networking code.

pub mod arp_cache;
pub mod backoff;
pub mod check;
pub mod client;
pub mod dev;
pub mod repr;
pub mod service;
pub mod stack;
pub mod storage;
pub mod time;
