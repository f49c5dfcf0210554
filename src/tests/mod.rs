pub mod common;
mod expiration_and_timers;
mod supersession;
