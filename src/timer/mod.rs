pub mod controller;
pub mod countdown;

pub use controller::{ControllerConfig, SessionController};
pub use countdown::{Countdown, CountdownTick};
