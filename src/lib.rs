//! Motion control and pose estimation for a four-wheel swerve drive.


pub mod config;
pub mod controller;
pub mod corrections;
pub mod domain;
pub mod io;
pub mod simulator;
