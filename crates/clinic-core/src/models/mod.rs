//! Domain models for the clinic encounter workflow.

mod appointment;
mod catalog;
mod interaction;
mod prescription;

pub use appointment::*;
pub use catalog::*;
pub use interaction::*;
pub use prescription::*;
