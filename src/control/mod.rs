//! Formation control: assignment, mission sequencing, and command dispatch

pub mod dispatcher;
pub mod formation;
pub mod mission;
pub mod operator;

pub use dispatcher::*;
pub use formation::*;
pub use mission::*;
pub use operator::*;
