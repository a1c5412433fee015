mod action;
mod command;
mod intel;
mod list;
mod tags;

pub use action::*;
pub use command::*;
pub use intel::*;
pub use list::*;
pub use tags::*;
