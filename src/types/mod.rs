pub mod bot;
pub mod portfolio;
pub mod trade;

pub use bot::*;
pub use portfolio::*;
pub use trade::*;
