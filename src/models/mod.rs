pub mod enums;
pub mod report_card;

pub use enums::*;
pub use report_card::*;
