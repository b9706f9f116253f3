pub mod enums;
pub mod profile;
pub mod scan;

pub use profile::*;
pub use scan::*;
