pub mod artifacts;
pub mod search;
pub mod serving;
pub mod training;
