pub mod lanes;
pub mod overview;
