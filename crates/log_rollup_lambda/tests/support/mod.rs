pub mod archive;
pub mod fakes;
