pub mod archiver;
pub mod producer;
pub mod worker;
