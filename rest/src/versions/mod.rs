/// version 0
pub mod v0;
