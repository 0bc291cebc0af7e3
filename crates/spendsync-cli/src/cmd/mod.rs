pub mod clear;
pub mod status;
pub mod upload;
