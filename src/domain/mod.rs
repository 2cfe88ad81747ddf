pub mod definition;
pub mod diff_result;
pub mod error;
pub mod fingerprint;
pub mod ports;
pub mod report;
pub mod value_objects;
