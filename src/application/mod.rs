pub mod batch;
pub mod catalog;
pub mod content;
pub mod diff;
pub mod monitoring;
pub mod table_builder;
