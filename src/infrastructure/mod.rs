pub mod config;
pub mod neo4j;
