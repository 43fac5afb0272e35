pub mod autorest;
pub mod cli;
pub mod git;
pub mod github;
pub mod telemetry;
