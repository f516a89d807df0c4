pub mod shell;
pub mod telemetry;
