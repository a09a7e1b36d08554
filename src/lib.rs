pub mod guidance;
pub mod triage;
