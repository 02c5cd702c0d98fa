pub mod capture_sessions;
pub mod health_readings;
