pub mod patients;
pub mod system;
