pub mod activities;
pub mod meetings;
pub mod reports;
pub mod scan;
pub mod status;
