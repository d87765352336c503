pub mod config_cmd;
pub mod doctor;
pub mod goal;
pub mod run;
pub mod session;
