pub mod observation_set;
pub mod service;
pub mod station;
pub mod table;
