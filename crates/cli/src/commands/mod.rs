pub mod ask;
pub mod doctor;
pub mod serve;
pub mod tools;
