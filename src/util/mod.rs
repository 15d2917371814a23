pub mod raw_data_io;
pub mod synthetic;
