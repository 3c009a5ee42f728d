pub mod load;
pub mod report;
pub mod summary;
pub mod table;
pub mod tiles;
