pub mod apps;
pub mod history;
