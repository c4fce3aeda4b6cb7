pub mod odds;
pub mod text;
