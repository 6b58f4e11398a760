pub mod json;
pub mod text;
pub mod word_count;
