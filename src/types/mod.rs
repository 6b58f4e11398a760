pub mod citation;
pub mod outline;
pub mod project;
pub mod section;
pub mod source;
pub mod state;
