pub mod backup;
pub mod project;
pub mod section;
pub mod serve;
pub mod session;
pub mod settings;
pub mod sync;
