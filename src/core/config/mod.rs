pub mod data;
pub mod io;


pub use data::{path_display, Config};
pub use io::ConfigError;
