//! Browser infrastructure: launching, sessions and page lifecycle

mod launch;
mod session;
mod wrapper;

pub use launch::{download_managed_browser, find_browser_executable, launch_browser};
pub use session::{Navigation, SessionManager};
pub use wrapper::BrowserWrapper;
