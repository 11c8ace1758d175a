mod cdp;
mod cloud;
mod connector;
mod discovery;
mod launcher;
mod page;
mod session;

pub use cdp::{CdpClient, CdpPage};
pub use cloud::{CloudClient, CloudSession};
pub use connector::PageConnector;
pub use discovery::{discover_all_browsers, discover_browser, BrowserInfo, BrowserType};
pub use launcher::{browser_ws_url, BrowserLauncher};
pub use page::{key_definition, normalize_url};
pub use session::{resolve_cdp_endpoint, SessionManager, SessionState, SessionStatus};
