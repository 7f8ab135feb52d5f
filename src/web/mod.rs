//! Browser adapters for the [`host`](`crate::host`) capabilities, built on [`web_sys`].

mod ajax;
mod dom;
mod events;
mod start;
mod storage;
mod timers;

pub use ajax::{form_body, AjaxProvider};
pub use dom::{load_first_node, DomSurface, DomWatcher};
pub use events::DomEvents;
pub use start::{start, start_cart_counter, start_with, CartCounterHandle, DomController};
pub use storage::WebStorage;
pub use timers::{JsClock, WindowTimers};
