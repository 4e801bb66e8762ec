//! Configuration section definitions.
//!
//! Each module corresponds to a section in `tabsync.toml`:
//!
//! | Module   | TOML Section          | Purpose                              |
//! |----------|-----------------------|--------------------------------------|
//! | `store`  | `[store]`             | Shared state file                    |
//! | `serve`  | `[serve]`             | Push/bundle server                   |
//! | `watch`  | `[watch]`             | Local watch sessions                 |
//! | `push`   | `[push]`              | Push client transport                |
//! | `tab`    | `[tab]`, `[reload]`   | Headless tab runtime                 |

mod push;
mod serve;
mod store;
mod tab;
mod watch;

pub use push::PushConfig;
pub use serve::ServeConfig;
pub use store::StoreConfig;
pub use tab::{ReloadConfig, TabConfig};
pub use watch::WatchConfig;
