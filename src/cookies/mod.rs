//! Cookie state shared between the browser and the HTTP client.

mod bridge;
mod jar;

pub use bridge::{CookieBridge, SyncSummary};
pub use jar::{JarCookie, SessionJar};
