/// Tab Shepherd - browser extension core for automatic tab grouping
/// Built with Rust + WASM

pub mod colors;
pub mod domain;
pub mod engine;
pub mod ghost;
pub mod lock;
pub mod rules;
pub mod settings;
pub mod sleep;
pub mod store;
pub mod tab_data;
pub mod tracking;
pub mod view;

#[cfg(target_arch = "wasm32")]
pub mod browser;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::GroupingEngine;
pub use settings::Settings;
pub use store::{Clock, KvStore, StoreError, TabEvent, TabStore};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Re-export core domain functions for JavaScript access
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn extract_domain(url: &str) -> Option<String> {
    domain::extract_domain(url)
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn short_name(domain: &str) -> String {
    domain::short_name(domain)
}
