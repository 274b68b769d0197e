#![doc(html_root_url = "https://docs.rs/pagelet/0.1.0")]
#![warn(clippy::pedantic)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod actions;
pub mod element_map;
pub mod frame;
pub mod lazy;
pub mod mount;
pub mod mutation;
pub mod nav;
pub mod patch;
pub mod status;

pub use nav::{EngineOptions, NavigationController};
