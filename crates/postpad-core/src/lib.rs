mod core;
mod document;
mod error;
mod html;
mod keymap;
mod normalize;
mod query;
mod selection;
mod serialize;
mod toggle;

pub use crate::core::*;
pub use crate::document::*;
pub use crate::error::*;
pub use crate::html::{load, to_html, try_load};
pub use crate::keymap::*;
pub use crate::normalize::*;
pub use crate::query::*;
pub use crate::selection::*;
pub use crate::serialize::*;
pub use crate::toggle::*;
