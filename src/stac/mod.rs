//! STAC item model and loading.

mod item;
mod loader;

pub use item::{AssetDescriptor, MediaType, StacItem};
pub use loader::{ItemLoader, StacLoader};
