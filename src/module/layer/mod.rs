//! Module layers, services catalogs and the layer index

pub mod catalog;
pub mod index;
pub mod layer;

pub use catalog::{ServiceProvider, ServicesCatalog};
pub use index::{LayerIndex, LayerIter};
pub use layer::Layer;
