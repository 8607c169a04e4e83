pub mod annotations;
pub mod datasets;

pub use annotations::AnnotationStore;
pub use datasets::DatasetStore;
