pub mod api;
pub mod importer;
pub mod store;
pub mod sync;
pub mod tasks;
pub mod tracing;

pub mod util {
    pub mod env;
}
