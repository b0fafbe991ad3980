pub mod local;

pub use local::LocalProcessRunner;
