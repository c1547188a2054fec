pub mod flops;

pub use flops::FlopCounter;
