pub mod controller;
pub mod persist;

pub use controller::{BurstController, BurstEvent, BurstHandle, BurstResult, ControlMessage};
pub use persist::{FileSink, ImageSink};
