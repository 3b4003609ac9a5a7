pub mod convert;
pub mod frame;
pub mod gate;

pub use convert::{convert, convert_frame};
pub use frame::{ChromaOrder, FrameId, Plane, PlaneKind, RawFrame, RgbImage, SessionId};
pub use gate::{AcceptedFrame, Admission, BurstCompletion, BurstGate, BurstSession, RejectReason};
