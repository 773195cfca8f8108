pub mod run;

pub use run::{SubmitError, TrackingRun};
