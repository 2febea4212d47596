//! Stream adapters: uniform evaluation of configurations over different inputs.
//!
//! A [`StreamSource`] only has to hand out the [`Samples`] for a variable.
//! Running a [`Config`] against it yields a [`ResultCursor`], which walks
//! contexts, streams and tests on demand.

pub mod array;
pub mod cursor;
pub mod frame;
pub mod gridded;

pub use array::ArrayStream;
pub use cursor::ResultCursor;
pub use frame::FrameStream;
pub use gridded::{GriddedStream, GridVariable, InMemoryGrid, VariableLoader};

use crate::config::Config;
use crate::error::Result;
use crate::models::Samples;
use std::borrow::Cow;

pub trait StreamSource {
    /// Samples of `stream_id`, or `None` when the source has no such variable
    fn samples(&self, stream_id: &str) -> Result<Option<Cow<'_, Samples>>>;

    /// Whether the cursor should warn about unsorted or duplicate timestamps
    fn checks_timestamps(&self) -> bool {
        true
    }

    /// Evaluate `config` lazily against this source
    fn run<'a>(&'a self, config: &'a Config) -> ResultCursor<'a>
    where
        Self: Sized,
    {
        ResultCursor::new(self, config).with_timestamp_checks(self.checks_timestamps())
    }
}
