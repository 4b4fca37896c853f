mod error;
mod interrupt;

pub mod prelude {
    pub use crate::error::{InterruptedError, TestTimedOutError};
    pub use crate::interrupt::{InterruptHandle, InterruptListener};
}
