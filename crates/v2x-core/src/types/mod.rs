mod envelope;
mod outcome;
mod record;
mod round;

pub use envelope::*;
pub use outcome::*;
pub use record::*;
pub use round::*;
