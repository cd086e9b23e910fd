//! Rate decision engine.

mod algorithm;
mod decision;
mod gcra;
mod key;
mod limit;
mod limiter;
mod sliding_window;

pub use algorithm::RateAlgorithm;
pub use decision::Decision;
pub use gcra::{Gcra, MAX_CAS_ATTEMPTS};
pub use key::{RateKey, DEFAULT_KEY_PREFIX};
pub use limit::{Algorithm, Limit};
pub use limiter::RateLimiter;
pub use sliding_window::SlidingWindow;
