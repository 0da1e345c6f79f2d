pub mod counter;
pub mod history;
pub mod smoother;
pub mod window;

pub use counter::SmoothedRateCounter;
pub use history::DecayingRateHistory;
pub use smoother::CriticallyDampedSmoother;
pub use window::WindowedEventCounter;
