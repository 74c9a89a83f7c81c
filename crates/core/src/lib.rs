pub mod clock;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod types;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::StepperConfig;
pub use error::{StepperError, StepperResult};
pub use types::{HeroRef, JourneyEvent, JourneyEventType, JourneyState};
