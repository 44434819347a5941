// Application layer - Opened media and adapter wiring

pub mod container;
pub mod session;

pub use container::AppContainer;
pub use session::MediaHandle;
