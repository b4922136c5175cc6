pub mod driver;
pub mod events;
pub mod session;

pub use driver::ViewDriver;
pub use events::{EventCollector, EventHandler, OrderEvent, ViewEvent, ViewMessage};
pub use session::{ViewBuilder, ViewHandle};
