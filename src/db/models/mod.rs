pub mod event;
pub mod show;

pub use self::event::{Event, EventType};
pub use self::show::Show;
