pub mod event;
pub mod show;

pub use event::EventRepository;
pub use show::ShowRepository;
