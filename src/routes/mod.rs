pub mod events;
pub mod health;
pub mod ics;
pub mod shows;
pub mod timetable;
