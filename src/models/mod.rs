pub mod booking;
pub mod facility;
pub mod slot;

pub use booking::{AuditInfo, Booking, PatientInfo};
pub use facility::Facility;
pub use slot::{NewSlot, Slot, SlotStatus, SlotType, SlotWithBooking};
