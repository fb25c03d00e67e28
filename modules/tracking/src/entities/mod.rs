pub mod parcel;
pub mod tracking_event;
