pub mod broadcaster;
pub mod lifecycle;
pub mod parcel_lock;
pub mod tracking_code;
pub mod transition;
pub mod view;
