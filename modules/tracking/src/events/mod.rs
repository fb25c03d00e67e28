pub mod parcel;
