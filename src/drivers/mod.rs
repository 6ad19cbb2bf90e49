pub mod modem;
pub mod nmea;
pub mod ubx;

#[cfg(feature = "firmware")]
pub mod flash;
#[cfg(feature = "firmware")]
pub mod lis3dh;
